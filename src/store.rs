use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{DonorRecord, Organ, OrganSize, OrganStatus, Person, PersonDetails};

/// Donor record storage consumed by the availability filter and the
/// compatibility engine
pub trait DonorStore: Send + Sync {
    /// Look up a donor by person id
    fn get(&self, id: u64) -> Result<Option<DonorRecord>>;

    /// Donors whose availability flag for `organ` is set, in storage order
    fn with_status(&self, organ: Organ) -> Result<Vec<DonorRecord>>;

    /// Every donor, in storage order
    fn all(&self) -> Result<Vec<DonorRecord>>;

    /// Create person, organ sizes and organ status as one unit
    fn register(&self, details: PersonDetails) -> Result<DonorRecord>;
}

#[derive(Debug)]
struct Ledger {
    next_id: u64,
    records: Vec<DonorRecord>,
}

/// In-memory donor store
#[derive(Debug)]
pub struct MemoryStore {
    ledger: RwLock<Ledger>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_records(Vec::new(), 1)
    }

    fn from_records(records: Vec<DonorRecord>, next_id: u64) -> Self {
        Self {
            ledger: RwLock::new(Ledger { next_id, records }),
        }
    }

    fn replace(&self, records: Vec<DonorRecord>, next_id: u64) {
        *self.ledger.write() = Ledger { next_id, records };
    }

    pub fn len(&self) -> usize {
        self.ledger.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a registration. The write lock is held until the returned guard
    /// is committed or dropped, so readers never see an uncommitted donor.
    pub fn begin(&self, details: PersonDetails) -> Result<Registration<'_>> {
        details.validate()?;

        let mut ledger = self.ledger.write();
        let previous_next_id = ledger.next_id;
        let id = ledger.next_id;
        ledger.next_id += 1;
        ledger.records.push(DonorRecord::from_details(id, details));

        debug!("Staged donor {} for registration", id);

        Ok(Registration {
            ledger,
            previous_next_id,
            committed: false,
        })
    }
}

impl DonorStore for MemoryStore {
    fn get(&self, id: u64) -> Result<Option<DonorRecord>> {
        Ok(self
            .ledger
            .read()
            .records
            .iter()
            .find(|record| record.id() == id)
            .cloned())
    }

    fn with_status(&self, organ: Organ) -> Result<Vec<DonorRecord>> {
        Ok(self
            .ledger
            .read()
            .records
            .iter()
            .filter(|record| record.organ_status.is_available(organ))
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<DonorRecord>> {
        Ok(self.ledger.read().records.clone())
    }

    fn register(&self, details: PersonDetails) -> Result<DonorRecord> {
        Ok(self.begin(details)?.commit())
    }
}

/// Scoped registration transaction; rolls back unless committed
pub struct Registration<'a> {
    ledger: RwLockWriteGuard<'a, Ledger>,
    previous_next_id: u64,
    committed: bool,
}

impl<'a> Registration<'a> {
    pub fn record(&self) -> &DonorRecord {
        // begin() always pushes before handing out the guard
        &self.ledger.records[self.ledger.records.len() - 1]
    }

    fn records(&self) -> &[DonorRecord] {
        &self.ledger.records
    }

    fn next_id(&self) -> u64 {
        self.ledger.next_id
    }

    pub fn commit(mut self) -> DonorRecord {
        self.committed = true;
        let record = self.record().clone();
        info!("Registered donor {} ({})", record.id(), record.person.name);
        record
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Some(record) = self.ledger.records.pop() {
                warn!("Rolled back registration of donor {}", record.id());
            }
            self.ledger.next_id = self.previous_next_id;
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SizeRow {
    person_id: u64,
    #[serde(flatten)]
    size: OrganSize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusRow {
    person_id: u64,
    #[serde(flatten)]
    status: OrganStatus,
}

/// On-disk layout: three tables keyed by person id
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    next_id: u64,
    persons: Vec<Person>,
    organ_sizes: Vec<SizeRow>,
    organ_statuses: Vec<StatusRow>,
}

impl StoreFile {
    fn from_records(next_id: u64, records: &[DonorRecord]) -> Self {
        Self {
            next_id,
            persons: records.iter().map(|r| r.person.clone()).collect(),
            organ_sizes: records
                .iter()
                .map(|r| SizeRow {
                    person_id: r.id(),
                    size: r.organ_size,
                })
                .collect(),
            organ_statuses: records
                .iter()
                .map(|r| StatusRow {
                    person_id: r.id(),
                    status: r.organ_status,
                })
                .collect(),
        }
    }

    /// Join the three tables. Persons missing either organ record, repeated
    /// person ids and rows with unusable sizes are not matchable and are
    /// dropped.
    fn into_records(self) -> (Vec<DonorRecord>, u64) {
        // Orphaned ids still count so they are never handed out again
        let max_id = self.persons.iter().map(|p| p.id).max().unwrap_or(0);
        let next_id = self.next_id.max(max_id + 1);

        let mut sizes: HashMap<u64, OrganSize> = self
            .organ_sizes
            .into_iter()
            .map(|row| (row.person_id, row.size))
            .collect();
        let mut statuses: HashMap<u64, OrganStatus> = self
            .organ_statuses
            .into_iter()
            .map(|row| (row.person_id, row.status))
            .collect();

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(self.persons.len());
        for person in self.persons {
            if !seen.insert(person.id) {
                warn!("Skipping duplicate person id {}", person.id);
                continue;
            }

            match (sizes.remove(&person.id), statuses.remove(&person.id)) {
                (Some(organ_size), Some(organ_status)) => {
                    if let Err(e) = organ_size.validate() {
                        warn!("Skipping person {}: {}", person.id, e);
                        continue;
                    }
                    records.push(DonorRecord {
                        person,
                        organ_size,
                        organ_status,
                    })
                }
                _ => warn!(
                    "Skipping person {} without organ size/status records",
                    person.id
                ),
            }
        }

        (records, next_id)
    }
}

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(10);

/// Exclusive writer lock on a store file, held as a sibling `.lock` file
/// that is removed on drop
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(store_path: &Path) -> Result<Self> {
        let path = store_path.with_extension("json.lock");
        let deadline = Instant::now() + LOCK_TIMEOUT;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::WouldBlock,
                            format!(
                                "{} is held by another writer; remove it if no registration is running",
                                path.display()
                            ),
                        )
                        .into());
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// Donor store persisted as a JSON document.
///
/// Reads are served from the state loaded at open or at the last
/// registration. Registrations lock the file, reload it and then write, so
/// several handles on one path never hand out the same id.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let memory = match load(&path)? {
            Some((records, next_id)) => {
                info!("Loaded {} donors from {}", records.len(), path.display());
                MemoryStore::from_records(records, next_id)
            }
            None => {
                debug!("No store at {}, starting empty", path.display());
                MemoryStore::new()
            }
        };

        Ok(Self { path, memory })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Pick up registrations written through other handles
    fn reload(&self) -> Result<()> {
        if let Some((records, next_id)) = load(&self.path)? {
            debug!("Reloaded {} donors from {}", records.len(), self.path.display());
            self.memory.replace(records, next_id);
        }
        Ok(())
    }

    /// Write to a sibling file and rename it over the store
    fn persist(&self, next_id: u64, records: &[DonorRecord]) -> Result<()> {
        let body = serde_json::to_vec_pretty(&StoreFile::from_records(next_id, records))?;
        let staging = self.path.with_extension("json.tmp");

        if let Err(e) = fs::write(&staging, body).and_then(|_| fs::rename(&staging, &self.path)) {
            if staging.exists() {
                if let Err(cleanup) = fs::remove_file(&staging) {
                    warn!("Failed to remove {}: {}", staging.display(), cleanup);
                }
            }
            return Err(e.into());
        }

        debug!("Persisted {} donors to {}", records.len(), self.path.display());
        Ok(())
    }
}

fn load(path: &Path) -> Result<Option<(Vec<DonorRecord>, u64)>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let file: StoreFile = serde_json::from_str(&content)?;
    Ok(Some(file.into_records()))
}

impl DonorStore for JsonFileStore {
    fn get(&self, id: u64) -> Result<Option<DonorRecord>> {
        self.memory.get(id)
    }

    fn with_status(&self, organ: Organ) -> Result<Vec<DonorRecord>> {
        self.memory.with_status(organ)
    }

    fn all(&self) -> Result<Vec<DonorRecord>> {
        self.memory.all()
    }

    fn register(&self, details: PersonDetails) -> Result<DonorRecord> {
        details.validate()?;
        self.ensure_parent()?;

        let _lock = StoreLock::acquire(&self.path)?;
        self.reload()?;

        let registration = self.memory.begin(details)?;
        // An early return drops the guard, which rolls the insert back
        self.persist(registration.next_id(), registration.records())?;
        Ok(registration.commit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PersonBase;
    use tempfile::TempDir;

    fn details(name: &str, kidney: bool) -> PersonDetails {
        PersonDetails {
            person: PersonBase {
                name: name.to_string(),
                age: 35,
                gender: "F".to_string(),
                blood_type: "A+".to_string(),
                hla_typing: "B8".to_string(),
                infection_status: false,
            },
            organ_size: OrganSize {
                kidney_volume: 150.0,
                liver_volume: 1500.0,
                heart_volume: 300.0,
                single_lung_volume: 2000.0,
                pancreas_size: 80.0,
                intestine_volume: 700.0,
            },
            organ_status: OrganStatus {
                kidney,
                ..OrganStatus::default()
            },
        }
    }

    #[test]
    fn test_memory_store_assigns_sequential_ids() -> Result<()> {
        let store = MemoryStore::new();
        let first = store.register(details("Ada", true))?;
        let second = store.register(details("Bo", false))?;

        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert_eq!(store.get(2)?.map(|r| r.person.name), Some("Bo".to_string()));
        assert!(store.get(3)?.is_none());
        Ok(())
    }

    #[test]
    fn test_filter_by_status_keeps_storage_order() -> Result<()> {
        let store = MemoryStore::new();
        store.register(details("Ada", true))?;
        store.register(details("Bo", false))?;
        store.register(details("Cy", true))?;

        let names: Vec<String> = store
            .with_status(Organ::Kidney)?
            .into_iter()
            .map(|r| r.person.name)
            .collect();
        assert_eq!(names, vec!["Ada", "Cy"]);
        assert_eq!(store.with_status(Organ::Liver)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_uncommitted_registration_rolls_back() -> Result<()> {
        let store = MemoryStore::new();
        {
            let registration = store.begin(details("Ada", true))?;
            assert_eq!(registration.record().id(), 1);
        }
        assert!(store.is_empty());

        let record = store.register(details("Bo", true))?;
        assert_eq!(record.id(), 1);
        Ok(())
    }

    #[test]
    fn test_invalid_details_are_rejected() {
        let store = MemoryStore::new();
        let mut bad = details("Ada", true);
        bad.organ_size.heart_volume = 0.0;

        assert!(store.register(bad).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_json_store_round_trips_through_disk() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("registry.json");

        {
            let store = JsonFileStore::open(&path)?;
            store.register(details("Ada", true))?;
            store.register(details("Bo", false))?;
        }

        let reopened = JsonFileStore::open(&path)?;
        assert_eq!(reopened.len(), 2);
        assert!(!reopened.get(2)?.map(|r| r.organ_status.kidney).unwrap_or(true));

        let next = reopened.register(details("Cy", true))?;
        assert_eq!(next.id(), 3);
        Ok(())
    }

    #[test]
    fn test_failed_persist_leaves_no_partial_donor() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "not a directory")?;

        let store = JsonFileStore::open(blocker.join("registry.json"))?;
        let result = store.register(details("Ada", true));

        assert!(result.is_err());
        assert!(store.is_empty());
        assert!(store.get(1)?.is_none());
        Ok(())
    }

    #[test]
    fn test_orphaned_persons_are_not_loaded() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("registry.json");

        let mut file = StoreFile::from_records(2, &[DonorRecord::from_details(1, details("Ada", true))]);
        file.persons.push(Person {
            id: 5,
            name: "Orphan".to_string(),
            age: 50,
            gender: "M".to_string(),
            blood_type: "O+".to_string(),
            hla_typing: "A1".to_string(),
            infection_status: false,
        });
        fs::write(&path, serde_json::to_string(&file)?)?;

        let store = JsonFileStore::open(&path)?;
        assert_eq!(store.len(), 1);
        assert!(store.get(5)?.is_none());
        assert_eq!(store.register(details("Bo", true))?.id(), 6);
        Ok(())
    }

    #[test]
    fn test_handles_on_one_path_never_share_ids() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("registry.json");

        let a = JsonFileStore::open(&path)?;
        let b = JsonFileStore::open(&path)?;

        assert_eq!(a.register(details("Ada", true))?.id(), 1);
        assert_eq!(b.register(details("Bo", true))?.id(), 2);
        assert_eq!(a.register(details("Cy", true))?.id(), 3);

        let reopened = JsonFileStore::open(&path)?;
        let names: Vec<String> = reopened.all()?.into_iter().map(|r| r.person.name).collect();
        assert_eq!(names, vec!["Ada", "Bo", "Cy"]);
        assert!(!path.with_extension("json.lock").exists());
        Ok(())
    }

    #[test]
    fn test_concurrent_writers_keep_every_registration() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("registry.json");

        thread::scope(|scope| {
            for i in 0..4 {
                let path = &path;
                scope.spawn(move || {
                    let store = JsonFileStore::open(path).unwrap();
                    for j in 0..5 {
                        store.register(details(&format!("D{}-{}", i, j), true)).unwrap();
                    }
                });
            }
        });

        let store = JsonFileStore::open(&path)?;
        let mut ids: Vec<u64> = store.all()?.iter().map(|r| r.id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
        Ok(())
    }

    #[test]
    fn test_unusable_rows_are_not_loaded() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("registry.json");

        let mut zero = details("Zero", true);
        zero.organ_size.kidney_volume = 0.0;
        let file = StoreFile::from_records(
            4,
            &[
                DonorRecord::from_details(1, details("Ada", true)),
                DonorRecord::from_details(1, details("Twin", true)),
                DonorRecord::from_details(2, zero),
                DonorRecord::from_details(3, details("Cy", true)),
            ],
        );
        fs::write(&path, serde_json::to_string(&file)?)?;

        let store = JsonFileStore::open(&path)?;
        let names: Vec<String> = store.all()?.into_iter().map(|r| r.person.name).collect();
        assert_eq!(names, vec!["Ada", "Cy"]);
        assert!(store.get(2)?.is_none());
        Ok(())
    }

    #[test]
    fn test_failed_rename_removes_staging_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("registry.json");
        let store = JsonFileStore::open(&path)?;

        // A non-empty directory cannot be replaced by a file
        fs::create_dir(&path)?;
        fs::write(path.join("occupied"), "x")?;

        assert!(store.persist(1, &[]).is_err());
        assert!(!path.with_extension("json.tmp").exists());
        Ok(())
    }
}
