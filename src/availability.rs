use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::store::DonorStore;
use crate::types::{AvailabilityReport, DonorSummary, Organ};

/// Lists donors currently offering a given organ
pub struct AvailabilityFilter<'a, S: DonorStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DonorStore + ?Sized> AvailabilityFilter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Donors whose availability flag for `organ` is set. Unknown flag
    /// names are a not-found failure.
    pub fn list_available(&self, organ: &str) -> Result<AvailabilityReport> {
        let organ =
            Organ::from_name(organ).ok_or_else(|| RegistryError::OrganNotFound(organ.to_string()))?;

        let donors: Vec<DonorSummary> = self
            .store
            .with_status(organ)?
            .iter()
            .map(|record| DonorSummary::from(&record.person))
            .collect();

        debug!("{} donors have {} available", donors.len(), organ);

        Ok(AvailabilityReport {
            organ,
            total_donors: donors.len(),
            donors,
        })
    }
}
