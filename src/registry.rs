use tracing::info;

use crate::availability::AvailabilityFilter;
use crate::compatibility::CompatibilityEngine;
use crate::config::MatchPolicy;
use crate::error::Result;
use crate::store::DonorStore;
use crate::types::*;

/// Operations exposed to the request layer, over any donor store
pub struct Registry<S: DonorStore> {
    store: S,
    policy: MatchPolicy,
}

impl<S: DonorStore> Registry<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, MatchPolicy::default())
    }

    pub fn with_policy(store: S, policy: MatchPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a person with organ sizes and status; returns the new id
    pub fn add_person(&self, details: PersonDetails) -> Result<u64> {
        let record = self.store.register(details)?;
        info!("Added person {}", record.id());
        Ok(record.id())
    }

    pub fn availability(&self, organ: &str) -> Result<AvailabilityReport> {
        AvailabilityFilter::new(&self.store).list_available(organ)
    }

    pub fn compatibility(
        &self,
        donor_id: u64,
        organ: &str,
        recipient: &RecipientProfile,
    ) -> Result<Verdict> {
        self.engine().check(donor_id, organ, recipient)
    }

    pub fn screen(&self, organ: &str, recipient: &RecipientProfile) -> Result<ScreeningReport> {
        self.engine().screen(organ, recipient)
    }

    fn engine(&self) -> CompatibilityEngine<'_, S> {
        CompatibilityEngine::with_policy(&self.store, self.policy)
    }
}
