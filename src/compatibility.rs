use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::MatchPolicy;
use crate::error::{RegistryError, Result};
use crate::store::DonorStore;
use crate::types::*;

/// Eligibility checks in the order they are evaluated. The first failing
/// rule decides the verdict; later rules are not evaluated.
pub const PIPELINE: [Rule; 7] = [
    Rule::OrganAvailability,
    Rule::Infection,
    Rule::Gender,
    Rule::BloodType,
    Rule::HlaTyping,
    Rule::AgeProximity,
    Rule::SizeTolerance,
];

impl Rule {
    /// Failure reason for this rule, or `None` if the pair passes it
    fn evaluate(
        &self,
        policy: &MatchPolicy,
        donor: &DonorRecord,
        organ: Organ,
        recipient: &RecipientProfile,
    ) -> Option<String> {
        let person = &donor.person;

        match self {
            Rule::OrganAvailability => (!donor.organ_status.is_available(organ))
                .then(|| format!("Donor does not have {} available", organ)),
            Rule::Infection => person
                .infection_status
                .then(|| "Donor has infection".to_string()),
            Rule::Gender => {
                (person.gender != recipient.gender).then(|| "Gender mismatch".to_string())
            }
            Rule::BloodType => (person.blood_type != recipient.blood_type)
                .then(|| "Blood type mismatch".to_string()),
            Rule::HlaTyping => (person.hla_typing != recipient.hla_typing)
                .then(|| "HLA typing mismatch".to_string()),
            Rule::AgeProximity => (person.age.abs_diff(recipient.age) > policy.max_age_gap)
                .then(|| "Age difference too large".to_string()),
            Rule::SizeTolerance => {
                // Organs without a size alias have nothing to compare
                let field = organ.size_field()?;
                let donor_size = donor.organ_size.volume(field);
                let required = recipient.organ_size;
                // Inclusive bound; absorb rounding in the scaled tolerance
                let tolerance =
                    policy.size_tolerance * required + f64::EPSILON * required.max(1.0);

                ((donor_size - required).abs() > tolerance)
                    .then(|| format!("{} size mismatch", organ.display_name()))
            }
        }
    }
}

/// Decides whether a donor's organ is usable for a recipient
pub struct CompatibilityEngine<'a, S: DonorStore + ?Sized> {
    store: &'a S,
    policy: MatchPolicy,
}

impl<'a, S: DonorStore + ?Sized> CompatibilityEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self::with_policy(store, MatchPolicy::default())
    }

    pub fn with_policy(store: &'a S, policy: MatchPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Check one donor. Structural problems are errors, raised in this
    /// order: malformed recipient, unknown donor, unknown organ. Rule
    /// failures are verdicts.
    pub fn check(
        &self,
        donor_id: u64,
        organ: &str,
        recipient: &RecipientProfile,
    ) -> Result<Verdict> {
        recipient.validate()?;

        let donor = self
            .store
            .get(donor_id)?
            .ok_or(RegistryError::DonorNotFound(donor_id))?;
        let organ = resolve_organ(organ)?;

        let verdict = self.evaluate(&donor, organ, recipient);
        debug!(
            "Donor {} / {}: compatible={} ({})",
            donor_id, organ, verdict.compatible, verdict.reason
        );

        Ok(verdict)
    }

    /// Run the pipeline against an already loaded donor
    pub fn evaluate(
        &self,
        donor: &DonorRecord,
        organ: Organ,
        recipient: &RecipientProfile,
    ) -> Verdict {
        PIPELINE
            .iter()
            .find_map(|rule| {
                rule.evaluate(&self.policy, donor, organ, recipient)
                    .map(|reason| Verdict::rejected(*rule, reason))
            })
            .unwrap_or_else(|| Verdict::compatible(organ))
    }

    /// Evaluate the recipient against every registered donor. Results keep
    /// storage order and are not ranked.
    pub fn screen(&self, organ: &str, recipient: &RecipientProfile) -> Result<ScreeningReport> {
        recipient.validate()?;
        let organ = resolve_organ(organ)?;

        let donors = self.store.all()?;
        let results: Vec<ScreeningEntry> = donors
            .par_iter()
            .map(|donor| ScreeningEntry {
                donor_id: donor.id(),
                donor_name: donor.person.name.clone(),
                verdict: self.evaluate(donor, organ, recipient),
            })
            .collect();

        let compatible_count = results.iter().filter(|r| r.verdict.compatible).count();
        info!(
            "Screened {} donors for {}: {} compatible",
            results.len(),
            organ,
            compatible_count
        );

        Ok(ScreeningReport {
            organ,
            screened: results.len(),
            compatible_count,
            results,
        })
    }
}

fn resolve_organ(name: &str) -> Result<Organ> {
    Organ::from_name(name).ok_or_else(|| RegistryError::InvalidOrgan(name.to_string()))
}
