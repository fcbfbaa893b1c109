use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RegistryError, Result};

/// Organs tracked by the registry's availability flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Organ {
    Cornea,
    Kidney,
    Liver,
    Heart,
    Lungs,
    Pancreas,
    Intestine,
}

/// Volumetric fields stored in an [`OrganSize`] record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SizeField {
    KidneyVolume,
    LiverVolume,
    HeartVolume,
    SingleLungVolume,
    PancreasSize,
    IntestineVolume,
}

impl SizeField {
    pub fn field_name(&self) -> &'static str {
        match self {
            SizeField::KidneyVolume => "kidney_volume",
            SizeField::LiverVolume => "liver_volume",
            SizeField::HeartVolume => "heart_volume",
            SizeField::SingleLungVolume => "single_lung_volume",
            SizeField::PancreasSize => "pancreas_size",
            SizeField::IntestineVolume => "intestine_volume",
        }
    }
}

/// Organ lookup table: flag name and size-field alias.
/// Cornea has no volumetric measurement, so it carries no alias.
static ORGAN_TABLE: [(Organ, &str, Option<SizeField>); 7] = [
    (Organ::Cornea, "cornea", None),
    (Organ::Kidney, "kidney", Some(SizeField::KidneyVolume)),
    (Organ::Liver, "liver", Some(SizeField::LiverVolume)),
    (Organ::Heart, "heart", Some(SizeField::HeartVolume)),
    (Organ::Lungs, "lungs", Some(SizeField::SingleLungVolume)),
    (Organ::Pancreas, "pancreas", Some(SizeField::PancreasSize)),
    (Organ::Intestine, "intestine", Some(SizeField::IntestineVolume)),
];

impl Organ {
    pub const ALL: [Organ; 7] = [
        Organ::Cornea,
        Organ::Kidney,
        Organ::Liver,
        Organ::Heart,
        Organ::Lungs,
        Organ::Pancreas,
        Organ::Intestine,
    ];

    /// Resolve a flag name. Matching is exact; "corenea" is accepted as the
    /// legacy spelling of the cornea flag.
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "corenea" {
            return Some(Organ::Cornea);
        }

        ORGAN_TABLE
            .iter()
            .find(|(_, flag, _)| *flag == name)
            .map(|(organ, _, _)| *organ)
    }

    pub fn name(&self) -> &'static str {
        self.entry().1
    }

    /// Organ name with the first letter upper-cased, e.g. "Kidney"
    pub fn display_name(&self) -> String {
        let name = self.name();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn size_field(&self) -> Option<SizeField> {
        self.entry().2
    }

    fn entry(&self) -> &'static (Organ, &'static str, Option<SizeField>) {
        // ORGAN_TABLE is ordered like Organ::ALL
        &ORGAN_TABLE[*self as usize]
    }
}

impl fmt::Display for Organ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn available() -> bool {
    true
}

/// Registered person (donor) identity and demographics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    pub id: u64,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub blood_type: String,
    pub hla_typing: String,
    #[serde(default)]
    pub infection_status: bool,
}

/// Per-organ volumetric measurements. Units are opaque but must agree with
/// the sizes recipients supply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrganSize {
    pub kidney_volume: f64,
    pub liver_volume: f64,
    pub heart_volume: f64,
    pub single_lung_volume: f64,
    pub pancreas_size: f64,
    pub intestine_volume: f64,
}

impl OrganSize {
    pub fn volume(&self, field: SizeField) -> f64 {
        match field {
            SizeField::KidneyVolume => self.kidney_volume,
            SizeField::LiverVolume => self.liver_volume,
            SizeField::HeartVolume => self.heart_volume,
            SizeField::SingleLungVolume => self.single_lung_volume,
            SizeField::PancreasSize => self.pancreas_size,
            SizeField::IntestineVolume => self.intestine_volume,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (_, _, field) in ORGAN_TABLE.iter() {
            if let Some(field) = field {
                let value = self.volume(*field);
                if !value.is_finite() || value <= 0.0 {
                    return Err(RegistryError::Validation(format!(
                        "{} must be a positive number, got {}",
                        field.field_name(),
                        value
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Per-organ availability flags; every organ is available unless stated otherwise
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrganStatus {
    #[serde(default = "available", alias = "corenea")]
    pub cornea: bool,
    #[serde(default = "available")]
    pub kidney: bool,
    #[serde(default = "available")]
    pub liver: bool,
    #[serde(default = "available")]
    pub heart: bool,
    #[serde(default = "available")]
    pub lungs: bool,
    #[serde(default = "available")]
    pub pancreas: bool,
    #[serde(default = "available")]
    pub intestine: bool,
}

impl Default for OrganStatus {
    fn default() -> Self {
        Self {
            cornea: true,
            kidney: true,
            liver: true,
            heart: true,
            lungs: true,
            pancreas: true,
            intestine: true,
        }
    }
}

impl OrganStatus {
    pub fn is_available(&self, organ: Organ) -> bool {
        match organ {
            Organ::Cornea => self.cornea,
            Organ::Kidney => self.kidney,
            Organ::Liver => self.liver,
            Organ::Heart => self.heart,
            Organ::Lungs => self.lungs,
            Organ::Pancreas => self.pancreas,
            Organ::Intestine => self.intestine,
        }
    }
}

/// Demographic part of a registration payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonBase {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub blood_type: String,
    pub hla_typing: String,
    #[serde(default)]
    pub infection_status: bool,
}

/// Registration payload: a person with both organ sub-records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonDetails {
    pub person: PersonBase,
    pub organ_size: OrganSize,
    #[serde(default)]
    pub organ_status: OrganStatus,
}

impl PersonDetails {
    pub fn validate(&self) -> Result<()> {
        let person = &self.person;
        require_text("name", &person.name)?;
        require_text("gender", &person.gender)?;
        require_text("blood_type", &person.blood_type)?;
        require_text("hla_typing", &person.hla_typing)?;
        self.organ_size.validate()
    }
}

/// A donor as stored: person, sizes and status always travel together
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DonorRecord {
    pub person: Person,
    pub organ_size: OrganSize,
    pub organ_status: OrganStatus,
}

impl DonorRecord {
    /// Build the aggregate for a validated registration payload
    pub fn from_details(id: u64, details: PersonDetails) -> Self {
        let PersonDetails {
            person,
            organ_size,
            organ_status,
        } = details;

        Self {
            person: Person {
                id,
                name: person.name,
                age: person.age,
                gender: person.gender,
                blood_type: person.blood_type,
                hla_typing: person.hla_typing,
                infection_status: person.infection_status,
            },
            organ_size,
            organ_status,
        }
    }

    pub fn id(&self) -> u64 {
        self.person.id
    }
}

/// Transient profile of a person needing an organ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecipientProfile {
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(alias = "blood_type")]
    pub blood_type: String,
    #[serde(alias = "hla_typing")]
    pub hla_typing: String,
    #[serde(default, alias = "infection_status")]
    pub infection_status: bool,
    /// Required size of the requested organ, same unit as donor sizes
    #[serde(alias = "organ_size")]
    pub organ_size: f64,
}

impl RecipientProfile {
    pub fn validate(&self) -> Result<()> {
        require_text("name", &self.name)?;
        require_text("gender", &self.gender)?;
        require_text("bloodType", &self.blood_type)?;
        require_text("hlaTyping", &self.hla_typing)?;

        if !self.organ_size.is_finite() || self.organ_size <= 0.0 {
            return Err(RegistryError::Validation(format!(
                "organSize must be a positive number, got {}",
                self.organ_size
            )));
        }

        Ok(())
    }
}

/// Decode a request payload. A payload that does not match the expected
/// shape is a validation failure, not a storage one.
pub fn parse_request<T: DeserializeOwned>(content: &str) -> Result<T> {
    serde_json::from_str(content).map_err(|e| RegistryError::Validation(e.to_string()))
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RegistryError::Validation(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}

/// Flattened donor demographics; organ sizes are never included
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DonorSummary {
    pub id: u64,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub blood_type: String,
    pub hla_typing: String,
    pub infection_status: bool,
}

impl From<&Person> for DonorSummary {
    fn from(person: &Person) -> Self {
        Self {
            id: person.id,
            name: person.name.clone(),
            age: person.age,
            gender: person.gender.clone(),
            blood_type: person.blood_type.clone(),
            hla_typing: person.hla_typing.clone(),
            infection_status: person.infection_status,
        }
    }
}

/// Donors currently offering a given organ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub organ: Organ,
    pub total_donors: usize,
    pub donors: Vec<DonorSummary>,
}

/// Eligibility checks, in evaluation order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    OrganAvailability,
    Infection,
    Gender,
    BloodType,
    HlaTyping,
    AgeProximity,
    SizeTolerance,
}

/// Outcome of a compatibility check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub compatible: bool,
    pub reason: String,
    /// First rule the pair failed, if any
    #[serde(skip)]
    pub failed_rule: Option<Rule>,
}

impl Verdict {
    pub fn compatible(organ: Organ) -> Self {
        Self {
            compatible: true,
            reason: format!("Donor is compatible for {}", organ),
            failed_rule: None,
        }
    }

    pub fn rejected(rule: Rule, reason: impl Into<String>) -> Self {
        Self {
            compatible: false,
            reason: reason.into(),
            failed_rule: Some(rule),
        }
    }
}

/// Verdict for one donor in a pool screening
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningEntry {
    pub donor_id: u64,
    pub donor_name: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Unranked verdicts for every registered donor against one recipient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningReport {
    pub organ: Organ,
    pub screened: usize,
    pub compatible_count: usize,
    pub results: Vec<ScreeningEntry>,
}
