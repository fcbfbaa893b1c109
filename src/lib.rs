//! # Organ Match
//!
//! Organ-donation registry with donor/recipient compatibility matching.
//!
//! ## Features
//!
//! - Atomic donor registration (person, organ sizes and organ status together)
//! - Availability queries by organ
//! - Ordered eligibility pipeline: availability, infection, gender, blood type,
//!   HLA typing, age proximity and size tolerance
//! - Parallel screening of the donor pool against one recipient
//! - Table, JSON, CSV and TSV output

pub mod availability;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod output;
pub mod registry;
pub mod store;
pub mod types;

// Re-export key types
pub use availability::AvailabilityFilter;
pub use compatibility::{CompatibilityEngine, PIPELINE};
pub use config::{Config, MatchPolicy};
pub use error::{ErrorKind, Failure, RegistryError, ResponseClass};
pub use output::{ReportFormat, ReportWriter};
pub use registry::Registry;
pub use store::{DonorStore, JsonFileStore, MemoryStore};
pub use types::*;
