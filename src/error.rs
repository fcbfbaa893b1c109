use serde::Serialize;
use std::fmt;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Structural failures raised by the registry.
///
/// Business-rule mismatches are never errors: the compatibility engine
/// reports them as a negative [`crate::types::Verdict`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Donor {0} not found")]
    DonorNotFound(u64),

    #[error("Organ not found: '{0}'")]
    OrganNotFound(String),

    #[error("Invalid organ '{0}'")]
    InvalidOrgan(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Kind of a [`RegistryError`], stable for callers that branch on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidOrgan,
    Validation,
    Storage,
    Config,
}

/// Response class a request layer should use for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseClass {
    NotFound,
    BadRequest,
    Internal,
}

impl fmt::Display for ResponseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseClass::NotFound => f.write_str("not found"),
            ResponseClass::BadRequest => f.write_str("bad request"),
            ResponseClass::Internal => f.write_str("internal error"),
        }
    }
}

/// Kind + message pair handed back to callers
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub class: ResponseClass,
    pub message: String,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DonorNotFound(_) | RegistryError::OrganNotFound(_) => {
                ErrorKind::NotFound
            }
            RegistryError::InvalidOrgan(_) => ErrorKind::InvalidOrgan,
            RegistryError::Validation(_) => ErrorKind::Validation,
            RegistryError::Storage(_) | RegistryError::Serialization(_) => ErrorKind::Storage,
            RegistryError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn response_class(&self) -> ResponseClass {
        match self.kind() {
            ErrorKind::NotFound => ResponseClass::NotFound,
            ErrorKind::InvalidOrgan | ErrorKind::Validation => ResponseClass::BadRequest,
            ErrorKind::Storage | ErrorKind::Config => ResponseClass::Internal,
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            class: self.response_class(),
            message: self.to_string(),
        }
    }
}

impl From<toml::de::Error> for RegistryError {
    fn from(e: toml::de::Error) -> Self {
        RegistryError::Config(e.to_string())
    }
}
