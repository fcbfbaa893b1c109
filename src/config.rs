use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{RegistryError, Result};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "organ-match.toml";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub matching: MatchPolicy,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./registry.json"),
        }
    }
}

/// Tolerances used by the age and size checks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchPolicy {
    /// Largest allowed donor/recipient age difference in years, inclusive
    pub max_age_gap: u32,
    /// Allowed size deviation as a fraction of the recipient's size
    pub size_tolerance: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            max_age_gap: 10,
            size_tolerance: 0.10,
        }
    }
}

impl MatchPolicy {
    pub fn validate(&self) -> Result<()> {
        if !self.size_tolerance.is_finite() || !(0.0..=1.0).contains(&self.size_tolerance) {
            return Err(RegistryError::Config(format!(
                "matching.size_tolerance must be between 0 and 1, got {}",
                self.size_tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.matching.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RegistryError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml(&content)
    }

    /// Explicit path, else `organ-match.toml` if present, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.matching.max_age_gap, 10);
        assert_eq!(config.matching.size_tolerance, 0.10);
        assert_eq!(config.store.path, PathBuf::from("./registry.json"));
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let config = Config::from_toml(
            r#"
[store]
path = "/var/lib/organ-match/donors.json"

[matching]
max_age_gap = 5
"#,
        )?;
        assert_eq!(config.store.path, PathBuf::from("/var/lib/organ-match/donors.json"));
        assert_eq!(config.matching.max_age_gap, 5);
        assert_eq!(config.matching.size_tolerance, 0.10);
        Ok(())
    }

    #[test]
    fn test_rejects_out_of_range_tolerance() {
        let result = Config::from_toml("[matching]\nsize_tolerance = 1.5\n");
        assert!(matches!(result, Err(RegistryError::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(Config::from_toml("[matching\nmax_age_gap = ").is_err());
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("organ-match.toml");
        fs::write(&path, "[logging]\nlevel = \"debug\"\n")?;

        let config = Config::load(Some(path.as_path()))?;
        assert_eq!(config.logging.level, "debug");

        assert!(Config::load(Some(temp_dir.path().join("missing.toml").as_path())).is_err());
        Ok(())
    }
}
