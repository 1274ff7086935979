use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Environment variable forcing the listening socket onto every interface
pub const BIND_ALL_INTERFACES_ENV: &str = "LOCKWIRE_BIND_ALL_INTERFACES";

/// Top-level configuration, usually read from `lockwire.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockwireConfig {
    /// Address resolution settings
    pub network: NetworkConfig,
    /// Contention handler timing
    pub contention: ContentionConfig,
}

/// Address resolution settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bind to the wildcard address and advertise non-loopback addresses too
    pub bind_all_interfaces: bool,
}

/// Timing used when asking an owner to release a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentionConfig {
    /// Delay between two unlock requests to the same owner
    pub ping_interval_ms: u64,
    /// How long a requester waits for the release confirmation
    pub release_timeout_ms: u64,
}

impl Default for ContentionConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 200,
            release_timeout_ms: 5_000,
        }
    }
}

impl ContentionConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }
}

impl LockwireConfig {
    /// Reject settings the contention handler cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.contention.ping_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "contention.ping_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.contention.release_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "contention.release_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the value of [`BIND_ALL_INTERFACES_ENV`], if it was set
    pub fn apply_bind_all_override(&mut self, value: Option<&str>) -> Result<(), CoreError> {
        let Some(value) = value else {
            return Ok(());
        };
        self.network.bind_all_interfaces = match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" | "" => false,
            other => {
                return Err(CoreError::InvalidConfig(format!(
                    "{} must be a boolean, got '{}'",
                    BIND_ALL_INTERFACES_ENV, other
                )))
            }
        };
        Ok(())
    }
}

/// Parse a configuration document
pub fn parse_config(content: &str) -> Result<LockwireConfig, CoreError> {
    let config: LockwireConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<LockwireConfig, CoreError> {
    if !path.exists() {
        return Err(CoreError::NotFound(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load the config file if one was given, then apply environment overrides
pub fn resolve_config(path: Option<&Path>) -> Result<LockwireConfig, CoreError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => LockwireConfig::default(),
    };
    let env_value = std::env::var(BIND_ALL_INTERFACES_ENV).ok();
    config.apply_bind_all_override(env_value.as_deref())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = LockwireConfig::default();
        assert!(!config.network.bind_all_interfaces);
        assert_eq!(config.contention.ping_interval(), Duration::from_millis(200));
        assert_eq!(config.contention.release_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = parse_config("[contention]\nrelease_timeout_ms = 750\n").unwrap();
        assert_eq!(config.contention.release_timeout_ms, 750);
        assert_eq!(config.contention.ping_interval_ms, 200);
        assert!(!config.network.bind_all_interfaces);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = parse_config("[contention]\nping_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_toml() {
        let err = parse_config("[network\n").unwrap_err();
        assert!(matches!(err, CoreError::TomlParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lockwire.toml");
        std::fs::write(&path, "[network]\nbind_all_interfaces = true\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.network.bind_all_interfaces);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = load_config(&temp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_bind_all_override() {
        let mut config = LockwireConfig::default();
        config.apply_bind_all_override(None).unwrap();
        assert!(!config.network.bind_all_interfaces);

        config.apply_bind_all_override(Some("TRUE")).unwrap();
        assert!(config.network.bind_all_interfaces);

        config.apply_bind_all_override(Some("0")).unwrap();
        assert!(!config.network.bind_all_interfaces);

        assert!(config.apply_bind_all_override(Some("maybe")).is_err());
    }
}
