//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load a TOML file, apply environment overrides, then validate.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config: ProxyConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Defaults plus environment overrides, validated. Used when no file is given.
pub fn load_from_env() -> Result<ProxyConfig, ConfigError> {
    let mut config = ProxyConfig::default();
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay the discovery settings that deployments inject through the environment.
///
/// | Variable | Field |
/// |---|---|
/// | `GATEWAY_DISCOVERY_MODES` | `gateway.discovery_modes` |
/// | `NAMING_NAMESPACE` | `discovery.naming.namespace` |
/// | `NAMING_GROUP` | `discovery.naming.group` |
/// | `NAMING_CLUSTER` | `discovery.naming.cluster` |
/// | `WATCH_DATACENTER` | `discovery.watch.datacenter` |
pub fn apply_overrides(config: &mut ProxyConfig, lookup: impl Fn(&str) -> Option<String>) {
    let overrides: [(&str, &mut String); 5] = [
        ("GATEWAY_DISCOVERY_MODES", &mut config.gateway.discovery_modes),
        ("NAMING_NAMESPACE", &mut config.discovery.naming.namespace),
        ("NAMING_GROUP", &mut config.discovery.naming.group),
        ("NAMING_CLUSTER", &mut config.discovery.naming.cluster),
        ("WATCH_DATACENTER", &mut config.discovery.watch.datacenter),
    ];

    for (key, field) in overrides {
        if let Some(value) = lookup(key) {
            tracing::debug!(key, value = %value, "Config override from environment");
            *field = value;
        }
    }
}
