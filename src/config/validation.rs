//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, capacity > 0, addresses parse)
//! - Check that every configured discovery mode is known and has usable settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::discovery::{parse_modes, DiscoveryKind};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("gateway.root '{0}' must start with '/' and must not end with '/' (unless it is '/')")]
    GatewayRoot(String),

    #[error("gateway.discovery_modes: {0}")]
    DiscoveryModes(String),

    #[error("{field} '{value}' is not an absolute http(s) URL")]
    Url { field: &'static str, value: String },

    #[error("observability.log_format '{0}' must be 'text' or 'json'")]
    LogFormat(String),
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_connections" });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.connect_secs" });
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero { field: "security.max_body_size" });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(config.observability.metrics_address.clone()));
    }
    if !matches!(config.observability.log_format.as_str(), "text" | "json") {
        errors.push(ValidationError::LogFormat(config.observability.log_format.clone()));
    }

    if config.gateway.enabled {
        validate_gateway(config, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_gateway(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let gateway = &config.gateway;

    let root = gateway.root.as_str();
    if root != "/" && (!root.starts_with('/') || root.ends_with('/')) {
        errors.push(ValidationError::GatewayRoot(root.to_string()));
    }
    if gateway.cache_capacity == 0 {
        errors.push(ValidationError::Zero { field: "gateway.cache_capacity" });
    }
    if gateway.forward_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "gateway.forward_timeout_secs" });
    }

    let modes = match parse_modes(&gateway.discovery_modes) {
        Ok(modes) if modes.is_empty() => {
            errors.push(ValidationError::DiscoveryModes("at least one mode is required".into()));
            return;
        }
        Ok(modes) => modes,
        Err(e) => {
            errors.push(ValidationError::DiscoveryModes(e.to_string()));
            return;
        }
    };

    for mode in modes {
        match mode {
            DiscoveryKind::Naming => {
                check_url("discovery.naming.server_addr", &config.discovery.naming.server_addr, errors);
                if config.discovery.naming.refresh_interval_secs == 0 {
                    errors.push(ValidationError::Zero { field: "discovery.naming.refresh_interval_secs" });
                }
            }
            DiscoveryKind::Watch => {
                check_url("discovery.watch.address", &config.discovery.watch.address, errors);
                if config.discovery.watch.wait_secs == 0 {
                    errors.push(ValidationError::Zero { field: "discovery.watch.wait_secs" });
                }
            }
            DiscoveryKind::Gossip => {}
        }
    }
}

fn check_url(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    let ok = url::Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        .unwrap_or(false);
    if !ok {
        errors.push(ValidationError::Url {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.gateway.enabled = true;
        config.gateway.cache_capacity = 0;
        config.gateway.root = "/api/".into();
        config.gateway.discovery_modes = "naming,zookeeper".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero { field: "gateway.cache_capacity" }));
        assert!(errors.contains(&ValidationError::GatewayRoot("/api/".into())));
    }

    #[test]
    fn test_mode_specific_checks() {
        let mut config = ProxyConfig::default();
        config.gateway.enabled = true;
        config.gateway.discovery_modes = "watch, gossip".into();
        config.discovery.watch.address = "consul:8500".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ValidationError::Url { field: "discovery.watch.address", .. }));
    }
}
