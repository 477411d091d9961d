//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::load_balancer::LoadBalancerKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Router behaviour toggles.
    pub router: RouterConfig,

    /// Reverse-proxy gateway settings.
    pub gateway: GatewayConfig,

    /// Service discovery backends.
    pub discovery: DiscoveryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Router toggles.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Answer 405 + `Allow` when another method matches the path (404 otherwise).
    pub handle_method_not_allowed: bool,

    /// Answer OPTIONS automatically when no OPTIONS route is registered.
    pub handle_options: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            handle_method_not_allowed: true,
            handle_options: true,
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Mount the proxy routes.
    pub enabled: bool,

    /// Path under which `/{service}/{rest...}` is proxied ("/" for the root).
    pub root: String,

    /// Maximum number of cached service providers.
    pub cache_capacity: usize,

    /// Comma-separated discovery backend priority list (naming, watch, gossip).
    pub discovery_modes: String,

    /// Deadline for a single downstream round trip, in seconds.
    pub forward_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: "/".to_string(),
            cache_capacity: 128,
            discovery_modes: "naming".to_string(),
            forward_timeout_secs: 30,
        }
    }
}

/// Per-backend discovery settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub naming: NamingConfig,
    pub watch: WatchConfig,
    pub gossip: GossipConfig,
}

/// Naming-service (Nacos-style) backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Base URL of the naming server.
    pub server_addr: String,

    pub namespace: String,

    pub group: String,

    /// Comma-separated cluster names; empty means all clusters.
    pub cluster: String,

    /// Instance list refresh period in seconds.
    pub refresh_interval_secs: u64,

    pub balancer: LoadBalancerKind,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            server_addr: "http://127.0.0.1:8848".to_string(),
            namespace: "public".to_string(),
            group: "DEFAULT_GROUP".to_string(),
            cluster: String::new(),
            refresh_interval_secs: 10,
            balancer: LoadBalancerKind::Wrr,
        }
    }
}

/// Watch-service (Consul-style) backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Base URL of the agent.
    pub address: String,

    /// Datacenter; empty means the agent's own.
    pub datacenter: String,

    /// Blocking query wait time in seconds.
    pub wait_secs: u64,

    pub balancer: LoadBalancerKind,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8500".to_string(),
            datacenter: String::new(),
            wait_secs: 30,
            balancer: LoadBalancerKind::Smooth,
        }
    }
}

/// Gossip membership backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Member tag holding the service name.
    pub service_tag: String,

    pub balancer: LoadBalancerKind,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            service_tag: "service".to_string(),
            balancer: LoadBalancerKind::Smooth,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 60,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 8 * 1024 * 1024, // 8MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "text" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [gateway]
            enabled = true
            discovery_modes = "watch,naming"

            [discovery.watch]
            datacenter = "dc2"
            balancer = "wrr"
            "#,
        )
        .unwrap();

        assert!(config.gateway.enabled);
        assert_eq!(config.gateway.cache_capacity, 128);
        assert_eq!(config.gateway.root, "/");
        assert_eq!(config.discovery.watch.datacenter, "dc2");
        assert_eq!(config.discovery.watch.balancer, LoadBalancerKind::Wrr);
        assert_eq!(config.discovery.naming.group, "DEFAULT_GROUP");
        assert!(config.router.handle_options);
    }
}
