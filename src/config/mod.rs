//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, apply env overrides)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed by HttpServer at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → sent to the running server
//!     → server rebuilds discovery backends, Gateway::reconfigure swaps them in
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only discovery settings are hot-reloadable; routes are fixed at startup

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    DiscoveryConfig, GatewayConfig, GossipConfig, ListenerConfig, NamingConfig, ObservabilityConfig,
    ProxyConfig, RouterConfig, SecurityConfig, TimeoutConfig, WatchConfig,
};
