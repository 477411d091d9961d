//! Service router and discovery gateway library.
//!
//! A method + path router with middleware chaining, plus a reverse-proxy
//! gateway that resolves `{root}/{service}/...` through pluggable service
//! discovery backends and weighted load balancing.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod routing;

// Traffic management
pub mod discovery;
pub mod gateway;
pub mod load_balancer;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use error::{Error, RouteError};
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::Router;
