//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway (service name)
//!     → DiscoveryBackend::lookup, tried in configured priority order
//!     → first backend answering `true` builds a ServiceProvider:
//!         - naming.rs (pull: interval refresh + on-demand refresh when stale)
//!         - watch.rs  (pull: blocking queries with index/wait, backoff on error)
//!         - gossip.rs (push: membership events → per-service watch channel)
//!     → ServiceProvider::select_server → "host:port"
//! ```
//!
//! # Design Decisions
//! - Backend kinds are a closed enum; each backend is a trait object so the
//!   gateway can hold a heterogeneous priority list
//! - Providers own their balancer; selection never waits on the network
//! - Background refreshers hold `Weak` provider references and stop once the
//!   provider is dropped

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DiscoveryConfig;
use crate::error::Error;

pub mod gossip;
pub mod instance;
pub mod naming;
pub mod provider;
pub mod watch;

pub use gossip::{GossipBackend, GossipMembership, Member, MembershipEvent};
pub use instance::ServiceInstance;
pub use naming::NamingBackend;
pub use watch::WatchBackend;

/// Discovery backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryKind {
    Naming,
    Watch,
    Gossip,
}

impl DiscoveryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscoveryKind::Naming => "naming",
            DiscoveryKind::Watch => "watch",
            DiscoveryKind::Gossip => "gossip",
        }
    }
}

impl fmt::Display for DiscoveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naming" => Ok(DiscoveryKind::Naming),
            "watch" => Ok(DiscoveryKind::Watch),
            "gossip" => Ok(DiscoveryKind::Gossip),
            other => Err(Error::UnsupportedBackend(other.to_string())),
        }
    }
}

/// Parse a comma-separated priority list such as `"naming,watch"`.
///
/// Blank entries are skipped and repeated kinds keep their first position.
pub fn parse_modes(modes: &str) -> Result<Vec<DiscoveryKind>, Error> {
    let mut kinds = Vec::new();
    for tag in modes.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let kind: DiscoveryKind = tag.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

/// Per-service view over one backend: the instance snapshot plus balancer state.
pub trait ServiceProvider: Send + Sync + fmt::Debug {
    fn kind(&self) -> DiscoveryKind;

    fn service_name(&self) -> &str;

    /// Pick the next instance. Never blocks on I/O.
    fn select_instance(&self) -> Result<ServiceInstance, Error>;

    /// Current snapshot, including zero-weight instances.
    fn instances(&self) -> Vec<ServiceInstance>;

    /// Pick the next instance and return its `host:port`.
    fn select_server(&self) -> Result<String, Error> {
        self.select_instance().map(|instance| instance.address())
    }
}

/// A discovery source the gateway can ask about services.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> DiscoveryKind;

    /// Whether this backend knows `service`. Errors mean the backend is unreachable.
    async fn lookup(&self, service: &str) -> Result<bool, Error>;

    /// Build a provider for `service`, including its initial snapshot.
    async fn provider(&self, service: &str) -> Result<Arc<dyn ServiceProvider>, Error>;
}

/// Build the backends named in `modes`, preserving their order.
///
/// Gossip needs an externally fed membership table; requesting it without one
/// is a configuration error.
pub fn build_backends(
    config: &DiscoveryConfig,
    modes: &[DiscoveryKind],
    gossip: Option<&Arc<GossipMembership>>,
) -> Result<Vec<Arc<dyn DiscoveryBackend>>, Error> {
    let mut backends: Vec<Arc<dyn DiscoveryBackend>> = Vec::with_capacity(modes.len());
    for kind in modes {
        let backend: Arc<dyn DiscoveryBackend> = match kind {
            DiscoveryKind::Naming => Arc::new(NamingBackend::new(config.naming.clone())?),
            DiscoveryKind::Watch => Arc::new(WatchBackend::new(config.watch.clone())?),
            DiscoveryKind::Gossip => {
                let membership = gossip.ok_or_else(|| {
                    Error::Internal("gossip discovery requires a membership feed".to_string())
                })?;
                Arc::new(GossipBackend::new(Arc::clone(membership), config.gossip.balancer))
            }
        };
        tracing::debug!(backend = %kind, "Discovery backend configured");
        backends.push(backend);
    }
    Ok(backends)
}
