//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Discovery refresh (pull or push)
//!     → LoadBalancer::set_instances (rebuild state only if the set changed)
//!
//! ServiceProvider::select_instance
//!     → LoadBalancer::next_server:
//!         - weighted.rs (plain WRR: expanded cycle + cursor)
//!         - smooth.rs (smooth WRR: running current weights)
//!     → ServiceInstance or None (empty / all weights zero)
//! ```
//!
//! # Design Decisions
//! - Balancers own their instance snapshot; callers serialize access with a mutex
//! - Weight 0 instances stay in the snapshot but are never picked
//! - Selection never performs I/O

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::discovery::ServiceInstance;

pub mod smooth;
pub mod weighted;

pub use smooth::SmoothWeightedRoundRobin;
pub use weighted::WeightedRoundRobin;

/// Weighted selection over a replaceable instance set.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Replace the instance set. Implementations reset their state only when the set changed.
    fn set_instances(&mut self, instances: Vec<ServiceInstance>);

    /// Next instance, or `None` when nothing is selectable.
    fn next_server(&mut self) -> Option<ServiceInstance>;

    /// Current snapshot, including zero-weight instances.
    fn instances(&self) -> &[ServiceInstance];

    fn len(&self) -> usize {
        self.instances().len()
    }

    fn is_empty(&self) -> bool {
        self.instances().is_empty()
    }
}

/// Which balancer a discovery backend builds for its providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerKind {
    /// Plain weighted round robin.
    #[default]
    Wrr,
    /// Smooth (nginx-style) weighted round robin.
    Smooth,
}

impl LoadBalancerKind {
    pub fn build(self) -> Box<dyn LoadBalancer> {
        match self {
            LoadBalancerKind::Wrr => Box::new(WeightedRoundRobin::new()),
            LoadBalancerKind::Smooth => Box::new(SmoothWeightedRoundRobin::new()),
        }
    }
}
