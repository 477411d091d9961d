//! Balancer-backed instance snapshot shared by every provider kind.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::discovery::ServiceInstance;
use crate::error::Error;
use crate::load_balancer::{LoadBalancer, LoadBalancerKind};

#[derive(Debug)]
struct State {
    balancer: Box<dyn LoadBalancer>,
    refreshed_at: Option<Instant>,
}

/// Instance snapshot plus balancer state for one service.
///
/// The mutex is held only while swapping the snapshot or advancing the
/// balancer, never across a network call.
#[derive(Debug)]
pub struct InstanceSet {
    service: String,
    state: Mutex<State>,
}

impl InstanceSet {
    pub fn new(service: impl Into<String>, kind: LoadBalancerKind) -> Self {
        Self {
            service: service.into(),
            state: Mutex::new(State {
                balancer: kind.build(),
                refreshed_at: None,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Replace the snapshot and stamp the refresh time.
    pub fn replace(&self, instances: Vec<ServiceInstance>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.balancer.set_instances(instances);
        state.refreshed_at = Some(Instant::now());
    }

    pub fn select(&self) -> Result<ServiceInstance, Error> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .balancer
            .next_server()
            .ok_or_else(|| Error::NoAvailableInstance(self.service.clone()))
    }

    pub fn snapshot(&self) -> Vec<ServiceInstance> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.balancer.instances().to_vec()
    }

    /// Time since the last refresh, `None` before the first one.
    pub fn age(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.refreshed_at.map(|at| at.elapsed())
    }
}
