//! Smooth weighted round-robin strategy.

use crate::discovery::ServiceInstance;
use crate::load_balancer::LoadBalancer;

#[derive(Debug, Clone)]
struct Peer {
    instance: ServiceInstance,
    current: i64,
}

/// Smooth weighted round-robin selector (nginx style).
///
/// Each pick adds every peer's weight to its running `current`, chooses the
/// peer with the highest `current` (earliest on ties) and subtracts the total
/// weight from it. Heavy peers are spread across the cycle instead of bursting.
#[derive(Debug, Default)]
pub struct SmoothWeightedRoundRobin {
    instances: Vec<ServiceInstance>,
    peers: Vec<Peer>,
}

impl SmoothWeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Running weight of the peer at `address`.
    pub fn current_weight(&self, address: &str) -> Option<i64> {
        self.peers
            .iter()
            .find(|p| p.instance.address() == address)
            .map(|p| p.current)
    }
}

impl LoadBalancer for SmoothWeightedRoundRobin {
    fn set_instances(&mut self, instances: Vec<ServiceInstance>) {
        if instances == self.instances {
            return;
        }

        // Carry running weights over for addresses that survive the refresh.
        let peers = instances
            .iter()
            .filter(|i| i.is_selectable())
            .map(|instance| {
                let address = instance.address();
                let current = self
                    .peers
                    .iter()
                    .find(|p| p.instance.address() == address)
                    .map_or(0, |p| p.current);
                Peer {
                    instance: instance.clone(),
                    current,
                }
            })
            .collect();

        self.peers = peers;
        self.instances = instances;
    }

    fn next_server(&mut self) -> Option<ServiceInstance> {
        if self.peers.is_empty() {
            return None;
        }

        let mut total: i64 = 0;
        let mut best = 0;
        let mut best_current = i64::MIN;
        for (idx, peer) in self.peers.iter_mut().enumerate() {
            let weight = i64::from(peer.instance.weight);
            peer.current += weight;
            total += weight;
            if peer.current > best_current {
                best = idx;
                best_current = peer.current;
            }
        }

        let chosen = &mut self.peers[best];
        chosen.current -= total;
        Some(chosen.instance.clone())
    }

    fn instances(&self) -> &[ServiceInstance] {
        &self.instances
    }
}
