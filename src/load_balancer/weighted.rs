//! Plain weighted round-robin strategy.

use crate::discovery::ServiceInstance;
use crate::load_balancer::LoadBalancer;

/// Weighted round-robin selector.
///
/// Instance `i` owns `weight_i / gcd` consecutive slots of a repeating cycle,
/// in list order. Only the cumulative slot bounds are stored, so memory is
/// linear in the number of instances whatever their weights. A cursor walks
/// the cycle; replacing the instance set with a different one rewinds it to 0.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    instances: Vec<ServiceInstance>,
    /// `(exclusive upper slot bound, instance index)`, ascending.
    bounds: Vec<(u64, usize)>,
    total: u64,
    cursor: u64,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of one full cycle.
    pub fn cycle_len(&self) -> u64 {
        self.total
    }

    fn rebuild(&mut self) {
        let divisor = self
            .instances
            .iter()
            .map(|i| i.weight)
            .filter(|w| *w > 0)
            .fold(0, gcd)
            .max(1);

        let mut total = 0u64;
        self.bounds = self
            .instances
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.weight > 0)
            .map(|(idx, inst)| {
                total += u64::from(inst.weight / divisor);
                (total, idx)
            })
            .collect();
        self.total = total;
        self.cursor = 0;
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn set_instances(&mut self, instances: Vec<ServiceInstance>) {
        if instances == self.instances {
            return;
        }
        self.instances = instances;
        self.rebuild();
    }

    fn next_server(&mut self) -> Option<ServiceInstance> {
        if self.total == 0 {
            return None;
        }
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % self.total;

        let pos = self.bounds.partition_point(|(end, _)| *end <= slot);
        let (_, idx) = self.bounds.get(pos)?;
        self.instances.get(*idx).cloned()
    }

    fn instances(&self) -> &[ServiceInstance] {
        &self.instances
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
