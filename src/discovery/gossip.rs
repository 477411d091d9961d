//! Gossip-membership discovery.
//!
//! An external gossip agent feeds [`MembershipEvent`]s into
//! [`GossipMembership`]. Members advertise the service they run through
//! tags; every change republishes the affected services' snapshots on
//! per-service watch channels, which providers read lazily on selection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::discovery::provider::InstanceSet;
use crate::discovery::{DiscoveryBackend, DiscoveryKind, ServiceInstance, ServiceProvider};
use crate::error::Error;
use crate::load_balancer::LoadBalancerKind;

const PORT_TAG: &str = "port";
const WEIGHT_TAG: &str = "weight";

/// A cluster member as reported by the gossip agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Unique member name within the cluster.
    pub name: String,
    pub addr: String,
    pub tags: HashMap<String, String>,
}

impl Member {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Join(Member),
    Update(Member),
    /// Member name.
    Leave(String),
}

/// Concurrent member table with per-service snapshot channels.
#[derive(Debug)]
pub struct GossipMembership {
    service_tag: String,
    members: DashMap<String, Member>,
    channels: DashMap<String, watch::Sender<Vec<ServiceInstance>>>,
}

impl GossipMembership {
    pub fn new(service_tag: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            service_tag: service_tag.into(),
            members: DashMap::new(),
            channels: DashMap::new(),
        })
    }

    /// Apply one membership change and republish the services it touched.
    pub fn apply(&self, event: MembershipEvent) {
        let mut touched = Vec::with_capacity(2);
        match event {
            MembershipEvent::Join(member) | MembershipEvent::Update(member) => {
                if let Some(service) = member.tags.get(&self.service_tag) {
                    touched.push(service.clone());
                }
                tracing::debug!(member = %member.name, addr = %member.addr, "Gossip member up");
                if let Some(previous) = self.members.insert(member.name.clone(), member) {
                    touched.extend(previous.tags.get(&self.service_tag).cloned());
                }
            }
            MembershipEvent::Leave(name) => {
                if let Some((_, previous)) = self.members.remove(&name) {
                    tracing::debug!(member = %name, "Gossip member left");
                    touched.extend(previous.tags.get(&self.service_tag).cloned());
                }
            }
        }

        touched.dedup();
        for service in touched {
            self.publish(&service);
        }
    }

    /// Consume events from the agent until the feed closes.
    pub fn spawn(self: &Arc<Self>, mut events: mpsc::Receiver<MembershipEvent>) -> JoinHandle<()> {
        let membership = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                membership.apply(event);
            }
            tracing::info!("Gossip membership feed closed");
        })
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.tags.get(&self.service_tag).is_some_and(|s| s == service))
    }

    /// Instances currently advertising `service`, ordered by address.
    pub fn instances_for(&self, service: &str) -> Vec<ServiceInstance> {
        let mut instances: Vec<ServiceInstance> = self
            .members
            .iter()
            .filter(|m| m.tags.get(&self.service_tag).is_some_and(|s| s == service))
            .filter_map(|m| self.to_instance(m.value()))
            .collect();
        instances.sort_by(|a, b| a.host.cmp(&b.host).then(a.port.cmp(&b.port)));
        instances
    }

    /// Receiver for `service` snapshots, seeded with the current one.
    ///
    /// The seed is read under the channel entry lock, which `publish` also
    /// takes, so a change racing with the first subscriber is never lost.
    pub fn subscribe(&self, service: &str) -> watch::Receiver<Vec<ServiceInstance>> {
        if let Some(sender) = self.channels.get(service) {
            return sender.subscribe();
        }
        self.channels
            .entry(service.to_string())
            .or_insert_with(|| watch::channel(self.instances_for(service)).0)
            .subscribe()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn publish(&self, service: &str) {
        if let Some(sender) = self.channels.get(service) {
            sender.send_replace(self.instances_for(service));
        }
    }

    fn to_instance(&self, member: &Member) -> Option<ServiceInstance> {
        let Some(port) = member.tags.get(PORT_TAG).and_then(|p| p.parse::<u16>().ok()) else {
            tracing::debug!(member = %member.name, "Gossip member without a valid port tag, skipping");
            return None;
        };
        let weight = member
            .tags
            .get(WEIGHT_TAG)
            .and_then(|w| w.parse().ok())
            .unwrap_or(1);
        let metadata = member
            .tags
            .iter()
            .filter(|(k, _)| k.as_str() != self.service_tag && k.as_str() != PORT_TAG && k.as_str() != WEIGHT_TAG)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(ServiceInstance {
            host: member.addr.clone(),
            port,
            weight,
            metadata,
        })
    }
}

/// Push-based backend over a shared membership table.
#[derive(Debug, Clone)]
pub struct GossipBackend {
    membership: Arc<GossipMembership>,
    balancer: LoadBalancerKind,
}

impl GossipBackend {
    pub fn new(membership: Arc<GossipMembership>, balancer: LoadBalancerKind) -> Self {
        Self { membership, balancer }
    }
}

#[async_trait]
impl DiscoveryBackend for GossipBackend {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::Gossip
    }

    async fn lookup(&self, service: &str) -> Result<bool, Error> {
        Ok(self.membership.has_service(service))
    }

    async fn provider(&self, service: &str) -> Result<Arc<dyn ServiceProvider>, Error> {
        let mut updates = self.membership.subscribe(service);
        let instances = InstanceSet::new(service, self.balancer);
        instances.replace(updates.borrow_and_update().clone());

        tracing::info!(service = %service, "Gossip provider created");
        Ok(Arc::new(GossipProvider {
            instances,
            updates: Mutex::new(updates),
        }))
    }
}

/// Provider that applies pushed snapshots on the next selection.
#[derive(Debug)]
pub struct GossipProvider {
    instances: InstanceSet,
    updates: Mutex<watch::Receiver<Vec<ServiceInstance>>>,
}

impl GossipProvider {
    fn sync(&self) {
        let mut updates = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
        if updates.has_changed().unwrap_or(false) {
            let snapshot = updates.borrow_and_update().clone();
            self.instances.replace(snapshot);
        }
    }
}

impl ServiceProvider for GossipProvider {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::Gossip
    }

    fn service_name(&self) -> &str {
        self.instances.service()
    }

    fn select_instance(&self) -> Result<ServiceInstance, Error> {
        self.sync();
        self.instances.select()
    }

    fn instances(&self) -> Vec<ServiceInstance> {
        self.sync();
        self.instances.snapshot()
    }
}
