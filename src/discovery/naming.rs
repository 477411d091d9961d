//! Naming-service discovery (Nacos-style open API).
//!
//! # Responsibilities
//! - Resolve service existence through the instance list endpoint
//! - Build pull-based providers refreshed on an interval
//! - Refresh stale snapshots on demand without blocking selection

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time;

use crate::config::NamingConfig;
use crate::discovery::provider::InstanceSet;
use crate::discovery::{DiscoveryBackend, DiscoveryKind, ServiceInstance, ServiceProvider};
use crate::error::Error;

const INSTANCE_LIST_PATH: &str = "/nacos/v1/ns/instance/list";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct InstanceList {
    #[serde(default)]
    hosts: Vec<NamingHost>,
}

#[derive(Debug, Deserialize)]
struct NamingHost {
    ip: String,
    port: u16,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default = "default_true")]
    healthy: bool,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl NamingHost {
    fn into_instance(self) -> Option<ServiceInstance> {
        if !self.healthy || !self.enabled {
            return None;
        }
        // Fractional weights round up to 1 so a positive weight is never dropped.
        let weight = if self.weight.is_finite() && self.weight > 0.0 {
            self.weight.round().max(1.0) as u32
        } else {
            0
        };
        Some(ServiceInstance {
            host: self.ip,
            port: self.port,
            weight,
            metadata: self.metadata,
        })
    }
}

fn unavailable(reason: impl ToString) -> Error {
    Error::BackendUnavailable {
        backend: DiscoveryKind::Naming.to_string(),
        reason: reason.to_string(),
    }
}

async fn fetch_hosts(
    client: &reqwest::Client,
    config: &NamingConfig,
    service: &str,
) -> Result<Vec<NamingHost>, Error> {
    let url = format!("{}{}", config.server_addr.trim_end_matches('/'), INSTANCE_LIST_PATH);
    let response = client
        .get(&url)
        .query(&[
            ("serviceName", service),
            ("groupName", config.group.as_str()),
            ("namespaceId", config.namespace.as_str()),
            ("clusters", config.cluster.as_str()),
            ("healthyOnly", "true"),
        ])
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(unavailable)?;

    if response.status() == StatusCode::NOT_FOUND {
        return Ok(Vec::new());
    }
    let response = response.error_for_status().map_err(unavailable)?;
    let list: InstanceList = response.json().await.map_err(unavailable)?;
    Ok(list.hosts)
}

/// Pull-based backend talking to a naming server.
#[derive(Debug, Clone)]
pub struct NamingBackend {
    client: reqwest::Client,
    config: NamingConfig,
}

impl NamingBackend {
    pub fn new(config: NamingConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("naming client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl DiscoveryBackend for NamingBackend {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::Naming
    }

    async fn lookup(&self, service: &str) -> Result<bool, Error> {
        let hosts = fetch_hosts(&self.client, &self.config, service).await?;
        Ok(!hosts.is_empty())
    }

    async fn provider(&self, service: &str) -> Result<Arc<dyn ServiceProvider>, Error> {
        let provider = NamingProvider::new(self.client.clone(), self.config.clone(), service);
        provider.refresh().await?;
        spawn_refresher(&provider);

        tracing::info!(
            service = %service,
            instances = provider.instances.snapshot().len(),
            "Naming provider created"
        );
        Ok(provider)
    }
}

/// Provider whose snapshot is pulled from the naming server.
#[derive(Debug)]
pub struct NamingProvider {
    instances: InstanceSet,
    client: reqwest::Client,
    config: NamingConfig,
    refreshing: AtomicBool,
    this: Weak<NamingProvider>,
}

impl NamingProvider {
    fn new(client: reqwest::Client, config: NamingConfig, service: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            instances: InstanceSet::new(service, config.balancer),
            client,
            config,
            refreshing: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.config.refresh_interval_secs.max(1))
    }

    /// Pull a fresh snapshot. On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<(), Error> {
        let hosts = fetch_hosts(&self.client, &self.config, self.instances.service()).await?;
        let instances = hosts.into_iter().filter_map(NamingHost::into_instance).collect();
        self.instances.replace(instances);
        Ok(())
    }

    fn refresh_if_stale(&self) {
        let stale = self
            .instances
            .age()
            .map_or(true, |age| age >= self.refresh_interval());
        if !stale || self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.refreshing.store(false, Ordering::Release);
            return;
        };
        let this = self.this.clone();
        runtime.spawn(async move {
            let Some(provider) = this.upgrade() else {
                return;
            };
            if let Err(e) = provider.refresh().await {
                tracing::warn!(
                    service = %provider.instances.service(),
                    error = %e,
                    "On-demand naming refresh failed, keeping previous snapshot"
                );
            }
            provider.refreshing.store(false, Ordering::Release);
        });
    }
}

impl ServiceProvider for NamingProvider {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::Naming
    }

    fn service_name(&self) -> &str {
        self.instances.service()
    }

    fn select_instance(&self) -> Result<ServiceInstance, Error> {
        self.refresh_if_stale();
        self.instances.select()
    }

    fn instances(&self) -> Vec<ServiceInstance> {
        self.instances.snapshot()
    }
}

fn spawn_refresher(provider: &Arc<NamingProvider>) {
    let weak = Arc::downgrade(provider);
    let period = provider.refresh_interval();

    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        // The first tick completes immediately; the initial snapshot is already loaded.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(provider) = weak.upgrade() else {
                tracing::debug!("Naming provider dropped, stopping refresher");
                break;
            };
            if let Err(e) = provider.refresh().await {
                tracing::warn!(
                    service = %provider.instances.service(),
                    error = %e,
                    "Naming refresh failed, keeping previous snapshot"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU16, AtomicUsize};

    use axum::routing::get;
    use axum::Json;
    use serde_json::json;

    /// Naming server answering with one instance on the port held in `port`.
    async fn start_server(port: Arc<AtomicU16>, hits: Arc<AtomicUsize>) -> String {
        let app = axum::Router::new().route(
            INSTANCE_LIST_PATH,
            get(move || {
                let port = port.load(Ordering::SeqCst);
                hits.fetch_add(1, Ordering::SeqCst);
                async move { Json(json!({ "hosts": [{ "ip": "127.0.0.1", "port": port }] })) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_host_conversion() {
        let list: InstanceList = serde_json::from_str(
            r#"{"hosts":[
                {"ip":"10.0.0.1","port":8080,"weight":2.0,"healthy":true,"enabled":true,"metadata":{"scheme":"https"}},
                {"ip":"10.0.0.2","port":8080,"weight":1.0,"healthy":false,"enabled":true},
                {"ip":"10.0.0.3","port":8080,"weight":0.0},
                {"ip":"10.0.0.4","port":8080,"weight":0.4}
            ]}"#,
        )
        .unwrap();

        let instances: Vec<_> = list.hosts.into_iter().filter_map(NamingHost::into_instance).collect();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[0].weight, 2);
        assert_eq!(instances[0].metadata.get("scheme").map(String::as_str), Some("https"));
        assert_eq!(instances[1].host, "10.0.0.3");
        assert_eq!(instances[1].weight, 0);
        assert_eq!(instances[2].weight, 1);
    }

    #[test]
    fn test_missing_hosts_field() {
        let list: InstanceList = serde_json::from_str("{}").unwrap();
        assert!(list.hosts.is_empty());
    }

    #[tokio::test]
    async fn test_stale_selection_refreshes_in_background() {
        let port = Arc::new(AtomicU16::new(3001));
        let hits = Arc::new(AtomicUsize::new(0));
        let config = NamingConfig {
            server_addr: start_server(Arc::clone(&port), Arc::clone(&hits)).await,
            refresh_interval_secs: 1,
            ..NamingConfig::default()
        };

        // No interval task: only on-demand refreshes reach the server.
        let provider = NamingProvider::new(reqwest::Client::new(), config, "orders");
        provider.refresh().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        port.store(3002, Ordering::SeqCst);
        assert_eq!(provider.select_instance().unwrap().port, 3001);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "fresh snapshot must not refresh");

        // Stale: selection is served from the old snapshot and a single refresh starts.
        for _ in 0..5 {
            assert_eq!(provider.select_instance().unwrap().port, 3001);
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while provider.instances()[0].port != 3002 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(provider.instances()[0].port, 3002);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!provider.refreshing.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_backend_unavailable() {
        let config = NamingConfig {
            server_addr: "http://127.0.0.1:1".to_string(),
            ..NamingConfig::default()
        };
        let backend = NamingBackend::new(config).unwrap();
        let err = backend.lookup("orders").await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { ref backend, .. } if backend == "naming"));
    }
}
