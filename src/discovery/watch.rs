//! Watch-service discovery (Consul-style catalog and health API).
//!
//! # Responsibilities
//! - Check service existence in the catalog
//! - Keep provider snapshots current with blocking queries
//! - Back off with jitter while the agent is unreachable

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time;
use url::Url;

use crate::config::WatchConfig;
use crate::discovery::provider::InstanceSet;
use crate::discovery::{DiscoveryBackend, DiscoveryKind, ServiceInstance, ServiceProvider};
use crate::error::Error;
use crate::resilience::Backoff;

const INDEX_HEADER: &str = "x-consul-index";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Minimum pause between polls when the agent answers without blocking.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    node: HealthNode,
    service: HealthService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthNode {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthService {
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    weights: Option<ServiceWeights>,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceWeights {
    passing: u32,
}

impl HealthEntry {
    fn into_instance(self) -> ServiceInstance {
        let host = if self.service.address.is_empty() {
            self.node.address
        } else {
            self.service.address
        };
        ServiceInstance {
            host,
            port: self.service.port,
            weight: self.service.weights.map_or(1, |w| w.passing),
            metadata: self.service.meta.unwrap_or_default(),
        }
    }
}

fn unavailable(reason: impl ToString) -> Error {
    Error::BackendUnavailable {
        backend: DiscoveryKind::Watch.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone)]
struct WatchClient {
    http: reqwest::Client,
    config: WatchConfig,
}

impl WatchClient {
    /// `{address}/v1/{api}/service/{service}` with the service name encoded
    /// as a single path segment.
    fn service_url(&self, api: &str, service: &str) -> Result<Url, Error> {
        if matches!(service, "" | "." | "..") {
            return Err(Error::ServiceNotFound(service.to_string()));
        }
        let mut url = Url::parse(&self.config.address).map_err(unavailable)?;
        url.path_segments_mut()
            .map_err(|_| unavailable("agent address cannot carry a path"))?
            .pop_if_empty()
            .extend(["v1", api, "service", service]);
        Ok(url)
    }

    fn datacenter(&self) -> Option<(&'static str, &str)> {
        (!self.config.datacenter.is_empty()).then_some(("dc", self.config.datacenter.as_str()))
    }

    async fn service_exists(&self, service: &str) -> Result<bool, Error> {
        let mut request = self
            .http
            .get(self.service_url("catalog", service)?)
            .timeout(LOOKUP_TIMEOUT);
        if let Some(dc) = self.datacenter() {
            request = request.query(&[dc]);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?;
        let entries: Vec<serde_json::Value> = response.json().await.map_err(unavailable)?;
        Ok(!entries.is_empty())
    }

    /// Passing instances of `service`. With a non-zero `index` the agent
    /// holds the request until the result changes or `wait` expires.
    async fn healthy_instances(
        &self,
        service: &str,
        index: u64,
    ) -> Result<(Vec<ServiceInstance>, u64), Error> {
        let wait = Duration::from_secs(self.config.wait_secs);
        let mut request = self
            .http
            .get(self.service_url("health", service)?)
            .query(&[("passing", "true")])
            .timeout(wait + LOOKUP_TIMEOUT);
        if let Some(dc) = self.datacenter() {
            request = request.query(&[dc]);
        }
        if index > 0 {
            request = request.query(&[
                ("index", index.to_string()),
                ("wait", format!("{}s", self.config.wait_secs)),
            ]);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?;
        let new_index = response
            .headers()
            .get(INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let entries: Vec<HealthEntry> = response.json().await.map_err(unavailable)?;
        let instances = entries.into_iter().map(HealthEntry::into_instance).collect();
        Ok((instances, new_index))
    }
}

/// Pull-based backend driven by blocking queries against a watch agent.
#[derive(Debug, Clone)]
pub struct WatchBackend {
    client: WatchClient,
}

impl WatchBackend {
    pub fn new(config: WatchConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("watch client: {e}")))?;
        Ok(Self {
            client: WatchClient { http, config },
        })
    }
}

#[async_trait]
impl DiscoveryBackend for WatchBackend {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::Watch
    }

    async fn lookup(&self, service: &str) -> Result<bool, Error> {
        self.client.service_exists(service).await
    }

    async fn provider(&self, service: &str) -> Result<Arc<dyn ServiceProvider>, Error> {
        let (instances, index) = self.client.healthy_instances(service, 0).await?;
        let provider = Arc::new(WatchProvider {
            instances: InstanceSet::new(service, self.client.config.balancer),
        });
        provider.instances.replace(instances);

        tokio::spawn(watch_loop(
            Arc::downgrade(&provider),
            self.client.clone(),
            service.to_string(),
            index,
        ));

        tracing::info!(service = %service, index, "Watch provider created");
        Ok(provider)
    }
}

/// Provider kept current by a background blocking-query loop.
#[derive(Debug)]
pub struct WatchProvider {
    instances: InstanceSet,
}

impl ServiceProvider for WatchProvider {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::Watch
    }

    fn service_name(&self) -> &str {
        self.instances.service()
    }

    fn select_instance(&self) -> Result<ServiceInstance, Error> {
        self.instances.select()
    }

    fn instances(&self) -> Vec<ServiceInstance> {
        self.instances.snapshot()
    }
}

async fn watch_loop(provider: Weak<WatchProvider>, client: WatchClient, service: String, mut index: u64) {
    let mut backoff = Backoff::default();

    loop {
        if provider.strong_count() == 0 {
            break;
        }

        match client.healthy_instances(&service, index).await {
            Ok((instances, new_index)) => {
                backoff.reset();
                let Some(provider) = provider.upgrade() else {
                    break;
                };
                provider.instances.replace(instances);
                drop(provider);

                let unchanged = new_index == index;
                // An index that goes backwards means the agent state was reset.
                index = if new_index < index { 0 } else { new_index };
                if unchanged || index == 0 {
                    time::sleep(MIN_POLL_INTERVAL).await;
                }
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    service = %service,
                    error = %e,
                    attempt = backoff.attempt(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Watch query failed"
                );
                time::sleep(delay).await;
            }
        }
    }

    tracing::debug!(service = %service, "Watch provider dropped, stopping watch loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_entry_conversion() {
        let entries: Vec<HealthEntry> = serde_json::from_str(
            r#"[
                {"Node":{"Address":"10.0.0.9"},"Service":{"Address":"","Port":9000,"Weights":{"Passing":3,"Warning":1},"Meta":{"context_path":"/api"}}},
                {"Node":{"Address":"10.0.0.8"},"Service":{"Address":"192.168.1.5","Port":9001,"Meta":null}}
            ]"#,
        )
        .unwrap();

        let instances: Vec<_> = entries.into_iter().map(HealthEntry::into_instance).collect();
        assert_eq!(instances[0].host, "10.0.0.9");
        assert_eq!(instances[0].weight, 3);
        assert_eq!(instances[0].metadata.get("context_path").map(String::as_str), Some("/api"));
        assert_eq!(instances[1].address(), "192.168.1.5:9001");
        assert_eq!(instances[1].weight, 1);
        assert!(instances[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_service_name_is_one_encoded_segment() {
        let backend = WatchBackend::new(WatchConfig {
            address: "http://consul.local:8500/".to_string(),
            ..WatchConfig::default()
        })
        .unwrap();
        let client = &backend.client;

        assert_eq!(
            client.service_url("health", "orders").unwrap().as_str(),
            "http://consul.local:8500/v1/health/service/orders"
        );
        assert_eq!(
            client.service_url("catalog", "a%2Fb?x").unwrap().as_str(),
            "http://consul.local:8500/v1/catalog/service/a%252Fb%3Fx"
        );
        for name in ["", ".", ".."] {
            assert!(matches!(
                client.service_url("catalog", name),
                Err(Error::ServiceNotFound(ref s)) if s == name
            ));
        }
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_backend_unavailable() {
        let config = WatchConfig {
            address: "http://127.0.0.1:1".to_string(),
            ..WatchConfig::default()
        };
        let backend = WatchBackend::new(config).unwrap();
        let err = backend.lookup("orders").await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { ref backend, .. } if backend == "watch"));
    }
}
