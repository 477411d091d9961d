//! Service-discovery gateway.
//!
//! # Data Flow
//! ```text
//! {root}/:service/*path
//!     → reject WebSocket / SSE (502)
//!     → ProviderCache hit (backend kind still configured?) or
//!       backends in priority order: lookup → provider → cache
//!     → ServiceProvider::select_instance → ProxyTarget
//!     → proxy::forward (strip root + service, rewrite, stream response)
//! ```
//!
//! # Design Decisions
//! - The backend list lives behind `ArcSwap`, so reconfiguration never blocks requests
//! - Discovery I/O happens outside the cache lock; racing builders double-check
//! - Every failure is an `Error` for the recovery middleware to render

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Method, Request};

use crate::config::ProxyConfig;
use crate::discovery::{
    build_backends, parse_modes, DiscoveryBackend, DiscoveryKind, GossipMembership, ServiceProvider,
};
use crate::error::{Error, RouteError};
use crate::http::handler::{route_fn, HandlerResult};
use crate::observability::metrics::{record_cache_event, record_upstream_error, CacheEvent};
use crate::routing::{Params, Router};

pub mod cache;
pub mod proxy;

pub use cache::ProviderCache;
pub use proxy::{HttpClient, ProxyTarget};

/// Route name used for every proxied request.
pub const ROUTE_NAME: &str = "gateway";

const SERVICE_PARAM: &str = "service";
const PATH_PARAM: &str = "path";

const PROXY_METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Routes `{root}/{service}/...` to instances found through discovery.
pub struct Gateway {
    backends: ArcSwap<Vec<Arc<dyn DiscoveryBackend>>>,
    cache: ProviderCache,
    client: HttpClient,
    root: String,
    forward_timeout: Duration,
}

impl Gateway {
    pub fn new(config: &ProxyConfig, backends: Vec<Arc<dyn DiscoveryBackend>>) -> Self {
        let root = config.gateway.root.trim_end_matches('/').to_string();
        Self {
            backends: ArcSwap::from_pointee(backends),
            cache: ProviderCache::new(config.gateway.cache_capacity),
            client: proxy::build_client(Duration::from_secs(config.timeouts.connect_secs)),
            root,
            forward_timeout: Duration::from_secs(config.gateway.forward_timeout_secs),
        }
    }

    /// Build the gateway with the backends named by `gateway.discovery_modes`.
    pub fn from_config(config: &ProxyConfig, gossip: Option<&Arc<GossipMembership>>) -> Result<Self, Error> {
        let backends = backends_from_config(config, gossip)?;
        Ok(Self::new(config, backends))
    }

    /// Swap the backend list. Cached providers from kinds no longer listed
    /// are rebuilt on their next use.
    pub fn reconfigure(&self, backends: Vec<Arc<dyn DiscoveryBackend>>) {
        let kinds: Vec<&'static str> = backends.iter().map(|b| b.kind().as_str()).collect();
        self.backends.store(Arc::new(backends));
        tracing::info!(backends = ?kinds, "Gateway discovery backends reconfigured");
    }

    pub fn backend_kinds(&self) -> Vec<DiscoveryKind> {
        self.backends.load().iter().map(|b| b.kind()).collect()
    }

    pub fn cache(&self) -> &ProviderCache {
        &self.cache
    }

    /// `{root}/:service/*path`
    pub fn route_pattern(&self) -> String {
        format!("{}/:{SERVICE_PARAM}/*{PATH_PARAM}", self.root)
    }

    /// Register the proxy route on `router` for every proxied method.
    pub fn register(self: &Arc<Self>, router: &mut Router) -> Result<(), RouteError> {
        let pattern = self.route_pattern();
        for method in PROXY_METHODS {
            let gateway = Arc::clone(self);
            let handler = route_fn(move |req, params| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.handle(req, params).await }
            });
            router.handle(method.as_str(), &pattern, handler, ROUTE_NAME)?;
        }
        tracing::info!(pattern = %pattern, "Gateway route registered");
        Ok(())
    }

    /// Proxy one request matched by the gateway route.
    pub async fn handle(&self, req: Request<Body>, params: Params) -> HandlerResult {
        if proxy::is_websocket(req.headers()) {
            return Err(Error::UnsupportedProtocol("websocket"));
        }
        if proxy::is_event_stream(req.headers()) {
            return Err(Error::UnsupportedProtocol("server-sent events"));
        }

        let service = params.by_name(SERVICE_PARAM).to_string();
        let path = format!("/{}", params.by_name(PATH_PARAM));
        drop(params);

        let provider = self.provider(&service).await?;
        let instance = provider.select_instance()?;
        let target = ProxyTarget::from_instance(&service, &instance)?;

        let result = proxy::forward(&self.client, req, &target, &path, self.forward_timeout).await;
        if let Err(e) = &result {
            record_upstream_error(&service);
            tracing::warn!(service = %service, target = %target, error = %e, "Forwarding failed");
        }
        result
    }

    /// Cached provider for `service`, or a freshly built one from the first
    /// backend that knows it.
    pub async fn provider(&self, service: &str) -> Result<Arc<dyn ServiceProvider>, Error> {
        // Dot segments would rewrite discovery request paths.
        if matches!(service, "." | "..") {
            return Err(Error::ServiceNotFound(service.to_string()));
        }

        let backends = self.backends.load_full();
        let configured = |p: &Arc<dyn ServiceProvider>| backends.iter().any(|b| b.kind() == p.kind());

        if let Some(cached) = self.cache.get(service) {
            if configured(&cached) {
                record_cache_event(CacheEvent::Hit);
                return Ok(cached);
            }
            tracing::info!(
                service = %service,
                kind = %cached.kind(),
                "Cached provider's backend is no longer configured, rebuilding"
            );
            self.cache.remove(service);
            record_cache_event(CacheEvent::Rebuild);
        } else {
            record_cache_event(CacheEvent::Miss);
        }

        for backend in backends.iter() {
            match backend.lookup(service).await {
                Ok(true) => {
                    let built = backend.provider(service).await?;
                    return Ok(self.cache.insert_or_reuse(service, built, &configured));
                }
                Ok(false) => {
                    tracing::debug!(service = %service, backend = %backend.kind(), "Service not known to backend");
                }
                Err(e) => {
                    tracing::warn!(service = %service, backend = %backend.kind(), error = %e, "Discovery lookup failed, trying next backend");
                }
            }
        }

        Err(Error::ServiceNotFound(service.to_string()))
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("root", &self.root)
            .field("backends", &self.backend_kinds())
            .field("cache", &self.cache)
            .field("forward_timeout", &self.forward_timeout)
            .finish()
    }
}

/// Backends for `config`, in the priority order of `gateway.discovery_modes`.
pub fn backends_from_config(
    config: &ProxyConfig,
    gossip: Option<&Arc<GossipMembership>>,
) -> Result<Vec<Arc<dyn DiscoveryBackend>>, Error> {
    let modes = parse_modes(&config.gateway.discovery_modes)?;
    build_backends(&config.discovery, &modes, gossip)
}
