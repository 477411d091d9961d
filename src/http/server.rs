//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Assemble the router, the gateway route and the middleware chain
//! - Wire up tower-http layers (request id, tracing, timeout, body limit)
//! - Bound in-flight requests to `listener.max_connections`
//! - Serve with graceful shutdown
//! - Apply hot-reloaded discovery settings to the gateway

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    routing::any,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::discovery::GossipMembership;
use crate::error::{Error, RouteError};
use crate::gateway::{backends_from_config, Gateway};
use crate::http::handler::Handler;
use crate::http::middleware::access_log::access_log;
use crate::http::middleware::metrics::request_metrics;
use crate::http::middleware::recovery::recovery;
use crate::http::middleware::{Chain, Middleware};
use crate::routing::Router;

/// Failure while assembling the server.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Discovery(#[from] Error),
}

/// Application state injected into the dispatch handler.
#[derive(Clone)]
struct AppState {
    handler: Handler,
    in_flight: Arc<Semaphore>,
}

/// Collects routes, middlewares and the gossip feed before the server is frozen.
pub struct ServerBuilder {
    config: ProxyConfig,
    router: Router,
    chain: Chain,
    gossip: Option<Arc<GossipMembership>>,
}

impl ServerBuilder {
    pub fn new(config: ProxyConfig) -> Self {
        let router = Router::new(&config.router);
        Self {
            config,
            router,
            chain: Chain::new(),
            gossip: None,
        }
    }

    /// Router for application routes. The gateway route is added at build time.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Append an application middleware. Built-in middlewares wrap all of them.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Membership table backing the `gossip` discovery mode.
    pub fn gossip(mut self, membership: Arc<GossipMembership>) -> Self {
        self.gossip = Some(membership);
        self
    }

    pub fn build(self) -> Result<HttpServer, BuildError> {
        let Self {
            config,
            mut router,
            chain,
            gossip,
        } = self;

        let gateway = if config.gateway.enabled {
            let gateway = Arc::new(Gateway::from_config(&config, gossip.as_ref())?);
            gateway.register(&mut router)?;
            Some(gateway)
        } else {
            None
        };

        // Recovery goes last so it is the outermost wrapper.
        let chain = chain
            .append(request_metrics())
            .append(access_log())
            .append(recovery());
        let handler = chain.then(Arc::new(router).into_handler());

        let state = AppState {
            handler,
            in_flight: Arc::new(Semaphore::new(config.listener.max_connections)),
        };
        let app = build_app(&config, state);

        Ok(HttpServer {
            app,
            config,
            gateway,
            gossip,
        })
    }
}

/// HTTP server for the router and gateway.
pub struct HttpServer {
    app: axum::Router,
    config: ProxyConfig,
    gateway: Option<Arc<Gateway>>,
    gossip: Option<Arc<GossipMembership>>,
}

impl HttpServer {
    pub fn builder(config: ProxyConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// The assembled axum application, for in-process use.
    pub fn app(&self) -> axum::Router {
        self.app.clone()
    }

    pub fn gateway(&self) -> Option<&Arc<Gateway>> {
        self.gateway.as_ref()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, applying configuration
    /// reloads from `config_updates` meanwhile.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            gateway = self.gateway.is_some(),
            "HTTP server starting"
        );

        let gateway = self.gateway.clone();
        let gossip = self.gossip.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match &gateway {
                    Some(gateway) => {
                        if let Err(e) = reload(gateway, &config, gossip.as_ref()) {
                            tracing::error!(error = %e, "Config reload rejected, keeping current discovery backends");
                        }
                    }
                    None => tracing::info!("Config reloaded; gateway disabled, nothing to apply"),
                }
            }
        });

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Rebuild the discovery backends from `config` and swap them into `gateway`.
///
/// Router, listener and gateway root changes need a restart.
pub fn reload(
    gateway: &Gateway,
    config: &ProxyConfig,
    gossip: Option<&Arc<GossipMembership>>,
) -> Result<(), Error> {
    let backends = backends_from_config(config, gossip)?;
    gateway.reconfigure(backends);
    Ok(())
}

/// Build the Axum app with all tower layers.
#[allow(deprecated)]
fn build_app(config: &ProxyConfig, state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/{*path}", any(dispatch))
        .route("/", any(dispatch))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let Ok(_permit) = state.in_flight.acquire().await else {
        return Error::Internal("request limiter closed".to_string()).to_response();
    };

    match (state.handler)(request).await {
        Ok(response) => response,
        Err(err) => err.to_response(),
    }
}
