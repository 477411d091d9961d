//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store registered routes (static exact-match table, per-method dynamic lists)
//! - Look up the handler for `(method, path)` and extract params
//! - Produce 404 / 405 (+ `Allow`) / OPTIONS replies for non-matches
//!
//! # Design Decisions
//! - Registration needs `&mut Router`; once wrapped in `Arc` the table is frozen,
//!   so registration can never race dispatch
//! - Static lookup is O(1) via a `METHOD:path` key
//! - Dynamic lookup is a linear probe in registration order: first match wins,
//!   the most specific pattern is NOT preferred
//! - Explicit `Lookup` outcome rather than a silent default

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, Response};

use crate::config::RouterConfig;
use crate::error::{Error, RouteError};
use crate::http::handler::{handler_fn, Handler, HandlerResult, RouteHandler};
use crate::routing::group::Group;
use crate::routing::params::{ParamPool, Params};
use crate::routing::pattern::PathPattern;

/// Name of the route that served a request.
///
/// Inserted into the request extensions before the handler runs and into the
/// response extensions after it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute(pub String);

/// `Allow` value computed for a 405 or OPTIONS reply, available to custom handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedMethods(pub String);

#[derive(Clone)]
struct Route {
    handler: RouteHandler,
    name: String,
}

struct DynamicRoute {
    pattern: PathPattern,
    route: Route,
}

/// Outcome of a route lookup.
pub enum Lookup {
    Found {
        handler: RouteHandler,
        params: Params,
        name: String,
    },
    /// No handler for the method but other methods match; carries the `Allow` value.
    MethodNotAllowed(String),
    /// OPTIONS request answered automatically; carries the `Allow` value.
    Options(String),
    NotFound,
}

impl std::fmt::Debug for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Found { name, params, .. } => f
                .debug_struct("Found")
                .field("name", name)
                .field("params", params)
                .finish(),
            Lookup::MethodNotAllowed(allow) => f.debug_tuple("MethodNotAllowed").field(allow).finish(),
            Lookup::Options(allow) => f.debug_tuple("Options").field(allow).finish(),
            Lookup::NotFound => f.write_str("NotFound"),
        }
    }
}

/// HTTP router.
pub struct Router {
    static_routes: HashMap<String, Route>,
    dynamic_routes: HashMap<String, Vec<DynamicRoute>>,
    methods: BTreeSet<String>,
    param_pool: Arc<ParamPool>,
    max_params: usize,
    handle_method_not_allowed: bool,
    handle_options: bool,
    not_found: Handler,
    method_not_allowed: Handler,
    global_options: Handler,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(&RouterConfig::default())
    }
}

impl Router {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            static_routes: HashMap::new(),
            dynamic_routes: HashMap::new(),
            methods: BTreeSet::new(),
            param_pool: ParamPool::new(),
            max_params: 0,
            handle_method_not_allowed: config.handle_method_not_allowed,
            handle_options: config.handle_options,
            not_found: handler_fn(|_req| async { Ok(Error::NotFound.to_response()) }),
            method_not_allowed: handler_fn(|_req| async { Ok(Error::MethodNotAllowed.to_response()) }),
            global_options: handler_fn(|_req| async { Ok(Response::new(Body::empty())) }),
        }
    }

    /// Register `handler` for `method` and `pattern`.
    ///
    /// An empty `name` defaults to the pattern.
    pub fn handle(
        &mut self,
        method: &str,
        pattern: &str,
        handler: RouteHandler,
        name: &str,
    ) -> Result<&mut Self, RouteError> {
        if method.is_empty() {
            return Err(RouteError::EmptyMethod);
        }
        if !pattern.starts_with('/') {
            return Err(RouteError::InvalidPath(pattern.to_string()));
        }

        let route = Route {
            handler,
            name: if name.is_empty() { pattern.to_string() } else { name.to_string() },
        };

        if PathPattern::is_dynamic(pattern) {
            let compiled = PathPattern::compile(pattern)?;
            self.max_params = self.max_params.max(compiled.param_count());
            self.dynamic_routes
                .entry(method.to_string())
                .or_default()
                .push(DynamicRoute {
                    pattern: compiled,
                    route,
                });
        } else {
            let key = static_key(method, pattern);
            if self.static_routes.contains_key(&key) {
                return Err(RouteError::Duplicate {
                    method: method.to_string(),
                    path: pattern.to_string(),
                });
            }
            self.static_routes.insert(key, route);
        }

        self.methods.insert(method.to_string());
        tracing::debug!(method = %method, pattern = %pattern, "Route registered");
        Ok(self)
    }

    /// Alias of [`Router::handle`] kept for callers that register by name.
    pub fn add_route(
        &mut self,
        method: &str,
        pattern: &str,
        handler: RouteHandler,
        name: &str,
    ) -> Result<&mut Self, RouteError> {
        self.handle(method, pattern, handler, name)
    }

    /// Scoped registrar that prefixes every pattern with `prefix`.
    pub fn group(&mut self, prefix: &str) -> Result<Group<'_>, RouteError> {
        Group::new(self, prefix)
    }

    pub fn set_not_found(&mut self, handler: Handler) -> &mut Self {
        self.not_found = handler;
        self
    }

    pub fn set_method_not_allowed(&mut self, handler: Handler) -> &mut Self {
        self.method_not_allowed = handler;
        self
    }

    pub fn set_global_options(&mut self, handler: Handler) -> &mut Self {
        self.global_options = handler;
        self
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.static_routes.len() + self.dynamic_routes.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `(method, path)` to a handler or a non-match outcome.
    pub fn lookup(&self, method: &str, path: &str) -> Lookup {
        if let Some((handler, params, name)) = self.find(method, path) {
            return Lookup::Found {
                handler,
                params,
                name,
            };
        }

        if method == Method::OPTIONS.as_str() && self.handle_options {
            if let Some(allow) = self.allowed(path, method) {
                return Lookup::Options(allow);
            }
        } else if self.handle_method_not_allowed {
            if let Some(allow) = self.allowed(path, method) {
                return Lookup::MethodNotAllowed(allow);
            }
        }

        Lookup::NotFound
    }

    fn find(&self, method: &str, path: &str) -> Option<(RouteHandler, Params, String)> {
        if let Some(route) = self.static_routes.get(&static_key(method, path)) {
            return Some((route.handler.clone(), Params::empty(), route.name.clone()));
        }

        let candidates = self.dynamic_routes.get(method)?;
        let mut params = self.param_pool.acquire(self.max_params);
        for candidate in candidates {
            if candidate.pattern.capture(path, &mut params) {
                return Some((candidate.route.handler.clone(), params, candidate.route.name.clone()));
            }
        }
        None
    }

    fn has_route(&self, method: &str, path: &str) -> bool {
        self.static_routes.contains_key(&static_key(method, path))
            || self
                .dynamic_routes
                .get(method)
                .is_some_and(|routes| routes.iter().any(|r| r.pattern.matches(path)))
    }

    /// `Allow` value for `path`: matching methods sorted, `OPTIONS` appended.
    /// `None` when no method other than `request_method` matches.
    fn allowed(&self, path: &str, request_method: &str) -> Option<String> {
        let mut allowed: Vec<&str> = self
            .methods
            .iter()
            .map(String::as_str)
            .filter(|m| *m != request_method && self.has_route(m, path))
            .collect();

        if allowed.is_empty() {
            return None;
        }
        if !allowed.contains(&Method::OPTIONS.as_str()) {
            allowed.push(Method::OPTIONS.as_str());
        }
        Some(allowed.join(", "))
    }

    /// Dispatch one request.
    pub async fn dispatch(&self, mut req: Request<Body>) -> HandlerResult {
        let method = req.method().as_str().to_owned();
        let path = req.uri().path().to_owned();

        match self.lookup(&method, &path) {
            Lookup::Found {
                handler,
                params,
                name,
            } => {
                req.extensions_mut().insert(MatchedRoute(name.clone()));
                let mut response = handler(req, params).await?;
                response.extensions_mut().insert(MatchedRoute(name));
                Ok(response)
            }
            Lookup::MethodNotAllowed(allow) => {
                tracing::debug!(method = %method, path = %path, allow = %allow, "Method not allowed");
                with_allow(&self.method_not_allowed, req, allow).await
            }
            Lookup::Options(allow) => with_allow(&self.global_options, req, allow).await,
            Lookup::NotFound => {
                tracing::debug!(method = %method, path = %path, "No route matched");
                (self.not_found)(req).await
            }
        }
    }

    /// Freeze the router into a [`Handler`] suitable for a middleware chain.
    pub fn into_handler(self: Arc<Self>) -> Handler {
        handler_fn(move |req| {
            let router = self.clone();
            async move { router.dispatch(req).await }
        })
    }
}

async fn with_allow(handler: &Handler, mut req: Request<Body>, allow: String) -> HandlerResult {
    req.extensions_mut().insert(AllowedMethods(allow.clone()));
    let mut response = handler(req).await?;
    let value = HeaderValue::from_str(&allow)
        .map_err(|e| Error::Internal(format!("invalid Allow header: {e}")))?;
    response.headers_mut().insert(header::ALLOW, value);
    Ok(response)
}

fn static_key(method: &str, path: &str) -> String {
    let mut key = String::with_capacity(method.len() + 1 + path.len());
    key.push_str(method);
    key.push(':');
    key.push_str(path);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::route_fn;
    use axum::http::StatusCode;

    fn named(body: &'static str) -> RouteHandler {
        route_fn(move |_req, params: Params| async move {
            let mut text = body.to_string();
            for p in params.iter() {
                text.push_str(&format!(" {}={}", p.key, p.value));
            }
            Ok(Response::new(Body::from(text)))
        })
    }

    async fn body_of(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request(method: &str, path: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_static_route_has_empty_params() {
        let mut router = Router::default();
        router.handle("GET", "/health", named("ok"), "health").unwrap();

        match router.lookup("GET", "/health") {
            Lookup::Found { params, name, .. } => {
                assert!(params.is_empty());
                assert_eq!(name, "health");
            }
            other => panic!("unexpected lookup {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_route_extracts_params() {
        let mut router = Router::default();
        router.handle("GET", "/users/:id/orders/:order", named("order"), "").unwrap();

        match router.lookup("GET", "/users/7/orders/99") {
            Lookup::Found { params, name, .. } => {
                assert_eq!(params.by_name("id"), "7");
                assert_eq!(params.by_name("order"), "99");
                assert_eq!(name, "/users/:id/orders/:order");
            }
            other => panic!("unexpected lookup {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_static_wins_over_dynamic() {
        let mut router = Router::default();
        router.handle("GET", "/users/:id", named("dynamic"), "").unwrap();
        router.handle("GET", "/users/me", named("static"), "").unwrap();

        let response = router.dispatch(request("GET", "/users/me")).await.unwrap();
        assert_eq!(body_of(response).await, "static");
    }

    #[tokio::test]
    async fn test_first_registered_dynamic_route_wins() {
        let mut router = Router::default();
        router.handle("GET", "/assets/*rest", named("catch-all"), "").unwrap();
        router.handle("GET", "/assets/:file", named("single"), "").unwrap();

        let response = router.dispatch(request("GET", "/assets/app.js")).await.unwrap();
        assert_eq!(body_of(response).await, "catch-all rest=app.js");
    }

    #[tokio::test]
    async fn test_method_not_allowed_lists_methods() {
        let mut router = Router::default();
        router.handle("POST", "/items/:id", named("post"), "").unwrap();
        router.handle("GET", "/items/:id", named("get"), "").unwrap();

        let response = router.dispatch(request("DELETE", "/items/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, POST, OPTIONS");
    }

    #[tokio::test]
    async fn test_not_found() {
        let mut router = Router::default();
        router.handle("GET", "/a", named("a"), "").unwrap();

        let response = router.dispatch(request("GET", "/b")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_method_not_allowed_disabled_yields_404() {
        let config = RouterConfig {
            handle_method_not_allowed: false,
            ..RouterConfig::default()
        };
        let mut router = Router::new(&config);
        router.handle("GET", "/a", named("a"), "").unwrap();

        let response = router.dispatch(request("PUT", "/a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_options_auto_reply() {
        let mut router = Router::default();
        router.handle("GET", "/a", named("a"), "").unwrap();
        router.handle("PUT", "/a", named("a"), "").unwrap();

        let response = router.dispatch(request("OPTIONS", "/a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ALLOW], "GET, PUT, OPTIONS");

        let response = router.dispatch(request("OPTIONS", "/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_explicit_options_handler_wins() {
        let mut router = Router::default();
        router.handle("GET", "/a", named("get"), "").unwrap();
        router.handle("OPTIONS", "/a", named("custom options"), "").unwrap();

        let response = router.dispatch(request("OPTIONS", "/a")).await.unwrap();
        assert!(response.headers().get(header::ALLOW).is_none());
        assert_eq!(body_of(response).await, "custom options");
    }

    #[test]
    fn test_registration_errors() {
        let mut router = Router::default();
        assert_eq!(
            router.handle("", "/a", named("a"), "").err(),
            Some(RouteError::EmptyMethod)
        );
        assert!(matches!(
            router.handle("GET", "a", named("a"), ""),
            Err(RouteError::InvalidPath(_))
        ));
        router.handle("GET", "/a", named("a"), "").unwrap();
        assert!(matches!(
            router.handle("GET", "/a", named("a"), ""),
            Err(RouteError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn test_matched_route_on_response() {
        let mut router = Router::default();
        router.handle("GET", "/users/:id", named("u"), "user").unwrap();

        let response = router.dispatch(request("GET", "/users/1")).await.unwrap();
        assert_eq!(
            response.extensions().get::<MatchedRoute>(),
            Some(&MatchedRoute("user".into()))
        );
    }
}
