//! Handler types shared by the router, the middleware chain and the gateway.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;

use crate::error::Error;
use crate::routing::params::Params;

/// Result of running a handler.
pub type HandlerResult = Result<Response<Body>, Error>;

/// Boxed future returned by every handler.
pub type ResponseFuture = BoxFuture<'static, HandlerResult>;

/// A request handler. Middlewares wrap values of this type.
pub type Handler = Arc<dyn Fn(Request<Body>) -> ResponseFuture + Send + Sync>;

/// A handler bound to a route; receives the parameters extracted from the path.
pub type RouteHandler = Arc<dyn Fn(Request<Body>, Params) -> ResponseFuture + Send + Sync>;

/// Wrap an async function as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |req: Request<Body>| -> ResponseFuture { Box::pin(f(req)) })
}

/// Wrap an async function as a [`RouteHandler`].
pub fn route_fn<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(Request<Body>, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |req: Request<Body>, params: Params| -> ResponseFuture {
        Box::pin(f(req, params))
    })
}
