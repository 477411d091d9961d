//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower-http layers, in-flight limit)
//!     → middleware chain (recovery → access_log → metrics → user middlewares)
//!     → routing::Router::dispatch (static/dynamic match, 404/405/OPTIONS)
//!     → route handler (application route or gateway proxy)
//!     → Send to client
//! ```

pub mod handler;
pub mod middleware;
pub mod server;

pub use handler::{handler_fn, route_fn, Handler, HandlerResult, ResponseFuture, RouteHandler};
pub use middleware::access_log::X_REQUEST_ID;
pub use middleware::{middleware_fn, Chain, Middleware};
pub use server::{BuildError, HttpServer, ServerBuilder};
