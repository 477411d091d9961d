//! Middleware chain.
//!
//! A middleware turns a [`Handler`] into another [`Handler`]. The chain applies
//! them innermost-out: the LAST appended middleware ends up OUTERMOST.
//!
//! ```text
//! chain [M1, M2] around H:
//!     M2 pre → M1 pre → H → M1 post → M2 post
//! ```
//!
//! The server appends [`recovery::recovery`] after every other middleware, so
//! it encloses everything, including the 404/405 replies produced by the router.

use std::sync::Arc;

use crate::http::handler::Handler;

pub mod access_log;
pub mod metrics;
pub mod recovery;

/// A handler-wrapping function.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Wrap a closure as a [`Middleware`].
pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ordered list of middlewares.
#[derive(Clone, Default)]
pub struct Chain {
    middlewares: Vec<Middleware>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware; it will wrap every middleware appended before it.
    pub fn append(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn push(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Compose the chain around `handler`.
    pub fn then(&self, handler: Handler) -> Handler {
        self.middlewares
            .iter()
            .fold(handler, |inner, middleware| middleware(inner))
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}
