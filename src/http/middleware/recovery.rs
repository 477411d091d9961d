//! Panic and error recovery.
//!
//! # Responsibilities
//! - Catch panics raised while building or polling the inner handler future
//! - Convert `Err(Error)` and panic payloads into exactly one response
//! - Log the panic and a backtrace server-side; never send them to the client
//!
//! # Classification
//! - `Error::Canceled` → 400
//! - `Error::Status { code, message }` → `code` with `message`
//! - any other `Error` → its own status
//! - anything else (`panic!("..")`, foreign payloads) → 500 with a generic message

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::FutureExt;

use crate::error::Error;
use crate::http::handler::{handler_fn, Handler};
use crate::http::middleware::{middleware_fn, Middleware};

/// Outermost middleware: every request yields a response.
pub fn recovery() -> Middleware {
    middleware_fn(|next: Handler| {
        handler_fn(move |req| {
            let next = next.clone();
            async move { Ok(recover(next, req).await) }
        })
    })
}

async fn recover(next: Handler, req: Request<Body>) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| next(req))) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
        Err(payload) => Err(payload),
    };

    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            let status = err.status();
            if status.is_server_error() {
                tracing::error!(method = %method, path = %path, status = %status, error = %err, "Request failed");
            } else {
                tracing::debug!(method = %method, path = %path, status = %status, error = %err, "Request rejected");
            }
            err.to_response()
        }
        Err(payload) => {
            let err = classify_panic(payload);
            tracing::error!(
                method = %method,
                path = %path,
                status = %err.status(),
                panic = %err,
                backtrace = %Backtrace::force_capture(),
                "Handler panicked"
            );
            err.to_response()
        }
    }
}

/// Map a panic payload onto the error taxonomy.
pub fn classify_panic(payload: Box<dyn Any + Send>) -> Error {
    match payload.downcast::<Error>() {
        Ok(err) => *err,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Error::Internal(message)
        }
    }
}
