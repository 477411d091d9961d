//! Per-request span and access log line.

use std::time::Instant;

use tracing::Instrument;

use crate::http::handler::{handler_fn, Handler};
use crate::http::middleware::{middleware_fn, Middleware};
use crate::routing::MatchedRoute;

/// Header carrying the request id set by the tower-http request-id layer.
pub const X_REQUEST_ID: &str = "x-request-id";

pub fn access_log() -> Middleware {
    middleware_fn(|next: Handler| {
        handler_fn(move |req| {
            let next = next.clone();
            let request_id = req
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let method = req.method().clone();
            let path = req.uri().path().to_owned();
            let span = tracing::info_span!("request", request_id = %request_id, method = %method, path = %path);

            async move {
                let start = Instant::now();
                let result = next(req).await;
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                match &result {
                    Ok(response) => {
                        let route = response
                            .extensions()
                            .get::<MatchedRoute>()
                            .map(|r| r.0.as_str())
                            .unwrap_or("-");
                        tracing::info!(status = response.status().as_u16(), route = %route, elapsed_ms, "Request completed");
                    }
                    Err(err) => {
                        tracing::info!(status = err.status().as_u16(), error = %err, elapsed_ms, "Request completed with error");
                    }
                }
                result
            }
            .instrument(span)
        })
    })
}
