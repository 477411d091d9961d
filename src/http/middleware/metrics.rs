//! Request metrics middleware.

use std::time::Instant;

use crate::http::handler::{handler_fn, Handler};
use crate::http::middleware::{middleware_fn, Middleware};
use crate::observability::metrics;
use crate::routing::MatchedRoute;

pub fn request_metrics() -> Middleware {
    middleware_fn(|next: Handler| {
        handler_fn(move |req| {
            let next = next.clone();
            let method = req.method().to_string();
            async move {
                let start = Instant::now();
                let result = next(req).await;
                let (status, route) = match &result {
                    Ok(response) => (
                        response.status().as_u16(),
                        response
                            .extensions()
                            .get::<MatchedRoute>()
                            .map(|r| r.0.clone())
                            .unwrap_or_else(|| "none".to_string()),
                    ),
                    Err(err) => (err.status().as_u16(), "none".to_string()),
                };
                metrics::record_request(&method, status, &route, start);
                result
            }
        })
    })
}
