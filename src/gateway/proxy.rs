//! Request rewriting and forwarding to a selected instance.
//!
//! # Responsibilities
//! - Refuse protocols the forwarder cannot carry (WebSocket upgrades, SSE)
//! - Rewrite scheme, authority, path and query toward the target
//! - Force `Host` to the target and drop hop-by-hop headers
//! - Map downstream failures to `DownstreamUnreachable` / `Canceled`

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, Uri, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::discovery::ServiceInstance;
use crate::error::Error;
use crate::http::handler::HandlerResult;

/// Downstream HTTP client.
pub type HttpClient = Client<HttpConnector, Body>;

const SCHEME_META: &str = "scheme";
const CONTEXT_PATH_META: &str = "context_path";

/// Headers meaningful only for a single transport hop.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

pub fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Where a single request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Service name.
    pub name: String,
    pub url: Url,
}

impl ProxyTarget {
    /// Target for `instance`, honoring its `scheme` and `context_path` metadata.
    pub fn from_instance(service: &str, instance: &ServiceInstance) -> Result<Self, Error> {
        let scheme = instance
            .metadata
            .get(SCHEME_META)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("http");
        let context_path = instance
            .metadata
            .get(CONTEXT_PATH_META)
            .map(|p| p.trim_matches('/'))
            .unwrap_or("");

        let raw = if context_path.is_empty() {
            format!("{scheme}://{}", instance.address())
        } else {
            format!("{scheme}://{}/{context_path}", instance.address())
        };
        let url = Url::parse(&raw).map_err(|e| Error::Internal(format!("invalid target url {raw}: {e}")))?;

        Ok(Self {
            name: service.to_string(),
            url,
        })
    }

    /// `host[:port]`, with the port omitted when it is the scheme default.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str().trim_end_matches('/'))
    }
}

pub fn is_websocket(headers: &HeaderMap) -> bool {
    headers.contains_key(header::UPGRADE)
        || headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/event-stream"))
}

/// Join two path pieces with exactly one slash between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

/// Target query first, then the original, joined with `&` only when both are present.
pub fn merge_query(target: &str, original: &str) -> String {
    match (target.is_empty(), original.is_empty()) {
        (true, _) => original.to_string(),
        (_, true) => target.to_string(),
        _ => format!("{target}&{original}"),
    }
}

/// Remove hop-by-hop headers, including those named by `Connection`.
pub fn strip_hop_headers(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Point `parts` at `target`. `path` is the request path with the gateway
/// root and service segment already stripped.
pub fn rewrite(parts: &mut Parts, target: &ProxyTarget, path: &str) -> Result<(), Error> {
    let authority = target.authority();
    let path = single_joining_slash(target.url.path(), path);
    let query = merge_query(target.url.query().unwrap_or(""), parts.uri.query().unwrap_or(""));
    let path_and_query = if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    };

    parts.uri = Uri::builder()
        .scheme(target.url.scheme())
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| Error::Internal(format!("rewrite toward {target}: {e}")))?;
    parts.version = Version::HTTP_11;

    strip_hop_headers(&mut parts.headers);
    let host = HeaderValue::from_str(&authority)
        .map_err(|e| Error::Internal(format!("invalid host {authority}: {e}")))?;
    parts.headers.insert(header::HOST, host);
    Ok(())
}

/// Forward `req` to `target` and stream the response back.
pub async fn forward(
    client: &HttpClient,
    req: Request<Body>,
    target: &ProxyTarget,
    path: &str,
    timeout: Duration,
) -> HandlerResult {
    let (mut parts, body) = req.into_parts();
    rewrite(&mut parts, target, path)?;
    tracing::debug!(service = %target.name, uri = %parts.uri, "Forwarding request");

    let response = match tokio::time::timeout(timeout, client.request(Request::from_parts(parts, body))).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(classify(target, &e)),
        Err(_) => {
            return Err(Error::DownstreamUnreachable {
                target: target.to_string(),
                reason: format!("no response within {}s", timeout.as_secs()),
            })
        }
    };

    let (mut parts, body) = response.into_parts();
    strip_hop_headers(&mut parts.headers);
    Ok(Response::from_parts(parts, Body::new(body)))
}

fn classify(target: &ProxyTarget, err: &(dyn StdError + 'static)) -> Error {
    let mut source = Some(err);
    let mut reasons = Vec::new();
    while let Some(e) = source {
        if e.downcast_ref::<hyper::Error>().is_some_and(hyper::Error::is_canceled) {
            return Error::Canceled;
        }
        reasons.push(e.to_string());
        source = e.source();
    }

    Error::DownstreamUnreachable {
        target: target.to_string(),
        reason: reasons.join(": "),
    }
}
