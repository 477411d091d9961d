//! Error taxonomy shared by the router, the gateway and the recovery middleware.
//!
//! # Design Decisions
//! - Library code returns `Result<_, Error>`; only the recovery middleware
//!   turns an `Error` (or a panic) into a response
//! - Every variant maps to exactly one status code via [`Error::status`]
//! - Internal details are logged, never written to the client

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;

/// Generic body for unclassified failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Errors surfaced while dispatching or forwarding a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request context was canceled (client went away, deadline hit).
    #[error("context canceled")]
    Canceled,

    /// Business error tagged with an explicit status code.
    #[error("{message}")]
    Status { code: StatusCode, message: String },

    #[error("404 page not found")]
    NotFound,

    #[error("405 method not allowed")]
    MethodNotAllowed,

    /// A single discovery backend failed its lookup. The gateway moves on to the next one.
    #[error("discovery backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("service {0} not found")]
    ServiceNotFound(String),

    #[error("no available instance for service {0}")]
    NoAvailableInstance(String),

    #[error("proxy error: {target}: {reason}")]
    DownstreamUnreachable { target: String, reason: String },

    #[error("{0} is not supported")]
    UnsupportedProtocol(&'static str),

    #[error("unsupported discovery backend: {0}")]
    UnsupportedBackend(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Tagged business error with an explicit status.
    pub fn status_code(code: StatusCode, message: impl Into<String>) -> Self {
        Error::Status {
            code,
            message: message.into(),
        }
    }

    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Canceled => StatusCode::BAD_REQUEST,
            Error::Status { code, .. } => *code,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::BackendUnavailable { .. }
            | Error::ServiceNotFound(_)
            | Error::NoAvailableInstance(_)
            | Error::DownstreamUnreachable { .. }
            | Error::UnsupportedProtocol(_) => StatusCode::BAD_GATEWAY,
            Error::UnsupportedBackend(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text written to the client. Internal failures get the generic message.
    pub fn public_message(&self) -> String {
        match self {
            Error::UnsupportedBackend(_) | Error::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Build the plain-text response for this error.
    pub fn to_response(&self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.public_message()));
        *response.status_mut() = self.status();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        self.to_response()
    }
}

/// Registration-time errors. These are configuration bugs, so callers
/// usually abort startup on them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route method must not be empty")]
    EmptyMethod,

    #[error("path must begin with '/' in path '{0}'")]
    InvalidPath(String),

    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("invalid group prefix '{0}': must be non-empty, start with '/' and not end with '/'")]
    InvalidPrefix(String),

    #[error("duplicate route {method} {path}")]
    Duplicate { method: String, path: String },
}
