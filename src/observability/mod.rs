//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, text or JSON)
//!     → metrics.rs (counters, histograms; Prometheus exporter)
//!
//! Per request:
//!     tower-http request id → access_log middleware span → events carry request_id
//! ```
//!
//! # Design Decisions
//! - Structured fields everywhere, no string-formatted log payloads
//! - Metric updates are no-ops until a recorder is installed, so tests need no setup

pub mod logging;
pub mod metrics;
