//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Discovery watch loop:
//!     → request fails (network, non-2xx, decode)
//!     → backoff.rs (exponential delay with jitter, capped)
//!     → retry; a successful poll resets the backoff
//! ```
//!
//! # Design Decisions
//! - Every external discovery call has a deadline (client timeout)
//! - Jitter spreads retries from many providers watching the same agent

pub mod backoff;

pub use backoff::Backoff;
