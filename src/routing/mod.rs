//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (before serving):
//!     Router::handle / Group::handle
//!     → static pattern: exact-match table keyed "METHOD:path"
//!     → dynamic pattern: pattern.rs compiles segments, appended per method
//!
//! Incoming Request (method, path)
//!     → router.rs (static lookup, then dynamic probe in registration order)
//!     → params.rs (pooled ParamSet filled from named segments)
//!     → Found / MethodNotAllowed (Allow) / Options (Allow) / NotFound
//! ```
//!
//! # Design Decisions
//! - Routes are registered before the router is frozen behind an `Arc`
//! - No regex in hot path (segment comparison only)
//! - Deterministic: same input always matches same route
//! - First registered dynamic route wins

pub mod group;
pub mod params;
pub mod pattern;
pub mod router;

pub use group::Group;
pub use params::{Param, Params};
pub use router::{AllowedMethods, Lookup, MatchedRoute, Router};
