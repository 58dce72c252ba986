//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path)
//!     → router.rs (candidates by method + root segment, registration order)
//!     → matcher.rs (exact or capture, segment by segment)
//!     → Return: RouteMatch { route, vars } or NoMatch
//!
//! Route registration (plugin load/unload):
//!     Route::new(method, "/root/seg/(capture)", handler)
//!     → RouteTableBuilder (owned by the plugin registry)
//!     → build() → immutable RouteTable, swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Segment count must match exactly: no prefix routes, no wildcards
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod router;

use thiserror::Error;

pub use matcher::SegmentMatcher;
pub use router::{NoMatch, Route, RouteMatch, RouteTable, RouteTableBuilder};

/// Errors raised while building a route.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route pattern is empty")]
    EmptyPattern,

    #[error("route {0} starts with a capture; the root segment must be literal")]
    CaptureRoot(String),

    #[error("invalid capture segment {segment}: {reason}")]
    InvalidPattern { segment: String, reason: String },
}
