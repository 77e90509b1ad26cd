//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request (path)
//!     → table.rs (strip URL prefix, recursive descent over the route tree)
//!     → pattern.rs (anchored regex match, captured groups)
//!     → dispatch.rs (preconditions, handler, 404/500 conversion)
//!     → Reply
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → registry.rs (resolve view and precondition names)
//!     → Compile patterns and parse their segments
//!     → Freeze as an immutable RouteTable generation
//! ```
//!
//! # Design Decisions
//! - Routes compiled up front, immutable at runtime
//! - Deterministic: same path always matches the same route
//! - First match wins, in declaration order
//! - Reverse URLs come from parsed pattern segments, not regex text rewriting

pub mod dispatch;
pub mod pattern;
pub mod registry;
pub mod route;
pub mod table;

pub use dispatch::{DisconnectHook, Dispatcher};
pub use pattern::{RoutePattern, Segment};
pub use registry::HandlerRegistry;
pub use route::{BranchRoute, Gate, Handler, HandlerError, HandlerResult, LeafRoute, Precondition, Route};
pub use table::{NotFound, RouteMatch, RouteTable, INTERNAL_MARKER};

/// Errors raised while building a route table or reversing a route name.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no view registered as {0:?}")]
    UnknownView(String),

    #[error("no precondition registered as {0:?}")]
    UnknownPrecondition(String),

    #[error("route {0:?} has neither a view nor sub-routes")]
    MissingView(String),

    #[error("route {0:?} has both a view and sub-routes")]
    Conflicting(String),

    #[error("no route named {0:?}")]
    ViewNotFound(String),
}
