//! Server subsystem.
//!
//! # Data Flow
//! ```text
//! Transport::recv (any of N, bounded wait)
//!     → Message::parse (framing errors: counted, logged, frame dropped)
//!     → disconnect? → Dispatcher::disconnect, no reply
//!     → Request::from_message → Dispatcher::dispatch (inside a request span)
//!     → reply frame → Transport::send (skipped for Reply::Deferred)
//!     → after-answer work → request released
//!
//! Outbox delivery queued → reply frames (128 ids each) → Transport::send
//! Poll timeout since last housekeeping → idle client pruning
//! Route update received → new RouteTable generation, swapped between frames
//! ```
//!
//! # Design Decisions
//! - Single task, one request at a time; scale out by running more processes
//! - Per-request state lives in the Request and dies with it
//! - Shutdown is only observed between requests

pub mod event_loop;

pub use event_loop::Server;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("no transports configured")]
    NoTransports,
}
