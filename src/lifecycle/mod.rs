//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → loop finishes the current request → transports closed → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger route reload
//! ```
//!
//! # Design Decisions
//! - Shutdown is a broadcast; every long-running task subscribes
//! - A request in progress always runs to completion

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, SignalEvent};
