//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream proxy
//!     → tcp.rs / channel.rs (inbound channel, one frame per message)
//!     → Transport::recv (raw frame bytes)
//!     → server loop
//!     → Transport::send (reply frame) → outbound channel
//!
//! Deferred handler → outbox.rs (queued replies) → server loop → Transport::send
//!
//! connection.rs tracks the proxy's client connections seen by this process.
//! ```
//!
//! # Design Decisions
//! - Transports are pure I/O; they never parse frames
//! - Inbound reads are decoupled from the loop by a bounded queue
//! - A transport failure closes that transport only

pub mod channel;
pub mod connection;
pub mod outbox;
pub mod tcp;
pub mod transport;

pub use channel::{ChannelPeer, ChannelTransport, ControlRequest};
pub use connection::{ClientKey, ConnectionTracker};
pub use outbox::{Outbox, Outgoing};
pub use tcp::TcpTransport;
pub use transport::{Transport, TransportError};
