//! The seam between the server loop and an upstream proxy.

use std::future::Future;

use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect {channel} channel to {address}: {source}")]
    Connect {
        channel: &'static str,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {channel} channel: {source}")]
    Io {
        channel: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} channel is closed")]
    Closed(&'static str),

    #[error("transport has no control channel")]
    NoControl,
}

/// One proxy connection: inbound frames, outbound replies, and a control channel.
///
/// `recv` must be cancel-safe; the server loop races it against other
/// transports, its poll timeout and shutdown.
pub trait Transport: Send {
    fn name(&self) -> &str;

    /// Next raw frame. `None` once the inbound channel is closed.
    fn recv(&mut self) -> impl Future<Output = Option<Bytes>> + Send;

    /// Push one reply frame.
    fn send(&mut self, frame: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// One request/reply exchange on the control channel.
    fn control(&mut self, request: Bytes) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}
