//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! raw frame (Bytes, from the inbound channel)
//!     → message.rs (split tokens, decode header netstring)
//!     → Message { sender, conn_id, path, headers, body }
//!
//! Response payload
//!     → reply.rs (SENDER SP NETSTRING(ids) SP PAYLOAD, chunked by 128 ids)
//!     → outbound channel
//! ```
//!
//! # Design Decisions
//! - Frames are `Bytes`; the body handle is a zero-copy slice of the frame
//! - The body is never read during parsing unless it is a small JSON control body
//! - Every malformed frame is a typed `FramingError`, never a panic

pub mod message;
pub mod netstring;
pub mod reply;

pub use message::{Body, BodyHandle, Headers, Message};
pub use netstring::{format_netstring, parse_netstring};
pub use reply::{ReplyFrame, MAX_IDS_PER_FRAME};

/// Errors produced while decoding a wire frame.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("frame is missing the {0} token")]
    MissingToken(&'static str),

    #[error("{0} token is not valid UTF-8")]
    NonUtf8Token(&'static str),

    #[error("netstring length prefix is not a decimal number")]
    InvalidLength,

    #[error("netstring length prefix is not followed by ':'")]
    MissingColon,

    #[error("netstring payload truncated: expected {expected} bytes, {available} available")]
    Truncated { expected: usize, available: usize },

    #[error("netstring payload is not terminated by ','")]
    MissingTerminator,

    #[error("header block is not a JSON object: {0}")]
    InvalidHeaders(#[source] serde_json::Error),

    #[error("header block has no METHOD")]
    MissingMethod,

    #[error("JSON body could not be decoded: {0}")]
    InvalidJsonBody(#[source] serde_json::Error),
}
