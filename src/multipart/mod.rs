//! Multipart body decoding.
//!
//! # Data Flow
//! ```text
//! BodyHandle (or any Read)
//!     → scanner.rs (chunked reads, lookback window, absolute offsets)
//!     → decoder.rs (boundary markers, part headers, field/file split)
//!     → MultipartField* (lazy, one pass)
//! ```
//!
//! # Design Decisions
//! - File parts store offsets only; bytes are read on demand with seek/restore
//! - Field parts are read eagerly; they are small by nature
//! - A malformed body ends the sequence, it never panics or errors the request

pub mod decoder;
pub mod headers;
pub mod scanner;

pub use decoder::{FilePart, MultipartDecoder, MultipartField, PartKind};

/// Errors raised while splitting a multipart body.
#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("not a multipart content type with a boundary: {0:?}")]
    InvalidContentType(String),

    #[error("malformed multipart body: {0}")]
    MalformedMultipart(String),

    #[error("I/O error reading body: {0}")]
    Io(#[from] std::io::Error),
}
