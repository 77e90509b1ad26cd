//! HTTP request/response model.
//!
//! # Data Flow
//! ```text
//! Message (wire layer)
//!     → request.rs (method, query, cookies, lazy form/multipart, request ID)
//!     → [routing layer picks a handler]
//!     → response.rs (status, headers, body → HTTP/1.1 payload)
//!     → reply frame back to the proxy
//! ```

pub mod request;
pub mod response;

pub use request::{AfterAnswer, FormData, Request};
pub use response::{Reply, Response};
