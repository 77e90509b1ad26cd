//! Response construction and serialisation.
//!
//! # Responsibilities
//! - Build handler responses (status, ordered headers, body)
//! - Render them as an HTTP/1.1 payload for the proxy to relay verbatim
//! - Provide the generic 404/500 bodies used at the dispatch boundary
//!
//! # Design Decisions
//! - `Content-Length` is always computed at render time, never trusted from headers
//! - `Reply::Deferred` is an explicit "no reply yet" value, not an empty response

use http::StatusCode;
use serde::Serialize;

/// What a handler hands back to the server loop.
#[derive(Debug)]
pub enum Reply {
    /// Send this response now.
    Respond(Response),
    /// The handler will answer out-of-band later; nothing is sent.
    Deferred,
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Respond(response)
    }
}

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// 200 with an HTML body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body)
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    pub fn redirect(location: &str) -> Self {
        Self::new(StatusCode::FOUND).with_header("Location", location)
    }

    /// Minimal text/plain 404. `detail` is only passed in debug mode.
    pub fn not_found(detail: Option<&str>) -> Self {
        let body = match detail {
            Some(detail) => format!("Not Found\n\n{}", detail),
            None => "Not Found".to_string(),
        };
        Self::text(StatusCode::NOT_FOUND, body)
    }

    /// Generic 500. `detail` is only passed in debug mode.
    pub fn server_error(detail: Option<&str>) -> Self {
        let body = match detail {
            Some(detail) => format!("Internal Server Error\n\n{}", detail),
            None => "Internal Server Error".to_string(),
        };
        Self::text(StatusCode::INTERNAL_SERVER_ERROR, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First header with this name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Render as an HTTP/1.1 message.
    pub fn to_http_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 128);
        out.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("Unknown")
            )
            .as_bytes(),
        );
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}
