//! Inbound frame decoding.
//!
//! # Frame Layout
//! ```text
//! SENDER SP CONN_ID SP PATH SP NETSTRING(HEADERS_JSON) NETSTRING(BODY)
//! ```
//!
//! The first three tokens are split on the first three spaces; everything
//! after the third space is the netstring blob, spaces included.

use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;

use bytes::Bytes;
use serde_json::{Map, Value};

use super::netstring::{checked_payload_end, parse_prefix};
use super::FramingError;

/// Header key carrying the request method (or `JSON` for control messages).
pub const METHOD: &str = "METHOD";

/// Method value used by the proxy for control/notification messages.
pub const METHOD_JSON: &str = "JSON";

/// Decoded header block, in the order the proxy sent it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Map<String, Value>);

impl Headers {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Look up a header as a string.
    ///
    /// Exact key match first, then an ASCII case-insensitive scan. When the
    /// proxy folded a repeated header into an array, the first value wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = self.0.get(key).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })?;
        match value {
            Value::String(s) => Some(s.as_str()),
            Value::Array(items) => items.iter().find_map(Value::as_str),
            _ => None,
        }
    }

    /// All string values of a header, for headers the proxy sent repeatedly.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .flat_map(|(_, v)| match v {
                Value::String(s) => vec![s.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Declared `content-length`, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length").and_then(|v| v.trim().parse().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// A seekable, read-once view of the request body inside the frame buffer.
///
/// The handle is a zero-copy slice of the frame; dropping it (with its
/// `Message`) releases the buffer.
#[derive(Debug)]
pub struct BodyHandle {
    data: Bytes,
    pos: u64,
}

impl BodyHandle {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read `range` without disturbing the current position.
    ///
    /// The returned bytes share the frame buffer; nothing is copied.
    pub fn read_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        if range.start > range.end || range.end > self.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range {:?} outside body of {} bytes", range, self.len()),
            ));
        }
        Ok(self.data.slice(range.start as usize..range.end as usize))
    }

    /// Consume the handle and return the whole body.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl Read for BodyHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.pos.min(self.len()) as usize;
        let remaining = &self.data[start..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BodyHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of body",
            )),
        }
    }
}

/// Message body as handed over by the parser.
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Eagerly decoded body of a `JSON` control message.
    Json(Value),
    /// Unread body bytes; consumed by the request layer or multipart decoder.
    Stream(BodyHandle),
}

/// One decoded request envelope.
#[derive(Debug)]
pub struct Message {
    /// Identity of the proxy instance; return address for the reply.
    pub sender: String,
    /// Client connection within the proxy.
    pub conn_id: String,
    pub path: String,
    pub headers: Headers,
    body: Body,
}

impl Message {
    /// Decode one raw frame.
    pub fn parse(raw: Bytes) -> Result<Self, FramingError> {
        let (sender, rest) = split_token(&raw, 0, "sender")?;
        let (conn_id, rest) = split_token(&raw, rest, "connection id")?;
        let (path, rest) = split_token(&raw, rest, "path")?;

        let blob = &raw[rest..];
        let (header_len, header_start) = parse_prefix(blob)?;
        let header_end = checked_payload_end(blob, header_start, header_len)?;
        let headers: Map<String, Value> =
            serde_json::from_slice(&blob[header_start..header_end]).map_err(FramingError::InvalidHeaders)?;
        let headers = Headers::new(headers);

        let method = headers.get(METHOD).ok_or(FramingError::MissingMethod)?.to_string();

        // Cursor sits on the body netstring.
        let body_offset = rest + header_end + 1;
        let body_blob = &raw[body_offset..];
        let (body_len, body_start) = parse_prefix(body_blob)?;
        checked_payload_end(body_blob, body_start, body_len)?;
        let payload = body_offset + body_start..body_offset + body_start + body_len;

        let body = if method == METHOD_JSON {
            let value = serde_json::from_slice(&raw[payload]).map_err(FramingError::InvalidJsonBody)?;
            Body::Json(value)
        } else if method == "POST" || headers.content_length().unwrap_or(0) > 0 {
            Body::Stream(BodyHandle::new(raw.slice(payload)))
        } else {
            Body::Empty
        };

        Ok(Self {
            sender,
            conn_id,
            path,
            headers,
            body,
        })
    }

    pub fn method(&self) -> &str {
        self.headers.get(METHOD).unwrap_or_default()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Take the body out of the message. A second call yields `Body::Empty`.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Body of a `JSON` control message.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// True for the proxy's client-disconnect notification.
    pub fn is_disconnect(&self) -> bool {
        self.method() == METHOD_JSON
            && self
                .json()
                .and_then(|v| v.get("type"))
                .and_then(Value::as_str)
                == Some("disconnect")
    }
}

/// Split one space-terminated token starting at `from`.
///
/// Returns the token and the offset just past the separating space.
fn split_token(raw: &[u8], from: usize, what: &'static str) -> Result<(String, usize), FramingError> {
    let rest = &raw[from..];
    let space = rest
        .iter()
        .position(|&b| b == b' ')
        .ok_or(FramingError::MissingToken(what))?;
    if space == 0 {
        return Err(FramingError::MissingToken(what));
    }
    let token = std::str::from_utf8(&rest[..space]).map_err(|_| FramingError::NonUtf8Token(what))?;
    Ok((token.to_string(), from + space + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::netstring::format_netstring;

    fn frame(headers: &str, body: &[u8]) -> Bytes {
        let mut raw = b"u1 c1 /foo ".to_vec();
        raw.extend(format_netstring(headers.as_bytes()));
        raw.extend(format_netstring(body));
        Bytes::from(raw)
    }

    #[test]
    fn parses_simple_get() {
        let raw = Bytes::from_static(br#"u1 c1 /foo 16:{"METHOD":"GET"},0:,"#);
        let msg = Message::parse(raw).unwrap();
        assert_eq!(msg.sender, "u1");
        assert_eq!(msg.conn_id, "c1");
        assert_eq!(msg.path, "/foo");
        assert_eq!(msg.method(), "GET");
        assert_eq!(msg.headers.len(), 1);
        assert!(matches!(msg.body(), Body::Empty));
    }

    #[test]
    fn parsing_twice_is_identical() {
        let raw = frame(r#"{"METHOD":"GET","host":"example.com","QUERY":"a=1"}"#, b"");
        let first = Message::parse(raw.clone()).unwrap();
        let second = Message::parse(raw).unwrap();
        assert_eq!(first.headers, second.headers);
        assert_eq!(first.path, second.path);
    }

    #[test]
    fn path_may_not_contain_spaces_but_blob_may() {
        let raw = frame(r#"{"METHOD":"GET","user-agent":"a b c"}"#, b"");
        let msg = Message::parse(raw).unwrap();
        assert_eq!(msg.headers.get("User-Agent"), Some("a b c"));
    }

    #[test]
    fn post_body_is_left_unread() {
        let raw = frame(r#"{"METHOD":"POST","content-length":"5"}"#, b"hello");
        let mut msg = Message::parse(raw).unwrap();
        match msg.take_body() {
            Body::Stream(handle) => {
                assert_eq!(handle.position(), 0);
                assert_eq!(handle.len(), 5);
                assert_eq!(&handle.into_bytes()[..], b"hello");
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn body_handle_is_single_use() {
        let raw = frame(r#"{"METHOD":"PUT","content-length":"3"}"#, b"abc");
        let mut msg = Message::parse(raw).unwrap();
        assert!(matches!(msg.take_body(), Body::Stream(_)));
        assert!(matches!(msg.take_body(), Body::Empty));
    }

    #[test]
    fn get_without_length_drops_body() {
        let raw = frame(r#"{"METHOD":"GET"}"#, b"ignored");
        let msg = Message::parse(raw).unwrap();
        assert!(matches!(msg.body(), Body::Empty));
    }

    #[test]
    fn json_disconnect_is_decoded() {
        let raw = frame(r#"{"METHOD":"JSON"}"#, br#"{"type":"disconnect"}"#);
        let msg = Message::parse(raw).unwrap();
        assert!(msg.is_disconnect());
        assert_eq!(msg.json().unwrap()["type"], "disconnect");
    }

    #[test]
    fn rejects_missing_tokens() {
        let err = Message::parse(Bytes::from_static(b"u1 c1")).unwrap_err();
        assert!(matches!(err, FramingError::MissingToken("connection id")));
        let err = Message::parse(Bytes::from_static(b" c1 /foo 2:{},0:,")).unwrap_err();
        assert!(matches!(err, FramingError::MissingToken("sender")));
    }

    #[test]
    fn rejects_bad_lengths_and_truncation() {
        let err = Message::parse(Bytes::from_static(b"u1 c1 /foo xx:{},0:,")).unwrap_err();
        assert!(matches!(err, FramingError::InvalidLength));

        let err = Message::parse(Bytes::from_static(br#"u1 c1 /foo 16:{"METHOD":"GET"},5:ab"#)).unwrap_err();
        assert!(matches!(err, FramingError::Truncated { .. }));
    }

    #[test]
    fn rejects_headers_without_method() {
        let err = Message::parse(Bytes::from_static(b"u1 c1 /foo 2:{},0:,")).unwrap_err();
        assert!(matches!(err, FramingError::MissingMethod));
    }

    #[test]
    fn read_range_leaves_position_alone() {
        let mut handle = BodyHandle::new(Bytes::from_static(b"0123456789"));
        let mut buf = [0u8; 4];
        handle.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");
        assert_eq!(&handle.read_range(6..9).unwrap()[..], b"678");
        assert_eq!(handle.position(), 4);
        assert!(handle.read_range(8..11).is_err());
    }
}
