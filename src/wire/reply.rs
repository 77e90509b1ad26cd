//! Outbound reply frames.
//!
//! ```text
//! SENDER SP NETSTRING(CONN_ID SP CONN_ID ...) SP PAYLOAD
//! ```
//!
//! The proxy accepts at most 128 connection ids per frame, so larger
//! deliveries are split into several frames carrying the same payload.
//! An empty payload tells the proxy to close the listed connections.

use bytes::Bytes;

use super::netstring::{format_netstring, parse_netstring, write_netstring};
use super::FramingError;

/// Proxy-side limit on connection ids per reply frame.
pub const MAX_IDS_PER_FRAME: usize = 128;

/// Build the frame answering a single connection.
pub fn reply(sender: &str, conn_id: &str, payload: &[u8]) -> Bytes {
    encode(sender, &[conn_id], payload)
}

/// Build the frames delivering `payload` to every connection in `conn_ids`.
pub fn deliver<S: AsRef<str>>(sender: &str, conn_ids: &[S], payload: &[u8]) -> Vec<Bytes> {
    conn_ids
        .chunks(MAX_IDS_PER_FRAME)
        .map(|chunk| encode(sender, chunk, payload))
        .collect()
}

/// Build the frames closing every connection in `conn_ids`.
pub fn close<S: AsRef<str>>(sender: &str, conn_ids: &[S]) -> Vec<Bytes> {
    deliver(sender, conn_ids, b"")
}

/// Encode a control-channel request.
pub fn control_request(command: &[u8]) -> Bytes {
    Bytes::from(format_netstring(command))
}

/// Decode a control-channel reply.
pub fn control_reply(raw: &[u8]) -> Result<&[u8], FramingError> {
    parse_netstring(raw).map(|(payload, _)| payload)
}

fn encode<S: AsRef<str>>(sender: &str, conn_ids: &[S], payload: &[u8]) -> Bytes {
    let ids = conn_ids
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = Vec::with_capacity(sender.len() + ids.len() + payload.len() + 16);
    out.extend_from_slice(sender.as_bytes());
    out.push(b' ');
    write_netstring(&mut out, ids.as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload);
    Bytes::from(out)
}

/// A decoded outbound frame, as the proxy would see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFrame {
    pub sender: String,
    pub conn_ids: Vec<String>,
    pub payload: Bytes,
}

impl ReplyFrame {
    pub fn parse(raw: &Bytes) -> Result<Self, FramingError> {
        let space = raw
            .iter()
            .position(|&b| b == b' ')
            .ok_or(FramingError::MissingToken("sender"))?;
        let sender = std::str::from_utf8(&raw[..space])
            .map_err(|_| FramingError::NonUtf8Token("sender"))?
            .to_string();

        let (ids, rest) = parse_netstring(&raw[space + 1..])?;
        let ids = std::str::from_utf8(ids).map_err(|_| FramingError::NonUtf8Token("connection id"))?;
        if rest.first() != Some(&b' ') {
            return Err(FramingError::MissingToken("payload"));
        }
        let payload_start = raw.len() - rest.len() + 1;

        Ok(Self {
            sender,
            conn_ids: ids.split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect(),
            payload: raw.slice(payload_start..),
        })
    }

    pub fn is_close(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_reply_layout() {
        let frame = reply("u1", "c1", b"HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(&frame[..], b"u1 2:c1, HTTP/1.1 200 OK\r\n\r\n");

        let parsed = ReplyFrame::parse(&frame).unwrap();
        assert_eq!(parsed.sender, "u1");
        assert_eq!(parsed.conn_ids, vec!["c1"]);
        assert!(!parsed.is_close());
    }

    #[test]
    fn deliver_chunks_by_limit() {
        let ids: Vec<String> = (0..300).map(|i| i.to_string()).collect();
        let frames = deliver("u1", &ids, b"x");
        assert_eq!(frames.len(), 3);

        let parsed: Vec<ReplyFrame> = frames.iter().map(|f| ReplyFrame::parse(f).unwrap()).collect();
        assert_eq!(parsed[0].conn_ids.len(), 128);
        assert_eq!(parsed[1].conn_ids.len(), 128);
        assert_eq!(parsed[2].conn_ids.len(), 44);
        assert_eq!(parsed[2].conn_ids.last().map(String::as_str), Some("299"));
        assert!(parsed.iter().all(|p| &p.payload[..] == b"x"));
    }

    #[test]
    fn exactly_128_ids_is_one_frame() {
        let ids: Vec<String> = (0..128).map(|i| i.to_string()).collect();
        assert_eq!(deliver("u1", &ids, b"x").len(), 1);
    }

    #[test]
    fn close_sends_empty_payload() {
        let frames = close("u1", &["7", "8"]);
        assert_eq!(frames.len(), 1);
        let parsed = ReplyFrame::parse(&frames[0]).unwrap();
        assert!(parsed.is_close());
        assert_eq!(parsed.conn_ids, vec!["7", "8"]);
    }

    #[test]
    fn control_framing() {
        let req = control_request(b"status what=net");
        assert_eq!(&req[..], b"15:status what=net,");
        assert_eq!(control_reply(b"2:ok,").unwrap(), b"ok");
        assert!(control_reply(b"2:ok").is_err());
    }
}
