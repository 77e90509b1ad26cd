//! Shared utilities for integration tests.
//!
//! `FakeProxy` stands in for the upstream proxy: it pushes request frames
//! through a `ChannelPeer` and decodes the reply frames coming back.

use std::time::Duration;

use bytes::Bytes;
use handler_dispatch::net::ChannelPeer;
use handler_dispatch::wire::{format_netstring, ReplyFrame};

pub const SENDER: &str = "proxy-1";

/// Build a request frame the way the proxy does.
pub fn frame(conn_id: &str, path: &str, headers: &str, body: &[u8]) -> Vec<u8> {
    let mut raw = format!("{} {} {} ", SENDER, conn_id, path).into_bytes();
    raw.extend(format_netstring(headers.as_bytes()));
    raw.extend(format_netstring(body));
    raw
}

pub fn get(conn_id: &str, path: &str) -> Vec<u8> {
    frame(conn_id, path, r#"{"METHOD":"GET","VERSION":"HTTP/1.1"}"#, b"")
}

#[allow(dead_code)]
pub fn disconnect(conn_id: &str) -> Vec<u8> {
    frame(conn_id, "@*", r#"{"METHOD":"JSON"}"#, br#"{"type":"disconnect"}"#)
}

/// A decoded HTTP reply.
#[derive(Debug)]
pub struct HttpReply {
    pub conn_ids: Vec<String>,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl HttpReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub struct FakeProxy {
    pub peer: ChannelPeer,
}

#[allow(dead_code)]
impl FakeProxy {
    pub fn new(peer: ChannelPeer) -> Self {
        Self { peer }
    }

    pub async fn push(&self, frame: Vec<u8>) {
        self.peer.push(frame).await.unwrap();
    }

    /// Next reply frame, failing the test if none arrives within a second.
    pub async fn next_frame(&mut self) -> ReplyFrame {
        let raw: Bytes = tokio::time::timeout(Duration::from_secs(1), self.peer.next_reply())
            .await
            .expect("timed out waiting for a reply")
            .expect("server closed the outbound channel");
        ReplyFrame::parse(&raw).unwrap()
    }

    pub async fn next_reply(&mut self) -> HttpReply {
        let frame = self.next_frame().await;
        assert_eq!(frame.sender, SENDER);
        parse_http(frame.conn_ids, &frame.payload)
    }

    /// Assert nothing is sent back within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(Some(raw)) = tokio::time::timeout(wait, self.peer.next_reply()).await {
            panic!("unexpected reply: {:?}", raw);
        }
    }
}

fn parse_http(conn_ids: Vec<String>, payload: &[u8]) -> HttpReply {
    let split = payload
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("reply has no header terminator");
    let head = std::str::from_utf8(&payload[..split]).unwrap();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let status = status_line.split(' ').nth(1).unwrap().parse().unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    HttpReply {
        conn_ids,
        status,
        headers,
        body: payload[split + 4..].to_vec(),
    }
}
