//! In-process transport over tokio channels.
//!
//! `ChannelTransport` is handed to the server; the matching `ChannelPeer`
//! plays the proxy: it pushes frames in, reads replies out and answers
//! control requests.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::transport::{Transport, TransportError};

const CHANNEL_CAPACITY: usize = 64;

/// A control request waiting for the peer's answer.
#[derive(Debug)]
pub struct ControlRequest {
    pub request: Bytes,
    pub reply: oneshot::Sender<Bytes>,
}

#[derive(Debug)]
pub struct ChannelTransport {
    name: String,
    inbound: mpsc::Receiver<Bytes>,
    outbound: mpsc::Sender<Bytes>,
    control: mpsc::Sender<ControlRequest>,
}

#[derive(Debug)]
pub struct ChannelPeer {
    pub inbound: mpsc::Sender<Bytes>,
    pub outbound: mpsc::Receiver<Bytes>,
    pub control: mpsc::Receiver<ControlRequest>,
}

impl ChannelTransport {
    pub fn pair(name: impl Into<String>) -> (Self, ChannelPeer) {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                name: name.into(),
                inbound: inbound_rx,
                outbound: outbound_tx,
                control: control_tx,
            },
            ChannelPeer {
                inbound: inbound_tx,
                outbound: outbound_rx,
                control: control_rx,
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.recv().await
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed("outbound"))
    }

    async fn control(&mut self, request: Bytes) -> Result<Bytes, TransportError> {
        let (reply, answer) = oneshot::channel();
        self.control
            .send(ControlRequest { request, reply })
            .await
            .map_err(|_| TransportError::Closed("control"))?;
        answer.await.map_err(|_| TransportError::Closed("control"))
    }
}

impl ChannelPeer {
    /// Push a raw frame towards the server.
    pub async fn push(&self, frame: impl Into<Bytes>) -> Result<(), TransportError> {
        self.inbound
            .send(frame.into())
            .await
            .map_err(|_| TransportError::Closed("inbound"))
    }

    /// Next reply frame from the server.
    pub async fn next_reply(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut transport, mut peer) = ChannelTransport::pair("test");
        assert_eq!(transport.name(), "test");

        peer.push(&b"frame"[..]).await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), &b"frame"[..]);

        transport.send(Bytes::from_static(b"reply")).await.unwrap();
        assert_eq!(peer.next_reply().await.unwrap(), &b"reply"[..]);
    }

    #[tokio::test]
    async fn control_round_trip() {
        let (mut transport, mut peer) = ChannelTransport::pair("test");
        let answer = tokio::spawn(async move {
            let req = peer.control.recv().await.unwrap();
            assert_eq!(req.request, &b"status"[..]);
            req.reply.send(Bytes::from_static(b"ok")).unwrap();
        });
        assert_eq!(transport.control(Bytes::from_static(b"status")).await.unwrap(), &b"ok"[..]);
        answer.await.unwrap();
    }

    #[tokio::test]
    async fn recv_ends_when_peer_drops() {
        let (mut transport, peer) = ChannelTransport::pair("test");
        drop(peer);
        assert!(transport.recv().await.is_none());
        assert!(matches!(
            transport.send(Bytes::new()).await,
            Err(TransportError::Closed("outbound"))
        ));
    }
}
