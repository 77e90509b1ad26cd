//! Out-of-band replies.
//!
//! A handler that returns `Reply::Deferred` answers later through an
//! `Outbox`. The server loop drains the queue between frames, chunks the
//! connection ids into reply frames and pushes them to the proxy the sender
//! was last seen on.

use bytes::Bytes;
use tokio::sync::mpsc;

use super::transport::TransportError;
use crate::http::Response;

/// One queued delivery: `payload` to every connection in `conn_ids`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub sender: String,
    pub conn_ids: Vec<String>,
    /// Raw bytes relayed by the proxy. Empty closes the connections.
    pub payload: Bytes,
}

/// Cloneable handle for queueing replies from anywhere in the process.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue `payload` for every connection in `conn_ids` of proxy `sender`.
    pub fn deliver<S: AsRef<str>>(
        &self,
        sender: &str,
        conn_ids: &[S],
        payload: impl Into<Bytes>,
    ) -> Result<(), TransportError> {
        if conn_ids.is_empty() {
            return Ok(());
        }
        self.tx
            .send(Outgoing {
                sender: sender.to_string(),
                conn_ids: conn_ids.iter().map(|id| id.as_ref().to_string()).collect(),
                payload: payload.into(),
            })
            .map_err(|_| TransportError::Closed("outbox"))
    }

    /// Queue an HTTP response for one connection.
    pub fn respond(&self, sender: &str, conn_id: &str, response: &Response) -> Result<(), TransportError> {
        self.deliver(sender, &[conn_id], response.to_http_bytes())
    }

    /// Ask the proxy to close these connections.
    pub fn close<S: AsRef<str>>(&self, sender: &str, conn_ids: &[S]) -> Result<(), TransportError> {
        self.deliver(sender, conn_ids, Bytes::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_deliveries_in_order() {
        let (outbox, mut rx) = Outbox::channel();
        outbox.respond("proxy", "7", &Response::ok("hi")).unwrap();
        outbox.close("proxy", &["7", "8"]).unwrap();
        outbox.deliver("proxy", &[] as &[&str], "ignored").unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.conn_ids, vec!["7"]);
        assert!(first.payload.starts_with(b"HTTP/1.1 200 OK\r\n"));

        let second = rx.try_recv().unwrap();
        assert_eq!(second.conn_ids, vec!["7", "8"]);
        assert!(second.payload.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn fails_once_the_loop_is_gone() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        assert!(matches!(
            outbox.close("proxy", &["1"]),
            Err(TransportError::Closed("outbox"))
        ));
    }
}
