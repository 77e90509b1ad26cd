//! TCP transport.
//!
//! Three client connections to the proxy, one per channel. Every message on
//! a stream is wrapped in a netstring so frame boundaries survive TCP.
//! A reader task drains the inbound stream into a bounded queue, which keeps
//! `recv` cancel-safe and applies backpressure to the proxy when the loop
//! falls behind.

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::transport::{Transport, TransportError};
use crate::config::TransportConfig;
use crate::wire::netstring::{format_netstring, read_netstring};

const INBOUND_QUEUE: usize = 64;

#[derive(Debug)]
pub struct TcpTransport {
    name: String,
    frames: mpsc::Receiver<Bytes>,
    reader: JoinHandle<()>,
    outbound: TcpStream,
    control: Option<TcpStream>,
    max_frame_bytes: usize,
}

impl TcpTransport {
    pub async fn connect(config: &TransportConfig) -> Result<Self, TransportError> {
        let inbound = dial("inbound", &config.inbound).await?;
        let outbound = dial("outbound", &config.outbound).await?;
        let control = match &config.control {
            Some(address) => Some(dial("control", address).await?),
            None => None,
        };

        let (tx, frames) = mpsc::channel(INBOUND_QUEUE);
        let reader = tokio::spawn(read_frames(config.name.clone(), inbound, tx, config.max_frame_bytes));

        tracing::info!(
            transport = %config.name,
            inbound = %config.inbound,
            outbound = %config.outbound,
            control = ?config.control,
            "Transport connected"
        );

        Ok(Self {
            name: config.name.clone(),
            frames,
            reader,
            outbound,
            control,
            max_frame_bytes: config.max_frame_bytes,
        })
    }
}

impl Transport for TcpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recv(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        write_framed(&mut self.outbound, &frame)
            .await
            .map_err(|source| TransportError::Io { channel: "outbound", source })
    }

    async fn control(&mut self, request: Bytes) -> Result<Bytes, TransportError> {
        let max = self.max_frame_bytes;
        let stream = self.control.as_mut().ok_or(TransportError::NoControl)?;
        let io = |source| TransportError::Io { channel: "control", source };

        write_framed(stream, &request).await.map_err(io)?;
        match read_netstring(stream, max).await.map_err(io)? {
            Some(reply) => Ok(Bytes::from(reply)),
            None => Err(TransportError::Closed("control")),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn dial(channel: &'static str, address: &str) -> Result<TcpStream, TransportError> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|source| TransportError::Connect {
            channel,
            address: address.to_string(),
            source,
        })?;
    stream
        .set_nodelay(true)
        .map_err(|source| TransportError::Io { channel, source })?;
    Ok(stream)
}

async fn write_framed(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    stream.write_all(&format_netstring(payload)).await?;
    stream.flush().await
}

async fn read_frames(name: String, mut inbound: TcpStream, tx: mpsc::Sender<Bytes>, max_frame_bytes: usize) {
    loop {
        match read_netstring(&mut inbound, max_frame_bytes).await {
            Ok(Some(frame)) => {
                if tx.send(Bytes::from(frame)).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                tracing::info!(transport = %name, "Inbound stream closed by proxy");
                return;
            }
            Err(e) => {
                // Stream framing cannot be resynchronised; drop the connection.
                tracing::warn!(transport = %name, error = %e, "Inbound stream failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn exchanges_framed_messages() {
        let (inbound, inbound_addr) = listener().await;
        let (outbound, outbound_addr) = listener().await;
        let (control, control_addr) = listener().await;

        let config = TransportConfig {
            name: "proxy".to_string(),
            inbound: inbound_addr,
            outbound: outbound_addr,
            control: Some(control_addr),
            max_frame_bytes: 1024,
        };
        let (transport, accepted) = tokio::join!(TcpTransport::connect(&config), async {
            let (a, _) = inbound.accept().await.unwrap();
            let (b, _) = outbound.accept().await.unwrap();
            let (c, _) = control.accept().await.unwrap();
            (a, b, c)
        });
        let mut transport = transport.unwrap();
        let (mut proxy_in, mut proxy_out, mut proxy_ctl) = accepted;

        proxy_in.write_all(&format_netstring(b"u1 c1 /foo 2:{},0:,")).await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), &b"u1 c1 /foo 2:{},0:,"[..]);

        transport.send(Bytes::from_static(b"u1 2:c1, hi")).await.unwrap();
        let got = read_netstring(&mut proxy_out, 1024).await.unwrap().unwrap();
        assert_eq!(got, b"u1 2:c1, hi");

        let answer = tokio::spawn(async move {
            let req = read_netstring(&mut proxy_ctl, 1024).await.unwrap().unwrap();
            assert_eq!(req, b"6:status,");
            proxy_ctl.write_all(&format_netstring(b"2:ok,")).await.unwrap();
        });
        let reply = transport.control(Bytes::from_static(b"6:status,")).await.unwrap();
        assert_eq!(reply, &b"2:ok,"[..]);
        answer.await.unwrap();

        drop(proxy_in);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn oversized_frame_closes_inbound() {
        let (inbound, inbound_addr) = listener().await;
        let (outbound, outbound_addr) = listener().await;
        let config = TransportConfig {
            name: "proxy".to_string(),
            inbound: inbound_addr,
            outbound: outbound_addr,
            control: None,
            max_frame_bytes: 4,
        };
        let (transport, (mut proxy_in, _out)) = tokio::join!(TcpTransport::connect(&config), async {
            let (a, _) = inbound.accept().await.unwrap();
            let (b, _) = outbound.accept().await.unwrap();
            (a, b)
        });
        let mut transport = transport.unwrap();

        proxy_in.write_all(b"10:0123456789,").await.unwrap();
        assert!(transport.recv().await.is_none());
        assert!(matches!(
            transport.control(Bytes::new()).await,
            Err(TransportError::NoControl)
        ));
    }

    #[tokio::test]
    async fn connect_failure_names_channel() {
        let (unused, addr) = listener().await;
        drop(unused);
        let config = TransportConfig {
            name: "proxy".to_string(),
            inbound: addr.clone(),
            outbound: addr,
            control: None,
            max_frame_bytes: 4,
        };
        let err = TcpTransport::connect(&config).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { channel: "inbound", .. }));
    }
}
