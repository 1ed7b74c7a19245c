//! Raw TCP link to an RDS encoder's LAN command port.
//!
//! Encoders with an Ethernet port accept the same ASCII command set on a
//! plain TCP socket that they accept on their serial port. There is no
//! login or banner: once the handshake completes the encoder is listening
//! for `TEXT=` and `RT+TAG=` lines.
//!
//! [`TcpConnector`] is what the encoder link holds. It dials a fresh
//! [`TcpTransport`] on startup and again after every fault.
//!
//! ```no_run
//! use rdslink_core::transport::Transport;
//! use rdslink_transport::TcpTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> rdslink_core::Result<()> {
//! let mut link = TcpTransport::connect("192.168.1.50:5000").await?;
//! link.send(b"TEXT=HELLO\r\n").await?;
//!
//! let mut reply = [0u8; 16];
//! let n = link.receive(&mut reply, Duration::from_secs(5)).await?;
//! assert_eq!(&reply[..n], b"OK\r\n");
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use rdslink_core::error::{Error, Result};
use rdslink_core::transport::{Connector, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// How long a dial may take before the attempt counts as failed.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// An open socket to the encoder.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: String,
}

impl TcpTransport {
    /// Dial `host:port` with [`DEFAULT_CONNECT_TIMEOUT`].
    pub async fn connect(peer: &str) -> Result<Self> {
        Self::connect_with_timeout(peer, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Dial `host:port`, giving up after `limit`.
    pub async fn connect_with_timeout(peer: &str, limit: Duration) -> Result<Self> {
        debug!(%peer, limit_ms = limit.as_millis() as u64, "Dialing encoder");

        let stream = match tokio::time::timeout(limit, TcpStream::connect(peer)).await {
            Err(_) => {
                warn!(%peer, "Encoder did not answer the TCP handshake in time");
                return Err(Error::Timeout);
            }
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "Encoder dial failed");
                return Err(dial_error(e, peer));
            }
            Ok(Ok(stream)) => stream,
        };

        // Each command is a single short line.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "TCP_NODELAY not applied");
        }

        info!(%peer, "Encoder socket open");
        Ok(Self::from_stream(stream, peer.to_string()))
    }

    /// Adopt a socket that is already connected, e.g. one accepted by a
    /// listener in a test.
    pub fn from_stream(stream: TcpStream, peer: String) -> Self {
        Self {
            stream: Some(stream),
            peer,
        }
    }

    /// The `host:port` this socket was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        trace!(peer = %self.peer, line = %String::from_utf8_lossy(data).trim_end(), ">>");
        let stream = self.stream()?;
        stream.write_all(data).await.map_err(wire_error)?;
        stream.flush().await.map_err(wire_error)
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream()?;
        let n = match tokio::time::timeout(timeout, stream.read(buf)).await {
            Err(_) => return Err(Error::Timeout),
            Ok(read) => read.map_err(wire_error)?,
        };
        if n == 0 {
            warn!(peer = %self.peer, "Encoder closed the socket");
            return Err(Error::ConnectionLost);
        }
        trace!(peer = %self.peer, bytes = %String::from_utf8_lossy(&buf[..n]).trim_end(), "<<");
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        // The encoder may already be gone; a failed FIN changes nothing.
        if let Err(e) = stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Socket shutdown reported an error");
        }
        info!(peer = %self.peer, "Encoder socket closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Dials a new [`TcpTransport`] to one fixed encoder on every call.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    peer: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            peer: format!("{host}:{port}"),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let link = TcpTransport::connect_with_timeout(&self.peer, self.connect_timeout).await?;
        Ok(Box::new(link))
    }

    fn endpoint(&self) -> String {
        self.peer.clone()
    }
}

fn dial_error(e: std::io::Error, peer: &str) -> Error {
    if e.kind() == ErrorKind::ConnectionRefused {
        Error::Transport(format!("connection refused: {peer}"))
    } else {
        Error::Io(e)
    }
}

/// Errors that mean the socket is dead become [`Error::ConnectionLost`].
fn wire_error(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected
        | ErrorKind::UnexpectedEof => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn local_encoder() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = listener.local_addr().unwrap().to_string();
        (listener, peer)
    }

    #[tokio::test]
    async fn text_line_is_delivered_and_ok_read_back() {
        let (listener, peer) = local_encoder().await;
        let encoder = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket);
            let mut line = String::new();
            lines.read_line(&mut line).await.unwrap();
            lines.get_mut().write_all(b"OK\r\n").await.unwrap();
            line
        });

        let mut link = TcpTransport::connect(&peer).await.unwrap();
        assert!(link.is_connected());
        assert_eq!(link.peer(), peer);
        link.send(b"TEXT=OWL CITY - FIREFLIES\r\n").await.unwrap();

        let mut reply = [0u8; 16];
        let n = link.receive(&mut reply, Duration::from_secs(2)).await.unwrap();
        assert_eq!(&reply[..n], b"OK\r\n");
        assert_eq!(encoder.await.unwrap(), "TEXT=OWL CITY - FIREFLIES\r\n");
        link.close().await.unwrap();
    }

    #[tokio::test]
    async fn refused_dial_names_the_peer() {
        let (listener, peer) = local_encoder().await;
        drop(listener);

        match TcpTransport::connect(&peer).await {
            Err(Error::Transport(msg)) => assert!(msg.contains(&peer), "{msg}"),
            other => panic!("expected a refused dial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_encoder_times_out() {
        let (listener, peer) = local_encoder().await;
        let encoder = tokio::spawn(async move {
            let _socket = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut link = TcpTransport::connect(&peer).await.unwrap();
        let mut reply = [0u8; 8];
        let result = link.receive(&mut reply, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        encoder.abort();
    }

    #[tokio::test]
    async fn hangup_is_connection_lost() {
        let (listener, peer) = local_encoder().await;
        let encoder = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut link = TcpTransport::connect(&peer).await.unwrap();
        encoder.await.unwrap();

        let mut reply = [0u8; 8];
        let result = link.receive(&mut reply, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::ConnectionLost)), "{result:?}");
    }

    #[tokio::test]
    async fn closed_socket_refuses_io_and_closes_twice() {
        let (listener, peer) = local_encoder().await;
        let encoder = tokio::spawn(async move {
            let _socket = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut link = TcpTransport::connect(&peer).await.unwrap();
        link.close().await.unwrap();
        assert!(!link.is_connected());
        assert!(matches!(link.send(b"TEXT=X\r\n").await, Err(Error::NotConnected)));
        link.close().await.unwrap();
        encoder.abort();
    }

    #[tokio::test]
    async fn connector_dials_a_new_socket_each_time() {
        let (listener, peer) = local_encoder().await;
        let port: u16 = peer.rsplit(':').next().unwrap().parse().unwrap();
        let encoder = tokio::spawn(async move {
            for _ in 0..2 {
                let _socket = listener.accept().await.unwrap();
            }
        });

        let connector = TcpConnector::new("127.0.0.1", port).connect_timeout(Duration::from_secs(1));
        assert_eq!(connector.endpoint(), peer);

        let first = connector.connect().await.unwrap();
        let second = connector.connect().await.unwrap();
        assert!(first.is_connected() && second.is_connected());
        encoder.await.unwrap();
    }
}
