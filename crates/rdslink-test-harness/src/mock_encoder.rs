//! Mock RDS encoder server for end-to-end testing over TCP.
//!
//! [`MockEncoderServer`] listens on a random localhost port and speaks the
//! encoder's line protocol: it reads `\r\n`-terminated command lines and
//! answers each according to a per-connection script of [`Reply`]s. Lines
//! past the end of a script are answered `OK`.
//!
//! Unlike a one-shot mock, the server keeps accepting connections, so
//! reconnect behavior can be tested: script *n* drives connection *n*.
//!
//! # Example
//!
//! ```
//! use rdslink_test_harness::{MockEncoderServer, Reply};
//!
//! # async fn example() -> std::io::Result<()> {
//! let server = MockEncoderServer::start(vec![
//!     // First connection: reject the first line, then drop.
//!     vec![Reply::No, Reply::Drop],
//!     // Second connection: accept everything.
//!     vec![],
//! ])
//! .await?;
//!
//! let (host, port) = (server.host(), server.port());
//! // ... point a TcpConnector at host:port and test ...
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the mock encoder answers one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Answer `OK\r\n`.
    Ok,
    /// Answer `NO\r\n`.
    No,
    /// Write these exact bytes.
    Raw(String),
    /// Wait this long, then answer `OK\r\n`.
    Late(Duration),
    /// Say nothing, so the client times out.
    Silence,
    /// Close the connection without answering.
    Drop,
}

/// A scripted encoder listening on localhost.
///
/// Dropping the server aborts its task and closes the listener.
pub struct MockEncoderServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockEncoderServer {
    /// Bind a listener and start serving.
    ///
    /// `scripts[n]` drives the `n`th accepted connection. Connections beyond
    /// the last script get an empty one, so every line is answered `OK`.
    pub async fn start(scripts: Vec<Vec<Reply>>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(accept_loop(
            listener,
            scripts.into_iter().map(VecDeque::from).collect(),
            received.clone(),
            connections.clone(),
        ));

        Ok(MockEncoderServer {
            addr,
            received,
            connections,
            task,
        })
    }

    /// The listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The listening host, for building a connector.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// The listening port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every command line received so far, across all connections, without
    /// terminators.
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` lines have arrived or `timeout` passes,
    /// then return what was received.
    pub async fn wait_for_lines(&self, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let lines = self.received();
            if lines.len() >= count || tokio::time::Instant::now() >= deadline {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until at least `count` connections have been accepted or
    /// `timeout` passes. Returns whether the count was reached.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.connections() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockEncoderServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    mut scripts: VecDeque<VecDeque<Reply>>,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::debug!(error = %e, "mock encoder accept failed");
                return;
            }
        };
        let n = connections.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%peer, connection = n, "mock encoder accepted connection");

        // Connections are served one at a time, like the real device.
        let script = scripts.pop_front().unwrap_or_default();
        serve(stream, script, &received).await;
    }
}

async fn serve(stream: TcpStream, mut script: VecDeque<Reply>, received: &Mutex<Vec<String>>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end_matches('\r').to_string();
        if let Ok(mut log) = received.lock() {
            log.push(line.clone());
        }

        let reply = script.pop_front().unwrap_or(Reply::Ok);
        tracing::trace!(line = %line, reply = ?reply, "mock encoder line");

        let bytes = match reply {
            Reply::Ok => b"OK\r\n".to_vec(),
            Reply::No => b"NO\r\n".to_vec(),
            Reply::Raw(raw) => raw.into_bytes(),
            Reply::Late(delay) => {
                tokio::time::sleep(delay).await;
                b"OK\r\n".to_vec()
            }
            Reply::Silence => continue,
            Reply::Drop => return,
        };
        if writer.write_all(&bytes).await.is_err() || writer.flush().await.is_err() {
            return;
        }
    }
}
