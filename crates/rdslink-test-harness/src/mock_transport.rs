//! Mock transport for deterministic testing of the encoder IO task.
//!
//! [`MockTransport`] plays an encoder from a script: each command line the
//! IO task writes is checked against the next entry, which then decides
//! whether the encoder answers, stays quiet, or hangs up.
//!
//! [`MockConnector`] hands out a queue of scripted transports, one per
//! connection attempt, so reconnect behavior can be exercised too.
//!
//! # Example
//!
//! ```
//! use rdslink_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the IO task sends this line, answer OK.
//! mock.expect_line("TEXT=Owl City - Fireflies", "OK");
//! // This one gets no answer at all.
//! mock.expect_silence(b"RT+TAG=04,0,8,01,11,9,1,0\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdslink_core::error::{Error, Result};
use rdslink_core::transport::{Connector, Transport};

/// What the mock does after a matching send.
#[derive(Debug, Clone)]
enum Outcome {
    /// Return these bytes from subsequent `receive()` calls.
    Reply(Vec<u8>),
    /// Never answer; `receive()` times out.
    Silence,
    /// The peer goes away; `receive()` reports the connection lost.
    Drop,
}

/// A pre-loaded request and what to do about it.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    outcome: Outcome,
}

/// Shared record of every `send()` made through a [`MockTransport`].
///
/// The transport is moved into the IO task, so tests keep a clone of this
/// handle to inspect traffic afterwards.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl SentLog {
    /// All sends so far, in order.
    pub fn sends(&self) -> Vec<Vec<u8>> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// All sends so far as lossy UTF-8 with the line terminator removed.
    pub fn lines(&self) -> Vec<String> {
        self.sends()
            .iter()
            .map(|bytes| {
                String::from_utf8_lossy(bytes)
                    .trim_end_matches(['\r', '\n'])
                    .to_string()
            })
            .collect()
    }

    fn push(&self, data: &[u8]) {
        if let Ok(mut log) = self.0.lock() {
            log.push(data.to_vec());
        }
    }
}

/// A mock [`Transport`] for testing the encoder link without a socket.
///
/// Every `send()` is logged and compared byte for byte with the head of
/// the script; a mismatch is a [`Error::Protocol`]. The matched entry then
/// decides what the following `receive()` calls see.
///
/// A `receive()` with nothing pending returns [`Error::Timeout`]
/// immediately, unless [`drop_when_idle`](MockTransport::drop_when_idle)
/// was called, in which case it reports [`Error::ConnectionLost`] once all
/// expectations are used up.
#[derive(Debug)]
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    /// The reply bytes pending for `receive()`.
    pending: Option<Vec<u8>>,
    /// Cursor into the pending reply.
    cursor: usize,
    /// Set once a `Drop` outcome fires.
    dropped: bool,
    drop_when_idle: bool,
    connected: bool,
    sent: SentLog,
}

impl MockTransport {
    /// An open transport with an empty script.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending: None,
            cursor: 0,
            dropped: false,
            drop_when_idle: false,
            connected: true,
            sent: SentLog::default(),
        }
    }

    /// Add an expected request and the raw bytes to answer with.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.push(request, Outcome::Reply(response.to_vec()));
    }

    /// Expect the command line `command` and answer with the line `reply`.
    ///
    /// Both get a `\r\n` terminator appended.
    pub fn expect_line(&mut self, command: &str, reply: &str) {
        self.expect(
            format!("{command}\r\n").as_bytes(),
            format!("{reply}\r\n").as_bytes(),
        );
    }

    /// Expect `request` and never answer it.
    pub fn expect_silence(&mut self, request: &[u8]) {
        self.push(request, Outcome::Silence);
    }

    /// Expect `request`, then behave as if the peer closed the connection.
    pub fn expect_drop(&mut self, request: &[u8]) {
        self.push(request, Outcome::Drop);
    }

    /// Report a lost connection from idle reads once the script runs out.
    pub fn drop_when_idle(&mut self) {
        self.drop_when_idle = true;
    }

    /// A handle to the log of sent data.
    pub fn sent_log(&self) -> SentLog {
        self.sent.clone()
    }

    /// Whether every scripted command has been sent.
    pub fn is_exhausted(&self) -> bool {
        self.expectations.is_empty()
    }

    fn push(&mut self, request: &[u8], outcome: Outcome) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            outcome,
        });
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.dropped {
            return Err(Error::ConnectionLost);
        }

        self.sent.push(data);

        let Some(expectation) = self.expectations.pop_front() else {
            return Err(Error::Protocol("mock encoder script is exhausted".into()));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }

        match expectation.outcome {
            Outcome::Reply(bytes) => {
                self.pending = Some(bytes);
                self.cursor = 0;
            }
            Outcome::Silence => {}
            Outcome::Drop => self.dropped = true,
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.dropped {
            return Err(Error::ConnectionLost);
        }

        if let Some(ref response) = self.pending {
            let remaining = &response[self.cursor..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.cursor += n;
            if self.cursor >= response.len() {
                self.pending = None;
                self.cursor = 0;
            }
            return Ok(n);
        }

        if self.drop_when_idle && self.expectations.is_empty() {
            self.dropped = true;
            return Err(Error::ConnectionLost);
        }
        Err(Error::Timeout)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending = None;
        self.cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.dropped
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// A [`Connector`] that hands out pre-built transports in order.
///
/// Each `connect()` pops the next scripted attempt. An attempt is either a
/// transport or a refusal; once the queue is empty every attempt is
/// refused.
#[derive(Clone, Default)]
pub struct MockConnector {
    attempts: Arc<Mutex<VecDeque<Option<MockTransport>>>>,
    count: Arc<AtomicU32>,
}

impl MockConnector {
    /// Create a connector with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection yielding `transport`.
    pub fn push(&self, transport: MockTransport) {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push_back(Some(transport));
        }
    }

    /// Queue a refused connection attempt.
    pub fn push_refusal(&self) {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push_back(None);
        }
    }

    /// Number of `connect()` calls made so far.
    pub fn attempts(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let next = self
            .attempts
            .lock()
            .ok()
            .and_then(|mut attempts| attempts.pop_front())
            .flatten();
        match next {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(Error::Transport("mock connection refused".into())),
        }
    }

    fn endpoint(&self) -> String {
        "mock".into()
    }
}
