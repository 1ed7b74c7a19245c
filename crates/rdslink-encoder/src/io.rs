//! IO task types and implementation for the encoder link.
//!
//! This module implements the single-IO-task pattern. One tokio task owns
//! the connection exclusively: it connects, runs command/response
//! exchanges, watches the idle socket for a dropped peer, and reconnects
//! with backoff after any fault. Callers talk to it through an
//! [`EncoderHandle`].
//!
//! A submission carries every command for one track. The task sends them in
//! order and waits for `OK` after each. A `NO` or malformed reply abandons
//! the rest; a fault abandons the rest and tears the connection down. In
//! both cases the caller gets the error back and nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rdslink_core::error::{Error, Result};
use rdslink_core::events::EncoderEvent;
use rdslink_core::transport::{Connector, Transport};

use crate::backoff::Backoff;
use crate::protocol::{self, DecodeResult, EncoderCommand, Response};
use crate::state::{ConnectionState, StateEvent};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the encoder IO task.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long to wait for the `OK`/`NO` line after each command.
    pub response_timeout: Duration,
    /// First reconnect delay.
    pub backoff_initial: Duration,
    /// Largest reconnect delay.
    pub backoff_max: Duration,
    /// Randomize reconnect delays by up to 20%.
    pub backoff_jitter: bool,
    /// How long each idle read waits before checking for new requests.
    pub idle_poll: Duration,
    /// Number of submissions that may wait for the task.
    pub queue_depth: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            response_timeout: Duration::from_secs(5),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            backoff_jitter: true,
            idle_poll: Duration::from_millis(100),
            queue_depth: 16,
        }
    }
}

/// A batch of commands for one track, plus where to send the outcome.
struct Request {
    commands: Vec<EncoderCommand>,
    /// Fired when the IO task takes the request off the queue.
    started: oneshot::Sender<()>,
    reply: oneshot::Sender<Result<()>>,
}

/// Handle to the IO task.
pub struct EncoderHandle {
    tx: mpsc::Sender<Request>,
    state_rx: watch::Receiver<ConnectionState>,
    event_tx: broadcast::Sender<EncoderEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EncoderHandle {
    /// Send the commands for one track and wait for the outcome.
    ///
    /// The request waits in the queue until the link is `Ready`, so during
    /// an outage this suspends until the connection is back. Returns
    /// `Ok(())` when every command got `OK`, [`Error::Rejected`] for a `NO`
    /// or malformed reply, a connection error if the link faulted mid-way,
    /// and [`Error::Shutdown`] if the link stopped first.
    pub async fn submit(&self, commands: Vec<EncoderCommand>) -> Result<()> {
        self.submit_until(commands, &CancellationToken::new()).await
    }

    /// Like [`submit`](Self::submit), but gives up with [`Error::Shutdown`]
    /// if `cancel` fires while the request is still queued.
    ///
    /// Once the IO task has taken the request, `cancel` is ignored and the
    /// commands run to their outcome. A withdrawn request is never sent.
    pub async fn submit_until(
        &self,
        commands: Vec<EncoderCommand>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let (started_tx, mut started_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request {
            commands,
            started: started_tx,
            reply: reply_tx,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Shutdown),
            sent = self.tx.send(request) => sent.map_err(|_| Error::Shutdown)?,
        }

        tokio::select! {
            biased;
            // A dropped sender means the task failed the request; the reply
            // below says how.
            _ = &mut started_rx => {}
            _ = cancel.cancelled() => {
                debug!("submission withdrawn while queued");
                return Err(Error::Shutdown);
            }
        }

        reply_rx.await.unwrap_or(Err(Error::Shutdown))
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until the link reaches `target`. Returns `false` on timeout.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.state_rx.clone();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        )
    }

    /// Subscribe to link events.
    pub fn subscribe(&self) -> broadcast::Receiver<EncoderEvent> {
        self.event_tx.subscribe()
    }

    /// Stop the IO task and wait for it to exit.
    ///
    /// An exchange already in progress runs to completion first. Queued
    /// submissions fail with [`Error::Shutdown`].
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the handle for submitting commands.
///
/// The task starts connecting immediately and keeps the connection up for
/// as long as the handle lives. Must be called inside a tokio runtime.
pub fn spawn_io_task(connector: Arc<dyn Connector>, config: LinkConfig) -> EncoderHandle {
    let (tx, rx) = mpsc::channel::<Request>(config.queue_depth.max(1));
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let (event_tx, _) = broadcast::channel(64);
    let cancel = CancellationToken::new();

    let task = tokio::spawn(io_loop(
        connector,
        config,
        rx,
        StateTracker::new(state_tx),
        event_tx.clone(),
        cancel.clone(),
    ));

    EncoderHandle {
        tx,
        state_rx,
        event_tx,
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// Maximum buffered response bytes before the line is declared malformed.
/// Replies are four bytes; 1024 is generous headroom.
const MAX_BUF: usize = 1024;

/// Applies state machine events and publishes the result.
struct StateTracker {
    state: ConnectionState,
    tx: watch::Sender<ConnectionState>,
}

impl StateTracker {
    fn new(tx: watch::Sender<ConnectionState>) -> Self {
        StateTracker {
            state: ConnectionState::Disconnected,
            tx,
        }
    }

    fn apply(&mut self, event: StateEvent) {
        match self.state.on(event) {
            Ok(next) => {
                if next != self.state {
                    debug!(from = %self.state, to = %next, ?event, "encoder link state");
                    self.state = next;
                    self.tx.send_replace(next);
                }
            }
            Err(e) => tracing::error!(error = %e, "encoder link state machine violated"),
        }
    }

    /// Record a connection failure as the matching event.
    fn fault(&mut self, error: &Error) {
        let event = match error {
            Error::Timeout => StateEvent::Timeout,
            _ => StateEvent::IoError,
        };
        self.apply(event);
    }
}

/// How a connected session ended.
enum SessionEnd {
    Faulted,
    Shutdown,
}

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Alternates between connecting (with backoff after failures) and running
/// a session on the open connection until it faults or the link is
/// cancelled.
async fn io_loop(
    connector: Arc<dyn Connector>,
    config: LinkConfig,
    mut rx: mpsc::Receiver<Request>,
    mut state: StateTracker,
    event_tx: broadcast::Sender<EncoderEvent>,
    cancel: CancellationToken,
) {
    let endpoint = connector.endpoint();
    let mut backoff = Backoff::new(config.backoff_initial, config.backoff_max)
        .with_jitter(config.backoff_jitter);

    loop {
        if state.state == ConnectionState::Disconnected {
            state.apply(StateEvent::ConnectAttempt);
        }

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connector.connect() => result,
        };

        match connected {
            Ok(mut transport) => {
                state.apply(StateEvent::Connected);
                backoff.reset();
                info!(endpoint = %endpoint, "Connected to encoder");
                let _ = event_tx.send(EncoderEvent::Connected {
                    endpoint: endpoint.clone(),
                });

                let end = run_session(&mut *transport, &config, &mut rx, &mut state, &event_tx, &cancel)
                    .await;
                let _ = transport.close().await;
                let _ = event_tx.send(EncoderEvent::Disconnected);
                if let SessionEnd::Shutdown = end {
                    break;
                }
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Failed to connect to encoder");
                state.fault(&e);
            }
        }

        let delay = backoff.next_delay();
        let attempt = backoff.attempt();
        info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting to encoder");
        let _ = event_tx.send(EncoderEvent::Reconnecting { attempt, delay });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        state.apply(StateEvent::BackoffElapsed);
    }

    state.apply(StateEvent::Shutdown);
    debug!("encoder IO task stopped");

    // Fail whatever is still queued.
    rx.close();
    while let Some(req) = rx.recv().await {
        let _ = req.reply.send(Err(Error::Shutdown));
    }
}

/// Serve requests on one open connection until it faults or the link stops.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Queued submissions
/// 3. Idle reads that detect a dropped peer
async fn run_session(
    transport: &mut dyn Transport,
    config: &LinkConfig,
    rx: &mut mpsc::Receiver<Request>,
    state: &mut StateTracker,
    event_tx: &broadcast::Sender<EncoderEvent>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("encoder IO task cancelled");
                return SessionEnd::Shutdown;
            }

            req = rx.recv() => {
                let Some(req) = req else {
                    debug!("request channel closed, exiting IO task");
                    return SessionEnd::Shutdown;
                };
                if req.started.send(()).is_err() {
                    debug!("skipping withdrawn submission");
                    continue;
                }
                let result = execute(transport, &req.commands, &mut buf, config, state, event_tx).await;
                // Anything but a rejection leaves the connection unusable.
                let faulted = matches!(&result, Err(e) if !matches!(e, Error::Rejected { .. }));
                let _ = req.reply.send(result);
                if faulted {
                    return SessionEnd::Faulted;
                }
            }

            idle = idle_read(transport, &mut buf, config.idle_poll) => {
                if let Err(e) = idle {
                    warn!(error = %e, "Encoder connection lost while idle");
                    state.fault(&e);
                    return SessionEnd::Faulted;
                }
            }
        }
    }
}

/// Read whatever the encoder sends unprompted.
///
/// Stray bytes are kept until the next command clears them. A timeout is
/// normal; anything else means the connection is gone.
async fn idle_read(transport: &mut dyn Transport, buf: &mut Vec<u8>, poll: Duration) -> Result<()> {
    let mut chunk = [0u8; 256];
    match transport.receive(&mut chunk, poll).await {
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            if buf.len() > MAX_BUF {
                warn!(len = buf.len(), "idle buffer overflow, resetting");
                buf.clear();
            }
            Ok(())
        }
        Err(Error::Timeout) => {
            // Yield briefly so the loop can check for requests or
            // cancellation.
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Command execution
// ---------------------------------------------------------------------------

/// Run one submission's commands in order.
async fn execute(
    transport: &mut dyn Transport,
    commands: &[EncoderCommand],
    buf: &mut Vec<u8>,
    config: &LinkConfig,
    state: &mut StateTracker,
    event_tx: &broadcast::Sender<EncoderEvent>,
) -> Result<()> {
    for cmd in commands {
        state.apply(StateEvent::CommandDequeued);

        if !buf.is_empty() {
            debug!(
                stale = %String::from_utf8_lossy(buf).escape_debug(),
                "discarding unsolicited encoder output"
            );
            buf.clear();
        }

        let line = cmd.line();
        info!(command = %line, "Sending to encoder");
        if let Err(e) = transport.send(&cmd.encode()).await {
            warn!(command = %line, error = %e, "Failed to send to encoder");
            state.fault(&e);
            return Err(e);
        }
        state.apply(StateEvent::Flushed);

        let response = match read_response(transport, buf, config.response_timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!(command = %line, error = %e, "No response from encoder");
                state.fault(&e);
                return Err(e);
            }
        };
        state.apply(StateEvent::ResponseLine);

        match response {
            Response::Ok => {
                debug!(command = %line, "Encoder accepted command");
                let _ = event_tx.send(EncoderEvent::Accepted { command: line });
            }
            other => {
                let response = other.as_str().to_string();
                warn!(command = %line, response = %response, "Encoder rejected command");
                let _ = event_tx.send(EncoderEvent::Rejected {
                    command: line.clone(),
                    response: response.clone(),
                });
                return Err(Error::Rejected {
                    command: line,
                    response,
                });
            }
        }
    }
    Ok(())
}

/// Read until one complete response line arrives or `timeout` passes.
async fn read_response(
    transport: &mut dyn Transport,
    buf: &mut Vec<u8>,
    timeout: Duration,
) -> Result<Response> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut chunk = [0u8; 256];

    loop {
        loop {
            match protocol::decode_response(buf) {
                DecodeResult::Response { response, consumed } => {
                    buf.drain(..consumed);
                    return Ok(response);
                }
                DecodeResult::Blank(consumed) => {
                    buf.drain(..consumed);
                }
                DecodeResult::Incomplete => break,
            }
        }

        // Some units answer with a bare `OK` and no terminator.
        if let Some(response) = protocol::decode_unterminated(buf) {
            buf.clear();
            return Ok(response);
        }

        // Bounded buffer: a line this long is not an acknowledgement.
        if buf.len() > MAX_BUF {
            let preview = String::from_utf8_lossy(&buf[..32]).into_owned();
            buf.clear();
            return Ok(Response::Malformed(preview));
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Err(Error::Timeout);
        }
        let n = transport.receive(&mut chunk, deadline - now).await?;
        buf.extend_from_slice(&chunk[..n]);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
