//! Asynchronous encoder link events.
//!
//! Events are emitted by the encoder IO task through a
//! [`tokio::sync::broadcast`] channel. Health checks and the binary's status
//! logging subscribe to them; nothing in the track path depends on them.

use std::time::Duration;

/// An event emitted by the encoder IO task.
///
/// Delivery is best effort through a bounded broadcast channel; a slow
/// subscriber may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// The TCP session to the encoder was established.
    Connected {
        /// The endpoint that accepted the connection.
        endpoint: String,
    },

    /// The connection was lost or closed.
    Disconnected,

    /// A reconnect attempt is scheduled.
    Reconnecting {
        /// The reconnection attempt number (1-based).
        attempt: u32,
        /// How long the task waits before trying.
        delay: Duration,
    },

    /// The encoder accepted a command line with `OK`.
    Accepted {
        /// The command line, without its terminator.
        command: String,
    },

    /// The encoder refused a command line (`NO` or a malformed reply).
    Rejected {
        /// The command line, without its terminator.
        command: String,
        /// The response line that was received.
        response: String,
    },
}
