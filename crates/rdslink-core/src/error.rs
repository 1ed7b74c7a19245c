//! Error types for rdslink.
//!
//! Fallible operations on the encoder link return [`Result<T>`], which uses
//! [`Error`] as the error type. Transport failures, protocol violations,
//! timeouts, and device rejections are all captured here.

/// The error type for encoder link operations.
///
/// The variants split into two groups that the rest of the system treats
/// very differently:
///
/// - **Connection failures** ([`Transport`](Error::Transport),
///   [`Timeout`](Error::Timeout), [`ConnectionLost`](Error::ConnectionLost),
///   [`Io`](Error::Io)) fault the connection and drive the reconnect loop.
/// - **Rejections** ([`Rejected`](Error::Rejected)) leave the connection
///   usable; the track that caused them is abandoned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP connect, socket write).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (overlong line, bad framing).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for the device to answer.
    #[error("timeout waiting for response")]
    Timeout,

    /// The device answered `NO`, or something that is neither `OK` nor `NO`.
    #[error("command {command:?} rejected by encoder: {response:?}")]
    Rejected {
        /// The command line that was refused, without its terminator.
        command: String,
        /// The exact response line received.
        response: String,
    },

    /// An invalid parameter was passed in (bad payload, bad config value).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the encoder has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the encoder was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The encoder link is shutting down and accepts no more work.
    #[error("encoder link shut down")]
    Shutdown,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the connection itself is unusable.
    ///
    /// Connection errors put the link into the `Faulted` state and start the
    /// reconnect backoff. Everything else is scoped to a single command.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Timeout
                | Error::NotConnected
                | Error::ConnectionLost
                | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
