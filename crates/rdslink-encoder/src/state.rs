//! Connection state machine for the encoder link.
//!
//! The IO task drives every transition through [`ConnectionState::on`], so
//! an illegal sequence (say, a response line while still connecting) shows
//! up as an [`InvalidTransition`] instead of silently corrupting state.
//!
//! ```text
//! Disconnected --ConnectAttempt--> Connecting --Connected--> Ready
//! Ready --CommandDequeued--> Sending --Flushed--> AwaitingResponse --ResponseLine--> Ready
//! Connecting | Sending | AwaitingResponse --IoError | Timeout--> Faulted
//! Ready --IoError--> Faulted
//! Faulted --BackoffElapsed--> Connecting
//! any --Shutdown--> Disconnected
//! ```

use std::fmt;

/// Where the encoder link currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    #[default]
    Disconnected,
    /// A TCP connect is in progress.
    Connecting,
    /// Connected and idle; the next request may be dequeued.
    Ready,
    /// Writing a command line.
    Sending,
    /// Waiting for the `OK`/`NO` line.
    AwaitingResponse,
    /// The connection failed; waiting out the backoff delay.
    Faulted,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateEvent {
    /// Starting a connection attempt.
    ConnectAttempt,
    /// The connection attempt succeeded.
    Connected,
    /// A command was taken off the request queue.
    CommandDequeued,
    /// The command bytes were written and flushed.
    Flushed,
    /// A complete response line arrived.
    ResponseLine,
    /// The socket failed or the peer went away.
    IoError,
    /// A connect or response wait ran out of time.
    Timeout,
    /// The reconnect delay is over.
    BackoffElapsed,
    /// The link is being stopped.
    Shutdown,
}

/// A transition that the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition: {event:?} in state {from}")]
pub struct InvalidTransition {
    /// State the event arrived in.
    pub from: ConnectionState,
    /// The rejected event.
    pub event: StateEvent,
}

impl ConnectionState {
    /// Apply `event`, returning the next state.
    ///
    /// ```
    /// use rdslink_encoder::state::{ConnectionState, StateEvent};
    ///
    /// let s = ConnectionState::Ready.on(StateEvent::CommandDequeued).unwrap();
    /// assert_eq!(s, ConnectionState::Sending);
    /// assert!(ConnectionState::Ready.on(StateEvent::ResponseLine).is_err());
    /// ```
    pub fn on(self, event: StateEvent) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionState::*;
        use StateEvent::*;

        let next = match (self, event) {
            (_, Shutdown) => Disconnected,
            (Disconnected, ConnectAttempt) => Connecting,
            (Connecting, Connected) => Ready,
            (Ready, CommandDequeued) => Sending,
            (Sending, Flushed) => AwaitingResponse,
            (AwaitingResponse, ResponseLine) => Ready,
            (Connecting | Sending | AwaitingResponse, IoError | Timeout) => Faulted,
            (Ready, IoError) => Faulted,
            (Faulted, BackoffElapsed) => Connecting,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// Whether a request can be dequeued now.
    pub fn is_ready(&self) -> bool {
        *self == ConnectionState::Ready
    }

    /// Whether a TCP session is currently open.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Ready | ConnectionState::Sending | ConnectionState::AwaitingResponse
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Sending => "sending",
            ConnectionState::AwaitingResponse => "awaiting-response",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::StateEvent::*;
    use super::*;

    const ALL_STATES: [ConnectionState; 6] =
        [Disconnected, Connecting, Ready, Sending, AwaitingResponse, Faulted];

    const ALL_EVENTS: [StateEvent; 9] = [
        ConnectAttempt,
        Connected,
        CommandDequeued,
        Flushed,
        ResponseLine,
        IoError,
        Timeout,
        BackoffElapsed,
        Shutdown,
    ];

    #[test]
    fn happy_path_round_trip() {
        let mut s = Disconnected;
        for event in [ConnectAttempt, Connected, CommandDequeued, Flushed, ResponseLine] {
            s = s.on(event).unwrap();
        }
        assert_eq!(s, Ready);
    }

    #[test]
    fn faults_from_active_states() {
        for from in [Connecting, Sending, AwaitingResponse] {
            assert_eq!(from.on(IoError), Ok(Faulted));
            assert_eq!(from.on(Timeout), Ok(Faulted));
        }
        assert_eq!(Ready.on(IoError), Ok(Faulted));
    }

    #[test]
    fn ready_does_not_time_out() {
        assert!(Ready.on(Timeout).is_err());
    }

    #[test]
    fn faulted_reconnects_after_backoff() {
        assert_eq!(Faulted.on(BackoffElapsed), Ok(Connecting));
        assert!(Faulted.on(Connected).is_err());
    }

    #[test]
    fn shutdown_from_anywhere() {
        for s in ALL_STATES {
            assert_eq!(s.on(Shutdown), Ok(Disconnected));
        }
    }

    #[test]
    fn requests_are_only_dequeued_when_ready() {
        for s in ALL_STATES {
            assert_eq!(s.on(CommandDequeued).is_ok(), s == Ready, "{s}");
        }
    }

    #[test]
    fn transition_table_size() {
        let allowed = ALL_STATES
            .iter()
            .flat_map(|s| ALL_EVENTS.iter().map(move |e| s.on(*e)))
            .filter(Result::is_ok)
            .count();
        // 6 shutdowns, 5 forward steps, 6 active-state faults, 1 idle fault,
        // 1 backoff.
        assert_eq!(allowed, 19);
    }

    #[test]
    fn invalid_transition_message() {
        let err = Disconnected.on(ResponseLine).unwrap_err();
        assert_eq!(err.from, Disconnected);
        assert_eq!(err.event, ResponseLine);
        assert_eq!(
            err.to_string(),
            "invalid transition: ResponseLine in state disconnected"
        );
    }

    #[test]
    fn connected_states() {
        assert!(Ready.is_connected());
        assert!(AwaitingResponse.is_connected());
        assert!(!Faulted.is_connected());
        assert!(Ready.is_ready());
        assert!(!Sending.is_ready());
    }
}
