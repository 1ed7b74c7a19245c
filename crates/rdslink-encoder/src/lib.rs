//! rdslink-encoder: the persistent connection to an RDS encoder.
//!
//! One background task owns the TCP session, sends `TEXT=` and `RT+TAG=`
//! lines, checks each `OK`/`NO` reply, and reconnects with exponential
//! backoff whenever the connection fails. Callers hold an
//! [`EncoderHandle`] and submit the commands for one track at a time.
//!
//! - [`protocol`]: command encoding and response decoding
//! - [`state`]: the connection state machine
//! - [`backoff`]: reconnect delay policy
//! - [`io`]: the IO task and its handle
//! - [`builder`]: configuration and startup

pub mod backoff;
pub mod builder;
pub mod io;
pub mod protocol;
pub mod state;

pub use backoff::Backoff;
pub use builder::EncoderBuilder;
pub use io::{EncoderHandle, LinkConfig, spawn_io_task};
pub use protocol::{CommandVerb, EncoderCommand, Response};
pub use state::{ConnectionState, InvalidTransition, StateEvent};
