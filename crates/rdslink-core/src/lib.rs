//! rdslink-core: Core traits, types, and error definitions for rdslink.
//!
//! This crate holds the pieces every other rdslink crate agrees on: the
//! byte-level [`Transport`] and its [`Connector`] factory, the link
//! [`EncoderEvent`]s, the [`Error`] type, and the small vocabulary
//! ([`Span`], [`Field`], [`Reason`], [`Degradation`]) shared between the
//! text composer and the pipeline.

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::EncoderEvent;
pub use transport::{Connector, Transport};
pub use types::{Degradation, Field, MAX_TEXT_LEN, Reason, SEPARATOR, Span};
