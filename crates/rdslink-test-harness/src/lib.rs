//! rdslink-test-harness: test utilities for the encoder link.
//!
//! This crate provides [`MockTransport`] and [`MockConnector`] for
//! deterministic unit testing of the encoder IO task without a socket, and
//! [`MockEncoderServer`] for end-to-end tests over real TCP.

pub mod mock_encoder;
pub mod mock_transport;

pub use mock_encoder::{MockEncoderServer, Reply};
pub use mock_transport::{MockConnector, MockTransport, SentLog};
