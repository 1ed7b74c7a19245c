//! Transport traits for encoder communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to an RDS encoder.
//! The production implementation is a TCP socket (`rdslink-transport`); the
//! `rdslink-test-harness` crate provides a scripted mock for unit tests.
//!
//! Because the encoder link reconnects on its own, it does not hold a single
//! transport for its whole life. It holds a [`Connector`] instead and asks it
//! for a fresh [`Transport`] every time the connection has to be rebuilt.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to an encoder.
///
/// Implementations handle the physical link only. Line framing and the
/// `OK`/`NO` handshake live in the protocol layer that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the encoder.
    ///
    /// Implementations should not return until every byte has been handed
    /// to the OS and flushed.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the encoder into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout`; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing arrives
    /// and [`Error::ConnectionLost`](crate::error::Error::ConnectionLost) if
    /// the peer closed the connection.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Factory for fresh [`Transport`]s.
///
/// Called once at startup and again after every fault. Each call performs a
/// complete connection attempt (TCP handshake included) and either returns a
/// ready transport or the error that prevented it.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection to the encoder.
    async fn connect(&self) -> Result<Box<dyn Transport>>;

    /// Human-readable description of the endpoint, for logs.
    fn endpoint(&self) -> String;
}
