//! Transport implementations for rdslink.
//!
//! This crate provides the concrete [`Transport`](rdslink_core::Transport)
//! used in production: [`TcpTransport`], plus the [`TcpConnector`] the
//! encoder link uses to reopen it after a fault.

pub mod tcp;

pub use tcp::{TcpConnector, TcpTransport};
