//! Broker runtime: configuration, wire messages, dispatch and the tasks that
//! drive it.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env configuration.
//! - [`dispatch`] - turns inbound messages into outbound ones.
//! - [`error`] - runtime error type.
//! - [`message`] - wire format.
//! - [`pool`] - pipelines, sweeper and shutdown.
//! - [`stream`] - stdin/stdout line I/O.
//! - [`telemetry`] - log output.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod pool;
pub mod stream;
pub mod telemetry;
