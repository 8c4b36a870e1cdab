//! Pipelines that drive the dispatcher.
//!
//! ## Structure
//!
//! - [`manager`] - [`manager::Broker`], spawning and shutting down the tasks.
//! - [`worker`] - the per-direction pipeline loop and the timeout sweeper.

use crate::broker::message::Inbound;
use tokio::sync::oneshot;

pub mod manager;
pub mod worker;

#[cfg(test)]
mod tests;

/// Work item sent to a pipeline task.
#[derive(Debug)]
pub enum PipelineRequest {
    /// Dispatch one inbound message.
    Dispatch { message: Inbound },
    /// Stop after acknowledging on `response`.
    Shutdown { response: oneshot::Sender<()> },
}
