//! Error types for the broker runtime.
//!
//! Chain bookkeeping failures are handled where they happen and turned into
//! outbound messages; [`BrokerError`] only covers failures of the runtime
//! itself:
//!
//! - `ChannelError`: a pipeline or the outbound writer went away.
//! - `InvalidMessage`: an inbound line could not be decoded.
//! - `ServiceShutdown`: a message arrived after shutdown began.

pub type Result<T> = core::result::Result<T, BrokerError>;

/// Unified error type for the broker runtime.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum BrokerError {
    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// An inbound line was not a valid message.
    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    /// The broker is in the process of shutting down.
    #[error("Broker is shutting down")]
    ServiceShutdown,
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMessage {
            reason: err.to_string(),
        }
    }
}
