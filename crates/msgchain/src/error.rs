//! Error types for the chaining core.
//!
//! Only caller misuse and capacity violations are errors. Lookups that miss
//! (late or duplicate HMI responses, already-cancelled requests) are normal
//! traffic and are reported as values: [`crate::DecreaseStatus::Unmatched`]
//! or `None`.
//!
//! ## Error Cases
//! - `UnknownChain`: a chain re-use was requested with a handle the store
//!   does not hold.
//! - `HmiIdInFlight`: an HMI correlation id was registered while a previous
//!   sub-request with the same id is still outstanding.
//! - `TooManyRequests`: a connection exceeded its outstanding-request cap.
//! - `DuplicateRequest`: a mobile correlation id was reused on a connection
//!   while the first request is still outstanding.
//! - `RequestNotTracked`: an HMI leg was registered for a mobile request
//!   that is no longer outstanding (it timed out or was torn down).

use crate::{ConnectionKey, HmiCorrelationId, MobileCorrelationId};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors the chaining core can report.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The chain handle passed for re-use does not match any chain tracked
    /// for this mobile request. This is a programming error in the caller
    /// and should not be retried.
    #[error(
        "no chain tracked for mobile request {mobile_correlation_id} on connection {connection_key}"
    )]
    UnknownChain {
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
    },

    /// The HMI correlation id is already bound to an outstanding sub-request.
    #[error("HMI correlation id {hmi_correlation_id} is already in flight")]
    HmiIdInFlight { hmi_correlation_id: HmiCorrelationId },

    /// The connection already has `limit` outstanding requests.
    #[error("connection {connection_key} exceeded {limit} outstanding requests")]
    TooManyRequests {
        connection_key: ConnectionKey,
        limit: usize,
    },

    /// The mobile correlation id is already outstanding on this connection.
    #[error(
        "mobile request {mobile_correlation_id} is already outstanding on connection {connection_key}"
    )]
    DuplicateRequest {
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
    },

    /// The mobile request is not outstanding any more, so no leg can join
    /// it. Whoever ended it has already answered the client.
    #[error(
        "mobile request {mobile_correlation_id} is not outstanding on connection {connection_key}"
    )]
    RequestNotTracked {
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
    },
}

impl Error {
    /// Returns `true` for errors that signal a bug in the calling code rather
    /// than a runtime condition.
    pub const fn is_caller_misuse(&self) -> bool {
        matches!(self, Self::UnknownChain { .. } | Self::HmiIdInFlight { .. })
    }
}
