use crate::{ChainKey, ConnectionKey, MobileCorrelationId};

/// Represents the outcome of feeding one HMI response into the chain store.
///
/// This type models the result of
/// [`MessageChainStore::decrease_message_chain`]:
///
/// - [`DecreaseStatus::Completed`] means the response was the last one the
///   mobile request was waiting for. Its chain has been erased and the
///   caller should now assemble and send the mobile response.
/// - [`DecreaseStatus::Pending`] means more responses are still awaited.
/// - [`DecreaseStatus::Unmatched`] means no outstanding sub-request carries
///   this id: a late or duplicate response after completion or
///   cancellation. It is safe to ignore.
///
/// # Example
///
/// ```
/// use msgchain::{DecreaseStatus, MessageChainStore};
///
/// let store = MessageChainStore::<()>::new();
/// store.add_message_chain(1, 100, 7, None, None).unwrap();
///
/// match store.decrease_message_chain(7) {
///     DecreaseStatus::Completed { mobile_correlation_id, .. } => {
///         assert_eq!(mobile_correlation_id, 100)
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// assert_eq!(store.decrease_message_chain(7), DecreaseStatus::Unmatched);
/// ```
///
/// [`MessageChainStore::decrease_message_chain`]: crate::MessageChainStore::decrease_message_chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum DecreaseStatus {
    /// The chain reached zero and was erased together with all sibling legs.
    Completed {
        /// Connection the completed mobile request arrived on.
        connection_key: ConnectionKey,
        /// Correlation id of the completed mobile request.
        mobile_correlation_id: MobileCorrelationId,
    },
    /// The chain is still waiting for `remaining` responses.
    Pending {
        /// Responses still awaited by the shared counter.
        remaining: u32,
    },
    /// The HMI correlation id is not tracked (late, duplicate or cancelled).
    Unmatched,
}

impl DecreaseStatus {
    /// Returns `true` if this response completed its mobile request.
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Returns the completed mobile correlation id, if any.
    pub const fn completed_mobile_id(&self) -> Option<MobileCorrelationId> {
        match self {
            Self::Completed {
                mobile_correlation_id,
                ..
            } => Some(*mobile_correlation_id),
            _ => None,
        }
    }

    /// Returns the key of the completed mobile request, if any.
    pub const fn completed_key(&self) -> Option<ChainKey> {
        match self {
            Self::Completed {
                connection_key,
                mobile_correlation_id,
            } => Some(ChainKey::new(*connection_key, *mobile_correlation_id)),
            _ => None,
        }
    }
}

/// Running counters kept by a [`MessageChainStore`].
///
/// `repeated_responses` and `underflows` should stay at zero in a healthy
/// system. A non-zero value points at an HMI peer answering the same
/// sub-request twice.
///
/// [`MessageChainStore`]: crate::MessageChainStore
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainStats {
    /// Mobile requests whose chain reached zero.
    pub completed: u64,
    /// Mobile requests erased before completion (cancel, timeout, teardown).
    pub cancelled: u64,
    /// Unanswered legs dropped because a sibling chain completed first.
    pub abandoned_legs: u64,
    /// Responses for a leg that had already answered.
    pub repeated_responses: u64,
    /// Decrements attempted on a counter already at zero.
    pub underflows: u64,
}
