use crate::HmiCorrelationId;

/// The default ceiling of every allocator: the full `u32` range, matching
/// the width of an HMI correlation id.
pub const DEFAULT_MAX_HMI_CORRELATION_ID: HmiCorrelationId = HmiCorrelationId::MAX;

/// A minimal interface for handing out HMI correlation ids.
///
/// Implementations return values in `[0, max_id()]`. The counter is
/// incremented before it is read, so a fresh allocator hands out `1` first;
/// once the ceiling has been returned the next call wraps to `0`.
///
/// Ids are not checked against sub-requests still in flight after a full
/// wrap. The chain store rejects such collisions on registration instead.
pub trait CorrelationIdAllocator: Send + Sync {
    /// Returns the next correlation id, wrapping to `0` past the ceiling.
    fn next_id(&self) -> HmiCorrelationId;

    /// Returns the largest id this allocator hands out.
    fn max_id(&self) -> HmiCorrelationId;
}

/// Computes the id that follows `current` under the wrap-at-`max` rule.
#[inline]
pub(crate) const fn advance(current: HmiCorrelationId, max: HmiCorrelationId) -> HmiCorrelationId {
    if current < max { current + 1 } else { 0 }
}
