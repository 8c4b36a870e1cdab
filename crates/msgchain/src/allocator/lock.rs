#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    HmiCorrelationId,
    allocator::{CorrelationIdAllocator, DEFAULT_MAX_HMI_CORRELATION_ID, advance},
    mutex::Mutex,
};

/// A lock-based correlation id allocator.
///
/// The counter is wrapped in a [`Mutex`], which gives strictly fair access
/// across threads at the price of a short critical section per id.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Works on targets without native 32-bit atomics
///
/// ## Recommended When
/// - Fair access across threads is important
/// - Your target doesn't support atomics
///
/// ## See Also
/// - [`AtomicCorrelationIdAllocator`]
///
/// [`AtomicCorrelationIdAllocator`]: crate::AtomicCorrelationIdAllocator
#[derive(Debug)]
pub struct LockCorrelationIdAllocator {
    current: Mutex<HmiCorrelationId>,
    max: HmiCorrelationId,
}

impl Default for LockCorrelationIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl LockCorrelationIdAllocator {
    /// Creates an allocator spanning the full `u32` range.
    pub fn new() -> Self {
        Self::with_max(DEFAULT_MAX_HMI_CORRELATION_ID)
    }

    /// Creates an allocator that wraps to `0` after handing out `max`.
    pub fn with_max(max: HmiCorrelationId) -> Self {
        Self::from_current(0, max)
    }

    /// Creates an allocator whose last handed-out id is `current`.
    pub fn from_current(current: HmiCorrelationId, max: HmiCorrelationId) -> Self {
        Self {
            current: Mutex::new(current.min(max)),
            max,
        }
    }

    /// Returns the next correlation id.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_id(&self) -> HmiCorrelationId {
        let mut current = self.current.lock();
        *current = advance(*current, self.max);
        *current
    }

    /// Returns the id handed out most recently (or the starting value).
    pub fn current(&self) -> HmiCorrelationId {
        *self.current.lock()
    }

    /// Returns the ceiling of this allocator.
    pub const fn max_id(&self) -> HmiCorrelationId {
        self.max
    }
}

impl CorrelationIdAllocator for LockCorrelationIdAllocator {
    fn next_id(&self) -> HmiCorrelationId {
        self.next_id()
    }

    fn max_id(&self) -> HmiCorrelationId {
        self.max_id()
    }
}
