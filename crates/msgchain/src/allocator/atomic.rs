use portable_atomic::{AtomicU32, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    HmiCorrelationId,
    allocator::{CorrelationIdAllocator, DEFAULT_MAX_HMI_CORRELATION_ID, advance},
};

/// A lock-free correlation id allocator suitable for multi-threaded
/// environments.
///
/// The counter lives in a single [`AtomicU32`], so concurrent callers on
/// different dispatch threads never block each other and never contend with
/// the chain store's lock.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Wait-free on targets with native 32-bit atomics
///
/// ## Recommended When
/// - Several command-dispatch threads allocate ids concurrently
/// - You want the default allocator of [`ChainCoordinator`]
///
/// ## See Also
/// - [`LockCorrelationIdAllocator`]
///
/// [`ChainCoordinator`]: crate::ChainCoordinator
/// [`LockCorrelationIdAllocator`]: crate::LockCorrelationIdAllocator
#[derive(Debug)]
pub struct AtomicCorrelationIdAllocator {
    #[cfg(feature = "cache-padded")]
    current: crossbeam_utils::CachePadded<AtomicU32>,
    #[cfg(not(feature = "cache-padded"))]
    current: AtomicU32,
    max: HmiCorrelationId,
}

impl Default for AtomicCorrelationIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicCorrelationIdAllocator {
    /// Creates an allocator spanning the full `u32` range.
    ///
    /// # Example
    /// ```
    /// use msgchain::AtomicCorrelationIdAllocator;
    ///
    /// let allocator = AtomicCorrelationIdAllocator::new();
    /// assert_eq!(allocator.next_id(), 1);
    /// assert_eq!(allocator.next_id(), 2);
    /// ```
    pub fn new() -> Self {
        Self::with_max(DEFAULT_MAX_HMI_CORRELATION_ID)
    }

    /// Creates an allocator that wraps to `0` after handing out `max`.
    ///
    /// # Example
    /// ```
    /// use msgchain::AtomicCorrelationIdAllocator;
    ///
    /// let allocator = AtomicCorrelationIdAllocator::with_max(2);
    /// let ids: Vec<_> = (0..4).map(|_| allocator.next_id()).collect();
    /// assert_eq!(ids, [1, 2, 0, 1]);
    /// ```
    pub fn with_max(max: HmiCorrelationId) -> Self {
        Self::from_current(0, max)
    }

    /// Creates an allocator whose last handed-out id is `current`.
    ///
    /// This is primarily useful for restoring allocator state or for tests
    /// that need to start close to the ceiling. A `current` above `max` is
    /// clamped so the next call wraps to `0`.
    pub fn from_current(current: HmiCorrelationId, max: HmiCorrelationId) -> Self {
        let current = current.min(max);
        Self {
            #[cfg(feature = "cache-padded")]
            current: crossbeam_utils::CachePadded::new(AtomicU32::new(current)),
            #[cfg(not(feature = "cache-padded"))]
            current: AtomicU32::new(current),
            max,
        }
    }

    /// Returns the next correlation id.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_id(&self) -> HmiCorrelationId {
        let max = self.max;
        let previous = match self
            .current
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(advance(current, max))
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        advance(previous, max)
    }

    /// Returns the id handed out most recently (or the starting value).
    pub fn current(&self) -> HmiCorrelationId {
        self.current.load(Ordering::Relaxed)
    }

    /// Returns the ceiling of this allocator.
    pub const fn max_id(&self) -> HmiCorrelationId {
        self.max
    }
}

impl CorrelationIdAllocator for AtomicCorrelationIdAllocator {
    fn next_id(&self) -> HmiCorrelationId {
        self.next_id()
    }

    fn max_id(&self) -> HmiCorrelationId {
        self.max_id()
    }
}
