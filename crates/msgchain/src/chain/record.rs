use core::fmt;

use portable_atomic::{AtomicU32, Ordering};

use crate::{ChainKey, ConnectionKey, MobileCorrelationId};

/// Per-fan-out state shared by every HMI leg of one mobile request.
///
/// A record is created by [`MessageChainStore::add_message_chain`] with a
/// pending-response count of one. Each leg that joins it through chain
/// re-use adds one more expected response, so a record shared by `N` legs
/// completes after `N` decrements.
///
/// Records are handed out as `Arc<ChainRecord<P>>`. The store owns the
/// authoritative references; handles held by callers stay valid after the
/// store drops its copies, but are no longer reachable by id.
///
/// Equality compares the identifying fields and the current counter, never
/// the payload or the allocation. Two records created independently with
/// the same connection, correlation id and counter compare equal.
///
/// [`MessageChainStore::add_message_chain`]: crate::MessageChainStore::add_message_chain
pub struct ChainRecord<P> {
    connection_key: ConnectionKey,
    mobile_correlation_id: MobileCorrelationId,
    // Only mutated while the owning store's lock is held.
    counter: AtomicU32,
    data: Option<P>,
}

impl<P> ChainRecord<P> {
    /// Creates a record awaiting a single response.
    pub fn new(
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
        data: Option<P>,
    ) -> Self {
        Self {
            connection_key,
            mobile_correlation_id,
            counter: AtomicU32::new(1),
            data,
        }
    }

    /// Connection the owning mobile request arrived on.
    pub const fn connection_key(&self) -> ConnectionKey {
        self.connection_key
    }

    /// Correlation id of the owning mobile request.
    pub const fn mobile_correlation_id(&self) -> MobileCorrelationId {
        self.mobile_correlation_id
    }

    /// Composite key of the owning mobile request.
    pub const fn key(&self) -> ChainKey {
        ChainKey::new(self.connection_key, self.mobile_correlation_id)
    }

    /// Number of HMI responses still awaited.
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Payload snapshot attached when the chain was created.
    pub const fn data(&self) -> Option<&P> {
        self.data.as_ref()
    }

    pub(crate) fn increment_counter(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the new count, or `None` if the counter was already zero.
    pub(crate) fn decrement_counter(&self) -> Option<u32> {
        self.counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }
}

impl<P> PartialEq for ChainRecord<P> {
    fn eq(&self, other: &Self) -> bool {
        self.connection_key == other.connection_key
            && self.mobile_correlation_id == other.mobile_correlation_id
            && self.counter() == other.counter()
    }
}

impl<P> Eq for ChainRecord<P> {}

impl<P: fmt::Debug> fmt::Debug for ChainRecord<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainRecord")
            .field("connection_key", &self.connection_key)
            .field("mobile_correlation_id", &self.mobile_correlation_id)
            .field("counter", &self.counter())
            .field("data", &self.data)
            .finish()
    }
}
