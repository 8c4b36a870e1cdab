use std::{collections::HashMap, sync::Arc};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    ChainKey, ConnectionKey, Error, HmiCorrelationId, MobileCorrelationId, Result,
    chain::{ChainRecord, ChainStats, DecreaseStatus},
    mutex::{Mutex, MutexGuard},
};

/// One HMI sub-request slot: the shared record it counts against and whether
/// this leg has answered yet.
struct Leg<P> {
    record: Arc<ChainRecord<P>>,
    answered: bool,
}

/// HMI correlation id -> leg, for a single mobile request.
type HmiRequestMap<P> = HashMap<HmiCorrelationId, Leg<P>>;

struct ChainTable<P> {
    requests: HashMap<ChainKey, HmiRequestMap<P>>,
    stats: ChainStats,
}

impl<P> ChainTable<P> {
    /// Linear scan for the mobile request owning `hmi_correlation_id`.
    fn owner_of(&self, hmi_correlation_id: HmiCorrelationId) -> Option<ChainKey> {
        self.requests
            .iter()
            .find(|(_, legs)| legs.contains_key(&hmi_correlation_id))
            .map(|(key, _)| *key)
    }
}

/// In-flight fan-out state: which HMI sub-requests belong to which mobile
/// request, and how many responses each mobile request still awaits.
///
/// Conceptually a three-level map `connection -> mobile request -> HMI
/// request -> chain record`. It is stored flat, keyed by [`ChainKey`], with
/// one small map of HMI legs per mobile request. Legs that share a fan-out
/// point at the same reference-counted [`ChainRecord`].
///
/// Every operation takes a single exclusive lock, runs in time proportional
/// to the number of in-flight legs and performs no I/O. Lookups by HMI
/// correlation id scan all in-flight requests, which is cheap at the
/// cardinalities a broker sees.
///
/// # Example
///
/// ```
/// use msgchain::{DecreaseStatus, MessageChainStore};
///
/// let store = MessageChainStore::<&str>::new();
///
/// // One mobile request fans out to a UI leg (hmi 1) and a TTS leg (hmi 2).
/// let chain = store.add_message_chain(1, 100, 1, None, Some("Speak")).unwrap();
/// store.add_message_chain(1, 100, 2, Some(&chain), None).unwrap();
///
/// assert_eq!(store.decrease_message_chain(1), DecreaseStatus::Pending { remaining: 1 });
/// assert_eq!(store.decrease_message_chain(2).completed_mobile_id(), Some(100));
/// assert!(store.is_empty());
/// ```
pub struct MessageChainStore<P> {
    inner: Mutex<ChainTable<P>>,
}

impl<P> Default for MessageChainStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> MessageChainStore<P> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChainTable {
                requests: HashMap::new(),
                stats: ChainStats::default(),
            }),
        }
    }

    fn table(&self) -> MutexGuard<'_, ChainTable<P>> {
        self.inner.lock()
    }

    /// Registers `hmi_correlation_id` as a leg of a mobile request.
    ///
    /// - With `existing == None` a new [`ChainRecord`] is created for
    ///   `(connection_key, mobile_correlation_id)`, carrying `data`, and the
    ///   missing levels of the map are created on the way.
    /// - With `existing == Some(chain)` the legs already tracked for this
    ///   mobile request are searched for a record equal to `chain`; the new
    ///   id joins that shared record and its counter grows by one. `data` is
    ///   ignored on this path.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownChain`] if `existing` matches nothing tracked for
    ///   this mobile request (a stale or foreign handle).
    /// - [`Error::HmiIdInFlight`] if `hmi_correlation_id` is already
    ///   registered to an outstanding leg.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, existing, data), fields(reuse = existing.is_some()))
    )]
    pub fn add_message_chain(
        &self,
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
        hmi_correlation_id: HmiCorrelationId,
        existing: Option<&ChainRecord<P>>,
        data: Option<P>,
    ) -> Result<Arc<ChainRecord<P>>> {
        let key = ChainKey::new(connection_key, mobile_correlation_id);
        let mut table = self.table();

        if table.owner_of(hmi_correlation_id).is_some() {
            return Err(Error::HmiIdInFlight { hmi_correlation_id });
        }

        let record = match existing {
            None => {
                let record = Arc::new(ChainRecord::new(
                    connection_key,
                    mobile_correlation_id,
                    data,
                ));
                table.requests.entry(key).or_default().insert(
                    hmi_correlation_id,
                    Leg {
                        record: Arc::clone(&record),
                        answered: false,
                    },
                );
                record
            }
            Some(existing) => {
                let unknown = Error::UnknownChain {
                    connection_key,
                    mobile_correlation_id,
                };
                let legs = table.requests.get_mut(&key).ok_or(unknown.clone())?;
                let shared = legs
                    .values()
                    .find(|leg| *leg.record == *existing)
                    .map(|leg| Arc::clone(&leg.record))
                    .ok_or(unknown)?;
                let _count = shared.increment_counter();
                legs.insert(
                    hmi_correlation_id,
                    Leg {
                        record: Arc::clone(&shared),
                        answered: false,
                    },
                );
                #[cfg(feature = "tracing")]
                tracing::debug!("Mobile request {key} now awaits {_count} responses");
                shared
            }
        };

        Ok(record)
    }

    /// Feeds one HMI response into the chain it belongs to.
    ///
    /// The shared counter of the matching record is decremented. When it
    /// reaches zero the mobile request is complete: every leg tracked for
    /// it is erased, including siblings that never answered, and
    /// [`DecreaseStatus::Completed`] is returned. Their later responses
    /// come back as [`DecreaseStatus::Unmatched`].
    ///
    /// A leg answering twice still decrements the shared counter; such
    /// repeats are counted in [`ChainStats::repeated_responses`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn decrease_message_chain(&self, hmi_correlation_id: HmiCorrelationId) -> DecreaseStatus {
        let mut table = self.table();

        let Some(key) = table.owner_of(hmi_correlation_id) else {
            #[cfg(feature = "tracing")]
            tracing::debug!("No chain tracks HMI response {hmi_correlation_id}");
            return DecreaseStatus::Unmatched;
        };

        let (record, repeated) = {
            let Some(leg) = table
                .requests
                .get_mut(&key)
                .and_then(|legs| legs.get_mut(&hmi_correlation_id))
            else {
                return DecreaseStatus::Unmatched;
            };
            let repeated = leg.answered;
            leg.answered = true;
            (Arc::clone(&leg.record), repeated)
        };

        if repeated {
            table.stats.repeated_responses += 1;
            #[cfg(feature = "tracing")]
            tracing::warn!("HMI request {hmi_correlation_id} answered more than once");
        }

        match record.decrement_counter() {
            None => {
                table.stats.underflows += 1;
                #[cfg(feature = "tracing")]
                tracing::warn!("Chain for mobile request {key} decremented below zero");
                DecreaseStatus::Pending { remaining: 0 }
            }
            Some(0) => {
                let abandoned = table
                    .requests
                    .remove(&key)
                    .map_or(0, |legs| legs.values().filter(|leg| !leg.answered).count());
                table.stats.completed += 1;
                table.stats.abandoned_legs += abandoned as u64;

                #[cfg(feature = "tracing")]
                {
                    tracing::debug!(
                        "HMI response {hmi_correlation_id} is the final one for mobile request {key}"
                    );
                    if abandoned > 0 {
                        tracing::warn!(
                            "Mobile request {key} completed with {abandoned} unanswered legs"
                        );
                    }
                }

                DecreaseStatus::Completed {
                    connection_key: record.connection_key(),
                    mobile_correlation_id: record.mobile_correlation_id(),
                }
            }
            Some(remaining) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Mobile request {key} is waiting for {remaining} responses");
                DecreaseStatus::Pending { remaining }
            }
        }
    }

    /// Erases a mobile request and all of its legs, answered or not.
    ///
    /// Used for explicit cancellation, timeouts and application teardown.
    /// Returns whether the request was tracked.
    pub fn remove_mobile_request_from_message_chain(
        &self,
        mobile_correlation_id: MobileCorrelationId,
        connection_key: ConnectionKey,
    ) -> bool {
        self.take_mobile_request(ChainKey::new(connection_key, mobile_correlation_id))
            .is_some()
    }

    /// Erases a mobile request and returns one of its chain records, so the
    /// caller can still read the payload it carried. A record holding a
    /// payload is preferred over records without one.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn take_mobile_request(&self, key: ChainKey) -> Option<Arc<ChainRecord<P>>> {
        let mut table = self.table();
        let legs = table.requests.remove(&key)?;
        table.stats.cancelled += 1;

        #[cfg(feature = "tracing")]
        tracing::debug!("Dropped {} legs of mobile request {key}", legs.len());

        let mut records = legs.into_values().map(|leg| leg.record);
        let first = records.next()?;
        if first.data().is_some() {
            return Some(first);
        }
        Some(records.find(|record| record.data().is_some()).unwrap_or(first))
    }

    /// Looks up the record an HMI correlation id counts against, without
    /// touching it.
    pub fn get_message_chain(
        &self,
        hmi_correlation_id: HmiCorrelationId,
    ) -> Option<Arc<ChainRecord<P>>> {
        let table = self.table();
        table
            .requests
            .values()
            .find_map(|legs| legs.get(&hmi_correlation_id))
            .map(|leg| Arc::clone(&leg.record))
    }

    /// Erases every mobile request of a connection. Returns how many were
    /// dropped.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn remove_connection(&self, connection_key: ConnectionKey) -> usize {
        let mut table = self.table();
        let before = table.requests.len();
        table
            .requests
            .retain(|key, _| key.connection_key != connection_key);
        let removed = before - table.requests.len();
        table.stats.cancelled += removed as u64;
        removed
    }

    /// Drops all tracked state. Counters in [`ChainStats`] are kept.
    pub fn clear(&self) {
        self.table().requests.clear();
    }

    /// Returns `true` if the mobile request has at least one tracked leg.
    pub fn contains(&self, key: ChainKey) -> bool {
        self.table().requests.contains_key(&key)
    }

    /// HMI correlation ids tracked for a mobile request, in ascending order.
    pub fn hmi_ids(&self, key: ChainKey) -> Vec<HmiCorrelationId> {
        let table = self.table();
        let mut ids: Vec<_> = table
            .requests
            .get(&key)
            .map(|legs| legs.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Number of mobile requests with at least one tracked leg.
    pub fn in_flight_requests(&self) -> usize {
        self.table().requests.len()
    }

    /// Number of tracked HMI legs across all mobile requests.
    pub fn in_flight_legs(&self) -> usize {
        self.table().requests.values().map(HashMap::len).sum()
    }

    /// Returns `true` if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.table().requests.is_empty()
    }

    /// Snapshot of the store's running counters.
    pub fn stats(&self) -> ChainStats {
        self.table().stats
    }
}
