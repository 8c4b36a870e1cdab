//! The top-level manager that keeps the allocator, the chain store and the
//! request controller in step.
//!
//! Command handlers talk to a [`ChainCoordinator`] only:
//!
//! 1. [`ChainCoordinator::begin_mobile_request`] admits the mobile request.
//! 2. For each HMI leg, [`ChainCoordinator::next_hmi_correlation_id`] names
//!    it and [`ChainCoordinator::add_message_chain`] registers it.
//! 3. Each HMI response goes through [`ChainCoordinator::hmi_response`];
//!    the one that completes the chain is answered to the mobile client.
//! 4. Timeouts, cancellation and application teardown erase both the
//!    tracked request and its chain.
//!
//! Registering a leg, completing a chain, cancelling and expiring all run
//! under one lock, so a mobile request is settled exactly once: either its
//! last HMI response completes it or the timeout sweep takes it, never both.
//! A leg can only join a request that is still outstanding.

use core::time::Duration;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AtomicCorrelationIdAllocator, ChainKey, ChainRecord, ChainStats, ConnectionKey,
    CorrelationIdAllocator, DecreaseStatus, Error, HmiCorrelationId, MessageChainStore,
    MobileCorrelationId, MonotonicClock, RequestCommand, RequestController,
    RequestControllerConfig, Result, TimeSource, mutex::Mutex,
};

/// What an application teardown released.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Teardown {
    /// Outstanding mobile requests that were terminated.
    pub requests: usize,
    /// Mobile requests whose chains were erased.
    pub chains: usize,
}

/// A mobile request that timed out, with the chain record it still had (if
/// any HMI leg had been registered).
#[derive(Debug)]
pub struct ExpiredRequest<P> {
    /// The request that timed out.
    pub key: ChainKey,
    /// One record of the erased chain, for reading its payload.
    pub chain: Option<Arc<ChainRecord<P>>>,
}

/// Owns the correlation id allocator, the message chain store and the
/// request controller of one broker instance.
///
/// There is no process-wide state: two coordinators never share ids or
/// chains.
pub struct ChainCoordinator<P, A = AtomicCorrelationIdAllocator, T = MonotonicClock>
where
    A: CorrelationIdAllocator,
    T: TimeSource,
{
    allocator: A,
    chains: MessageChainStore<P>,
    requests: RequestController<T>,
    settle: Mutex<()>,
}

impl<P> ChainCoordinator<P> {
    /// Creates a coordinator with a full-range atomic allocator and a
    /// monotonic clock.
    pub fn new(config: RequestControllerConfig) -> Self {
        Self::with_parts(
            AtomicCorrelationIdAllocator::new(),
            RequestController::new(config),
        )
    }
}

impl<P, A, T> ChainCoordinator<P, A, T>
where
    A: CorrelationIdAllocator,
    T: TimeSource,
{
    /// Creates a coordinator from an explicit allocator and controller.
    pub fn with_parts(allocator: A, requests: RequestController<T>) -> Self {
        Self {
            allocator,
            chains: MessageChainStore::new(),
            requests,
            settle: Mutex::new(()),
        }
    }

    /// The message chain store.
    pub const fn chains(&self) -> &MessageChainStore<P> {
        &self.chains
    }

    /// The request controller.
    pub const fn requests(&self) -> &RequestController<T> {
        &self.requests
    }

    /// Hands out the id for the next HMI sub-request.
    pub fn next_hmi_correlation_id(&self) -> HmiCorrelationId {
        self.allocator.next_id()
    }

    /// Admits a mobile request.
    ///
    /// # Errors
    ///
    /// - [`Error::TooManyRequests`]: the application has been unregistered
    ///   (its requests and chains are gone) before this returns. The caller
    ///   should notify the client with a "too many requests" reason.
    /// - [`Error::DuplicateRequest`]: the correlation id is already
    ///   outstanding; nothing was changed.
    pub fn begin_mobile_request<C>(&self, command: &C) -> Result<()>
    where
        C: RequestCommand + ?Sized,
    {
        match self.requests.add_request(command) {
            Err(err @ Error::TooManyRequests { connection_key, .. }) => {
                let _teardown = self.unregister_application(connection_key);
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Unregistered connection {connection_key} for too many requests ({_teardown:?})"
                );
                Err(err)
            }
            other => other,
        }
    }

    /// Registers an HMI leg of an outstanding mobile request. See
    /// [`MessageChainStore::add_message_chain`].
    ///
    /// # Errors
    ///
    /// - [`Error::RequestNotTracked`]: the mobile request was never admitted
    ///   or has already timed out or been torn down. Nothing is registered.
    /// - Otherwise the same as [`MessageChainStore::add_message_chain`].
    pub fn add_message_chain(
        &self,
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
        hmi_correlation_id: HmiCorrelationId,
        existing: Option<&ChainRecord<P>>,
        data: Option<P>,
    ) -> Result<Arc<ChainRecord<P>>> {
        let _settle = self.settle.lock();
        if !self
            .requests
            .contains(ChainKey::new(connection_key, mobile_correlation_id))
        {
            return Err(Error::RequestNotTracked {
                connection_key,
                mobile_correlation_id,
            });
        }
        self.chains.add_message_chain(
            connection_key,
            mobile_correlation_id,
            hmi_correlation_id,
            existing,
            data,
        )
    }

    /// See [`MessageChainStore::get_message_chain`].
    pub fn get_message_chain(
        &self,
        hmi_correlation_id: HmiCorrelationId,
    ) -> Option<Arc<ChainRecord<P>>> {
        self.chains.get_message_chain(hmi_correlation_id)
    }

    /// See [`MessageChainStore::decrease_message_chain`]. Prefer
    /// [`Self::hmi_response`], which also settles the request controller.
    pub fn decrease_message_chain(&self, hmi_correlation_id: HmiCorrelationId) -> DecreaseStatus {
        self.chains.decrease_message_chain(hmi_correlation_id)
    }

    /// See [`MessageChainStore::remove_mobile_request_from_message_chain`].
    pub fn remove_mobile_request_from_message_chain(
        &self,
        mobile_correlation_id: MobileCorrelationId,
        connection_key: ConnectionKey,
    ) -> bool {
        self.chains
            .remove_mobile_request_from_message_chain(mobile_correlation_id, connection_key)
    }

    /// Feeds an HMI response into its chain. When the chain completes, the
    /// mobile request also stops being tracked for timeouts.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn hmi_response(&self, hmi_correlation_id: HmiCorrelationId) -> DecreaseStatus {
        let _settle = self.settle.lock();
        let status = self.chains.decrease_message_chain(hmi_correlation_id);
        if let Some(key) = status.completed_key() {
            self.requests
                .terminate_request(key.connection_key, key.mobile_correlation_id);
        }
        status
    }

    /// Marks a mobile request as answered without any HMI leg (for example
    /// a request that needed no fan-out). Returns whether it was tracked.
    pub fn finish_mobile_request(
        &self,
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
    ) -> bool {
        self.requests
            .terminate_request(connection_key, mobile_correlation_id)
    }

    /// Cancels a mobile request: its chain and its tracked request are both
    /// erased. Returns whether either existed.
    pub fn cancel_mobile_request(
        &self,
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
    ) -> bool {
        let _settle = self.settle.lock();
        let chain = self
            .chains
            .remove_mobile_request_from_message_chain(mobile_correlation_id, connection_key);
        let request = self
            .requests
            .terminate_request(connection_key, mobile_correlation_id);
        chain || request
    }

    /// Re-arms the timeout of an outstanding mobile request.
    pub fn update_request_timeout(
        &self,
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
        new_timeout: Duration,
    ) -> bool {
        self.requests
            .update_request_timeout(connection_key, mobile_correlation_id, new_timeout)
    }

    /// Takes every timed-out mobile request and erases its chain.
    pub fn expire_requests(&self) -> Vec<ExpiredRequest<P>> {
        let _settle = self.settle.lock();
        self.requests
            .take_expired()
            .into_iter()
            .map(|key| ExpiredRequest {
                key,
                chain: self.chains.take_mobile_request(key),
            })
            .collect()
    }

    /// Releases everything held for an application: its outstanding
    /// requests and every chain of its connection.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn unregister_application(&self, connection_key: ConnectionKey) -> Teardown {
        let _settle = self.settle.lock();
        Teardown {
            requests: self.requests.terminate_app_requests(connection_key),
            chains: self.chains.remove_connection(connection_key),
        }
    }

    /// Snapshot of the chain store's counters.
    pub fn stats(&self) -> ChainStats {
        self.chains.stats()
    }
}
