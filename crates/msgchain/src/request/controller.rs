use core::time::Duration;
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    ChainKey, ConnectionKey, Error, MobileCorrelationId, MonotonicClock, Result, TimeSource,
    mutex::Mutex,
};

/// Default cap on outstanding requests per connection.
pub const DEFAULT_MAX_REQUESTS_PER_CONNECTION: usize = 1000;

/// Default time a mobile request may stay outstanding.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The view of a mobile command the request controller needs.
///
/// Commands implement this so the controller can track them without knowing
/// their payload or wire format.
pub trait RequestCommand {
    /// Connection the command arrived on.
    fn connection_key(&self) -> ConnectionKey;

    /// Correlation id assigned by the mobile client.
    fn correlation_id(&self) -> MobileCorrelationId;

    /// Per-command timeout. `None` falls back to the controller's default.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

impl RequestCommand for ChainKey {
    fn connection_key(&self) -> ConnectionKey {
        self.connection_key
    }

    fn correlation_id(&self) -> MobileCorrelationId {
        self.mobile_correlation_id
    }
}

/// Limits applied by a [`RequestController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestControllerConfig {
    /// Outstanding requests allowed per connection before admission fails.
    pub max_requests_per_connection: usize,
    /// Timeout for commands that do not carry their own. Zero disables
    /// expiry.
    pub default_timeout: Duration,
}

impl Default for RequestControllerConfig {
    fn default() -> Self {
        Self {
            max_requests_per_connection: DEFAULT_MAX_REQUESTS_PER_CONNECTION,
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedRequest {
    /// Absolute deadline in clock milliseconds; `None` never expires.
    deadline: Option<u64>,
}

/// Tracks outstanding mobile requests for admission control and timeouts.
///
/// The controller is a sibling of the chain store: it knows which mobile
/// requests are outstanding and when they expire, but nothing about their
/// HMI legs. [`ChainCoordinator`] keeps the two in step.
///
/// [`ChainCoordinator`]: crate::ChainCoordinator
pub struct RequestController<T: TimeSource = MonotonicClock> {
    config: RequestControllerConfig,
    clock: T,
    requests: Mutex<HashMap<ChainKey, TrackedRequest>>,
}

impl RequestController<MonotonicClock> {
    /// Creates a controller reading time from a fresh [`MonotonicClock`].
    pub fn new(config: RequestControllerConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<T: TimeSource> RequestController<T> {
    /// Creates a controller reading time from `clock`.
    pub fn with_clock(config: RequestControllerConfig, clock: T) -> Self {
        Self {
            config,
            clock,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// The limits this controller enforces.
    pub const fn config(&self) -> &RequestControllerConfig {
        &self.config
    }

    fn deadline_after(&self, timeout: Duration) -> Option<u64> {
        if timeout.is_zero() {
            return None;
        }
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Some(self.clock.current_millis().saturating_add(millis))
    }

    /// Starts tracking a mobile request.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateRequest`] if the same correlation id is already
    ///   outstanding on this connection.
    /// - [`Error::TooManyRequests`] if the connection already has
    ///   `max_requests_per_connection` outstanding requests. The caller is
    ///   expected to unregister the application.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(
            connection_key = command.connection_key(),
            correlation_id = command.correlation_id(),
        ))
    )]
    pub fn add_request<C>(&self, command: &C) -> Result<()>
    where
        C: RequestCommand + ?Sized,
    {
        let key = ChainKey::new(command.connection_key(), command.correlation_id());
        let timeout = command.timeout().unwrap_or(self.config.default_timeout);
        let deadline = self.deadline_after(timeout);

        let mut requests = self.requests.lock();
        if requests.contains_key(&key) {
            return Err(Error::DuplicateRequest {
                connection_key: key.connection_key,
                mobile_correlation_id: key.mobile_correlation_id,
            });
        }

        let limit = self.config.max_requests_per_connection;
        let outstanding = requests
            .keys()
            .filter(|tracked| tracked.connection_key == key.connection_key)
            .count();
        if outstanding >= limit {
            #[cfg(feature = "tracing")]
            tracing::warn!("Connection {} hit the limit of {limit} requests", key.connection_key);
            return Err(Error::TooManyRequests {
                connection_key: key.connection_key,
                limit,
            });
        }

        requests.insert(key, TrackedRequest { deadline });
        Ok(())
    }

    /// Stops tracking one mobile request. Returns whether it was tracked.
    pub fn terminate_request(
        &self,
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
    ) -> bool {
        self.requests
            .lock()
            .remove(&ChainKey::new(connection_key, mobile_correlation_id))
            .is_some()
    }

    /// Stops tracking every request of an application. Returns how many were
    /// dropped.
    pub fn terminate_app_requests(&self, connection_key: ConnectionKey) -> usize {
        let mut requests = self.requests.lock();
        let before = requests.len();
        requests.retain(|key, _| key.connection_key != connection_key);
        let removed = before - requests.len();

        #[cfg(feature = "tracing")]
        tracing::debug!("Terminated {removed} requests of connection {connection_key}");

        removed
    }

    /// Re-arms a request's deadline to `new_timeout` from now. A zero
    /// timeout disables expiry. Returns whether the request was tracked.
    pub fn update_request_timeout(
        &self,
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
        new_timeout: Duration,
    ) -> bool {
        let deadline = self.deadline_after(new_timeout);
        match self
            .requests
            .lock()
            .get_mut(&ChainKey::new(connection_key, mobile_correlation_id))
        {
            Some(tracked) => {
                tracked.deadline = deadline;
                true
            }
            None => false,
        }
    }

    /// Removes and returns every request whose deadline has passed, ordered
    /// by key.
    pub fn take_expired(&self) -> Vec<ChainKey> {
        let now = self.clock.current_millis();
        let mut requests = self.requests.lock();

        let mut expired: Vec<ChainKey> = requests
            .iter()
            .filter(|(_, tracked)| tracked.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            requests.remove(key);
        }
        expired.sort_unstable();

        #[cfg(feature = "tracing")]
        {
            if !expired.is_empty() {
                tracing::debug!("{} requests timed out", expired.len());
            }
        }

        expired
    }

    /// Returns `true` if the request is outstanding.
    pub fn contains(&self, key: ChainKey) -> bool {
        self.requests.lock().contains_key(&key)
    }

    /// Number of outstanding requests on a connection.
    pub fn outstanding(&self, connection_key: ConnectionKey) -> usize {
        self.requests
            .lock()
            .keys()
            .filter(|key| key.connection_key == connection_key)
            .count()
    }

    /// Number of outstanding requests across all connections.
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns `true` if no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}
