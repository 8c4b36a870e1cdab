//! Command dispatch on top of a [`ChainCoordinator`].
//!
//! Every handler is synchronous and returns the outbound messages it
//! produced. The pipelines forward them to the writer in order.
//!
//! A fan-out holds the read side of the dispatcher's fan-out lock from
//! admission to its last leg, and a timeout sweep holds the write side. A
//! sweep therefore never sees a request whose legs are half registered.

use crate::broker::{
    config::BrokerConfig,
    message::{
        HmiResponse, Inbound, MobileRequest, MobileResponse, Outbound, ResultCode,
        UnregisterReason,
    },
};
use msgchain::{
    AtomicCorrelationIdAllocator, ChainCoordinator, ChainKey, ChainRecord, ChainStats,
    ConnectionKey, DecreaseStatus, Error, MobileCorrelationId, MonotonicClock, RequestController,
    TimeSource,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

#[derive(Debug)]
struct Outcome {
    result_code: ResultCode,
    info: Option<String>,
}

/// Chain payload: the mobile function being answered and the result folded
/// from the HMI responses seen so far.
#[derive(Debug)]
pub struct PendingResponse {
    function: String,
    outcome: Mutex<Outcome>,
}

impl PendingResponse {
    pub fn new(function: String) -> Self {
        Self {
            function,
            outcome: Mutex::new(Outcome {
                result_code: ResultCode::Success,
                info: None,
            }),
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// Folds one leg result into the response.
    pub fn record(&self, result_code: ResultCode, info: Option<String>) {
        let mut outcome = self.outcome.lock();
        if result_code.overrides(outcome.result_code) {
            outcome.result_code = result_code;
            outcome.info = info;
        } else if outcome.info.is_none() && result_code == outcome.result_code {
            outcome.info = info;
        }
    }

    fn to_response(&self, key: ChainKey) -> MobileResponse {
        let outcome = self.outcome.lock();
        MobileResponse {
            connection_key: key.connection_key,
            correlation_id: key.mobile_correlation_id,
            function: self.function.clone(),
            success: outcome.result_code.is_success(),
            result_code: outcome.result_code,
            info: outcome.info.clone(),
        }
    }
}

fn respond(
    key: ChainKey,
    function: String,
    result_code: ResultCode,
    info: Option<String>,
) -> Outbound {
    Outbound::MobileResponse(MobileResponse {
        connection_key: key.connection_key,
        correlation_id: key.mobile_correlation_id,
        function,
        success: result_code.is_success(),
        result_code,
        info,
    })
}

pub type Coordinator<T = MonotonicClock> =
    ChainCoordinator<PendingResponse, AtomicCorrelationIdAllocator, T>;

/// Routes inbound messages through the chain coordinator.
pub struct Dispatcher<T: TimeSource = MonotonicClock> {
    coordinator: Coordinator<T>,
    fan_out: RwLock<()>,
}

impl Dispatcher<MonotonicClock> {
    pub fn new(config: &BrokerConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<T: TimeSource> Dispatcher<T> {
    pub fn with_clock(config: &BrokerConfig, clock: T) -> Self {
        Self {
            coordinator: ChainCoordinator::with_parts(
                AtomicCorrelationIdAllocator::with_max(config.max_hmi_correlation_id),
                RequestController::with_clock(config.request_controller(), clock),
            ),
            fan_out: RwLock::new(()),
        }
    }

    pub const fn coordinator(&self) -> &Coordinator<T> {
        &self.coordinator
    }

    pub fn stats(&self) -> ChainStats {
        self.coordinator.stats()
    }

    pub fn dispatch(&self, message: Inbound) -> Vec<Outbound> {
        match message {
            Inbound::MobileRequest(request) => self.handle_mobile_request(request),
            Inbound::HmiResponse(response) => self.handle_hmi_response(response),
            Inbound::Cancel {
                connection_key,
                correlation_id,
            } => {
                self.handle_cancel(connection_key, correlation_id);
                Vec::new()
            }
            Inbound::Unregister { connection_key } => {
                self.handle_unregister(connection_key);
                Vec::new()
            }
        }
    }

    /// Admits a mobile request and fans it out.
    ///
    /// The first leg opens the chain and carries the [`PendingResponse`];
    /// every later leg joins it. A request without legs is answered at
    /// once.
    #[tracing::instrument(level = "debug", skip_all, fields(
        connection_key = request.connection_key,
        correlation_id = request.correlation_id,
        function = %request.function,
    ))]
    pub fn handle_mobile_request(&self, request: MobileRequest) -> Vec<Outbound> {
        let key = ChainKey::new(request.connection_key, request.correlation_id);
        let _fan_out = self.fan_out.read();

        match self.coordinator.begin_mobile_request(&request) {
            Ok(()) => {}
            Err(Error::TooManyRequests { connection_key, .. }) => {
                tracing::warn!("Dropping {key}: application exceeded its request limit");
                return vec![Outbound::AppUnregistered {
                    connection_key,
                    reason: UnregisterReason::TooManyRequests,
                }];
            }
            Err(err) => {
                tracing::warn!("Rejecting {key}: {err}");
                return vec![respond(
                    key,
                    request.function,
                    ResultCode::InvalidId,
                    Some(err.to_string()),
                )];
            }
        }

        let MobileRequest { function, legs, .. } = request;
        if legs.is_empty() {
            self.coordinator
                .finish_mobile_request(key.connection_key, key.mobile_correlation_id);
            return vec![respond(key, function, ResultCode::Success, None)];
        }

        let mut outbound = Vec::with_capacity(legs.len());
        let mut payload = Some(PendingResponse::new(function.clone()));
        let mut chain: Option<Arc<ChainRecord<PendingResponse>>> = None;

        for leg in legs {
            let hmi_correlation_id = self.coordinator.next_hmi_correlation_id();
            let added = match chain.as_deref() {
                None => self.coordinator.add_message_chain(
                    key.connection_key,
                    key.mobile_correlation_id,
                    hmi_correlation_id,
                    None,
                    payload.take(),
                ),
                Some(existing) => self.coordinator.add_message_chain(
                    key.connection_key,
                    key.mobile_correlation_id,
                    hmi_correlation_id,
                    Some(existing),
                    None,
                ),
            };

            match added {
                Ok(record) => {
                    chain.get_or_insert(record);
                }
                Err(Error::RequestNotTracked { .. }) => {
                    // Settled elsewhere, and already answered there.
                    tracing::debug!("Dropping fan-out of {key}: request is no longer outstanding");
                    self.coordinator
                        .cancel_mobile_request(key.connection_key, key.mobile_correlation_id);
                    return Vec::new();
                }
                Err(err) => {
                    // Nothing has been sent yet, so the whole fan-out is
                    // abandoned.
                    tracing::error!("Failed to register leg {}: {err}", leg.method);
                    self.coordinator
                        .cancel_mobile_request(key.connection_key, key.mobile_correlation_id);
                    return vec![respond(
                        key,
                        function,
                        ResultCode::GenericError,
                        Some(err.to_string()),
                    )];
                }
            }

            outbound.push(Outbound::HmiRequest {
                correlation_id: hmi_correlation_id,
                method: leg.method,
                params: leg.params,
            });
        }

        tracing::debug!("Fanned {key} out to {} HMI requests", outbound.len());
        outbound
    }

    /// Folds an HMI response into its chain. Returns the mobile response if
    /// this was the last leg.
    #[tracing::instrument(level = "debug", skip_all, fields(correlation_id = response.correlation_id))]
    pub fn handle_hmi_response(&self, response: HmiResponse) -> Vec<Outbound> {
        let HmiResponse {
            correlation_id,
            result_code,
            info,
        } = response;

        let Some(chain) = self.coordinator.get_message_chain(correlation_id) else {
            tracing::debug!("Dropping late HMI response {correlation_id}");
            return Vec::new();
        };
        if let Some(pending) = chain.data() {
            pending.record(result_code, info);
        }

        match self.coordinator.hmi_response(correlation_id) {
            DecreaseStatus::Completed {
                connection_key,
                mobile_correlation_id,
            } => {
                let key = ChainKey::new(connection_key, mobile_correlation_id);
                match chain.data() {
                    Some(pending) => vec![Outbound::MobileResponse(pending.to_response(key))],
                    None => {
                        tracing::warn!("Chain of {key} completed without a pending response");
                        Vec::new()
                    }
                }
            }
            DecreaseStatus::Pending { remaining } => {
                tracing::trace!("{remaining} legs of {} still outstanding", chain.key());
                Vec::new()
            }
            DecreaseStatus::Unmatched => {
                tracing::debug!("HMI response {correlation_id} lost a race with teardown");
                Vec::new()
            }
        }
    }

    pub fn handle_cancel(
        &self,
        connection_key: ConnectionKey,
        correlation_id: MobileCorrelationId,
    ) -> bool {
        let cancelled = self
            .coordinator
            .cancel_mobile_request(connection_key, correlation_id);
        if !cancelled {
            tracing::debug!("Nothing to cancel for {connection_key}:{correlation_id}");
        }
        cancelled
    }

    pub fn handle_unregister(&self, connection_key: ConnectionKey) {
        let teardown = self.coordinator.unregister_application(connection_key);
        tracing::info!(
            "Unregistered connection {connection_key}: {} requests, {} chains released",
            teardown.requests,
            teardown.chains
        );
    }

    /// Answers every timed-out mobile request with `TIMED_OUT`.
    pub fn sweep_expired(&self) -> Vec<Outbound> {
        let _fan_out = self.fan_out.write();
        self.coordinator
            .expire_requests()
            .into_iter()
            .map(|expired| {
                let function = expired
                    .chain
                    .as_ref()
                    .and_then(|chain| chain.data())
                    .map(|pending| pending.function().to_owned())
                    .unwrap_or_default();
                tracing::info!("Mobile request {} timed out", expired.key);
                respond(
                    expired.key,
                    function,
                    ResultCode::TimedOut,
                    Some("Request timed out".to_owned()),
                )
            })
            .collect()
    }
}
