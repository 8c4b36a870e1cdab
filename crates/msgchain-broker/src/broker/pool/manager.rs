//! The set of tasks that make up a running broker.
//!
//! This module defines [`Broker`], which owns one pipeline per inbound
//! direction (mobile and HMI) and a sweeper for timeouts. All three work on
//! the same [`Dispatcher`], so the chain store and request controller are
//! shared without any global state.
//!
//! Each pipeline listens on its own bounded [`mpsc::Receiver`], which keeps
//! messages of one direction in order while the other direction proceeds
//! independently.

use crate::broker::{
    config::BrokerConfig,
    dispatch::handler::Dispatcher,
    error::{BrokerError, Result},
    message::{Inbound, Outbound},
    pool::{
        PipelineRequest,
        worker::{pipeline_loop, sweeper_loop},
    },
};
use core::time::Duration;
use msgchain::{MonotonicClock, TimeSource};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// A running broker: pipelines, sweeper and the dispatcher they share.
pub struct Broker<T: TimeSource = MonotonicClock> {
    dispatcher: Arc<Dispatcher<T>>,
    mobile: mpsc::Sender<PipelineRequest>,
    hmi: mpsc::Sender<PipelineRequest>,
    sweeper: mpsc::Sender<PipelineRequest>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl Broker<MonotonicClock> {
    /// Spawns a broker reading time from a fresh [`MonotonicClock`].
    pub fn spawn(config: &BrokerConfig, outbound: mpsc::Sender<Outbound>) -> Self {
        Self::with_dispatcher(config, Arc::new(Dispatcher::new(config)), outbound)
    }
}

impl<T> Broker<T>
where
    T: TimeSource + Send + Sync + 'static,
{
    /// Spawns the pipelines and the sweeper on the current Tokio runtime.
    pub fn with_dispatcher(
        config: &BrokerConfig,
        dispatcher: Arc<Dispatcher<T>>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        let shutdown_token = CancellationToken::new();

        let (mobile, mobile_rx) = mpsc::channel(config.channel_buffer_size);
        let (hmi, hmi_rx) = mpsc::channel(config.channel_buffer_size);
        // The sweeper only ever receives a shutdown request.
        let (sweeper, sweeper_rx) = mpsc::channel(1);

        tokio::spawn(pipeline_loop(
            "mobile",
            Arc::clone(&dispatcher),
            mobile_rx,
            outbound.clone(),
        ));
        tokio::spawn(pipeline_loop(
            "hmi",
            Arc::clone(&dispatcher),
            hmi_rx,
            outbound.clone(),
        ));
        tokio::spawn(sweeper_loop(
            Arc::clone(&dispatcher),
            config.sweep_interval,
            sweeper_rx,
            outbound,
        ));

        Self {
            dispatcher,
            mobile,
            hmi,
            sweeper,
            shutdown_token,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    /// Queues an inbound message on the pipeline for its direction.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The broker is shutting down (`shutdown_token` was cancelled).
    /// - The pipeline's channel is closed.
    pub async fn submit(&self, message: Inbound) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(BrokerError::ServiceShutdown);
        }

        let (name, pipeline) = if message.is_from_hmi() {
            ("hmi", &self.hmi)
        } else {
            ("mobile", &self.mobile)
        };

        match pipeline.send(PipelineRequest::Dispatch { message }).await {
            Ok(()) => Ok(()),
            Err(_) => Err(BrokerError::ChannelError {
                context: format!("Pipeline {name} channel closed"),
            }),
        }
    }

    /// Gracefully shuts the broker down.
    ///
    /// - Cancels the shared [`CancellationToken`] to refuse new messages.
    /// - Sends a [`PipelineRequest::Shutdown`] to every task. Messages
    ///   queued before it are drained first.
    /// - Waits (up to `shutdown_timeout` per task) for acknowledgements.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Refusing new messages");
        self.shutdown_token.cancel();

        tracing::debug!("Notifying all pipelines to shut down");
        let tasks = [
            ("mobile", &self.mobile),
            ("hmi", &self.hmi),
            ("sweeper", &self.sweeper),
        ];
        let mut shutdown_handles = Vec::with_capacity(tasks.len());

        for (name, task) in tasks {
            let (tx, rx) = oneshot::channel();
            if let Err(e) = task.send(PipelineRequest::Shutdown { response: tx }).await {
                tracing::error!("Failed to send shutdown to {name}: {e}");
            } else {
                shutdown_handles.push((name, rx));
            }
        }

        let shutdown_timeout = self.shutdown_timeout;
        let timeout_futures = shutdown_handles.into_iter().map(|(name, rx)| async move {
            match timeout(shutdown_timeout, rx).await {
                Ok(Ok(())) => {
                    tracing::trace!("Pipeline {name} shutdown acknowledged");
                }
                Ok(Err(e)) => {
                    tracing::error!("Pipeline {name} returned error: {e}");
                }
                Err(_) => {
                    tracing::warn!("Pipeline {name} shutdown timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        let stats = self.dispatcher.stats();
        tracing::info!(
            "Broker shutdown complete ({} completed, {} cancelled, {} abandoned legs)",
            stats.completed,
            stats.cancelled,
            stats.abandoned_legs
        );

        Ok(())
    }
}
