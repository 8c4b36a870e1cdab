use crate::broker::{dispatch::handler::Dispatcher, message::Outbound, pool::PipelineRequest};
use core::time::Duration;
use msgchain::TimeSource;
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{MissedTickBehavior, interval},
};

/// Forwards outbound messages to the writer. Returns `false` once the writer
/// is gone.
async fn forward(name: &str, outbound: &mpsc::Sender<Outbound>, messages: Vec<Outbound>) -> bool {
    for message in messages {
        if outbound.send(message).await.is_err() {
            tracing::error!("Pipeline {name} lost the outbound channel");
            return false;
        }
    }
    true
}

/// Pipeline task for one inbound direction.
///
/// Messages are dispatched strictly in arrival order, so everything queued
/// ahead of a [`PipelineRequest::Shutdown`] is still handled. The loop also
/// ends when its channel closes or the outbound writer is gone.
///
/// # Arguments
///
/// - `name`: Pipeline name, for logs.
/// - `dispatcher`: Shared dispatcher all pipelines work on.
/// - `rx`: Receiver through which [`PipelineRequest`]s are received.
/// - `outbound`: Sender for messages produced by the dispatcher.
pub async fn pipeline_loop<T>(
    name: &'static str,
    dispatcher: Arc<Dispatcher<T>>,
    mut rx: mpsc::Receiver<PipelineRequest>,
    outbound: mpsc::Sender<Outbound>,
) where
    T: TimeSource,
{
    tracing::trace!("Pipeline {name} started");

    while let Some(work) = rx.recv().await {
        match work {
            PipelineRequest::Dispatch { message } => {
                if !forward(name, &outbound, dispatcher.dispatch(message)).await {
                    break;
                }
            }
            PipelineRequest::Shutdown { response } => {
                tracing::debug!("Pipeline {name} received shutdown signal");

                if response.send(()).is_err() {
                    tracing::error!("Pipeline {name} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Pipeline {name} stopped");
}

/// Sweeper task: answers timed-out requests every `sweep_interval`.
///
/// It also accepts [`PipelineRequest::Dispatch`], handled like any other
/// pipeline would.
pub async fn sweeper_loop<T>(
    dispatcher: Arc<Dispatcher<T>>,
    sweep_interval: Duration,
    mut rx: mpsc::Receiver<PipelineRequest>,
    outbound: mpsc::Sender<Outbound>,
) where
    T: TimeSource,
{
    tracing::trace!("Sweeper started");

    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let expired = dispatcher.sweep_expired();
                if !forward("sweeper", &outbound, expired).await {
                    break;
                }
            }
            work = rx.recv() => match work {
                Some(PipelineRequest::Dispatch { message }) => {
                    if !forward("sweeper", &outbound, dispatcher.dispatch(message)).await {
                        break;
                    }
                }
                Some(PipelineRequest::Shutdown { response }) => {
                    tracing::debug!("Sweeper received shutdown signal");

                    if response.send(()).is_err() {
                        tracing::error!("Sweeper failed to acknowledge shutdown");
                    }
                    break;
                }
                None => break,
            },
        }
    }

    tracing::trace!("Sweeper stopped");
}
