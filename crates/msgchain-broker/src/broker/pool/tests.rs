use crate::broker::{
    config::BrokerConfig,
    dispatch::handler::Dispatcher,
    error::BrokerError,
    message::{HmiLeg, HmiResponse, Inbound, MobileRequest, Outbound, ResultCode},
    pool::manager::Broker,
};
use core::time::Duration;
use msgchain::{HmiCorrelationId, TimeSource};
use serde_json::Value;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::{sync::mpsc, time::timeout};

#[derive(Clone, Default)]
struct MockTime {
    millis: Arc<AtomicU64>,
}

impl TimeSource for MockTime {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }
}

fn config() -> BrokerConfig {
    BrokerConfig {
        default_timeout: Duration::from_millis(100),
        sweep_interval: Duration::from_millis(5),
        channel_buffer_size: 16,
        shutdown_timeout: Duration::from_secs(1),
        ..BrokerConfig::default()
    }
}

fn spawn_broker() -> (Broker<MockTime>, MockTime, mpsc::Receiver<Outbound>) {
    let config = config();
    let clock = MockTime::default();
    let dispatcher = Arc::new(Dispatcher::with_clock(&config, clock.clone()));
    let (tx, rx) = mpsc::channel(config.channel_buffer_size);
    (Broker::with_dispatcher(&config, dispatcher, tx), clock, rx)
}

fn mobile_request(correlation_id: u32, legs: usize) -> Inbound {
    Inbound::MobileRequest(MobileRequest {
        connection_key: 1,
        correlation_id,
        function: "Alert".to_owned(),
        timeout_ms: None,
        legs: (0..legs)
            .map(|i| HmiLeg {
                method: format!("UI.Leg{i}"),
                params: Value::Null,
            })
            .collect(),
    })
}

async fn next(rx: &mut mpsc::Receiver<Outbound>) -> Outbound {
    match timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(message)) => message,
        Ok(None) => panic!("outbound channel closed"),
        Err(_) => panic!("no outbound message within 2s"),
    }
}

async fn next_hmi_id(rx: &mut mpsc::Receiver<Outbound>) -> HmiCorrelationId {
    match next(rx).await {
        Outbound::HmiRequest { correlation_id, .. } => correlation_id,
        other => panic!("expected an HMI request, got {other:?}"),
    }
}

#[tokio::test]
async fn fan_out_round_trip_through_pipelines() {
    let (broker, _, mut rx) = spawn_broker();

    broker.submit(mobile_request(10, 3)).await.unwrap();
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(next_hmi_id(&mut rx).await);
    }

    for id in ids {
        broker
            .submit(Inbound::HmiResponse(HmiResponse {
                correlation_id: id,
                result_code: ResultCode::Success,
                info: None,
            }))
            .await
            .unwrap();
    }

    match next(&mut rx).await {
        Outbound::MobileResponse(response) => {
            assert_eq!(response.correlation_id, 10);
            assert!(response.success);
        }
        other => panic!("expected a mobile response, got {other:?}"),
    }

    broker.shutdown().await.unwrap();
    assert_eq!(broker.dispatcher().stats().completed, 1);
}

#[tokio::test]
async fn sweeper_answers_timed_out_requests() {
    let (broker, clock, mut rx) = spawn_broker();

    broker.submit(mobile_request(20, 1)).await.unwrap();
    next_hmi_id(&mut rx).await;

    clock.millis.store(100, Ordering::Relaxed);
    match next(&mut rx).await {
        Outbound::MobileResponse(response) => {
            assert_eq!(response.correlation_id, 20);
            assert_eq!(response.result_code, ResultCode::TimedOut);
        }
        other => panic!("expected a timeout response, got {other:?}"),
    }

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_drains_queued_messages_then_refuses_new_ones() {
    let (broker, _, mut rx) = spawn_broker();

    broker.submit(mobile_request(1, 0)).await.unwrap();
    broker.submit(mobile_request(2, 0)).await.unwrap();
    broker.shutdown().await.unwrap();

    assert_eq!(
        broker.submit(mobile_request(3, 0)).await,
        Err(BrokerError::ServiceShutdown)
    );

    let mut answered = Vec::new();
    while let Ok(Some(message)) = timeout(Duration::from_secs(2), rx.recv()).await {
        match message {
            Outbound::MobileResponse(response) => answered.push(response.correlation_id),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(answered, vec![1, 2]);
}
