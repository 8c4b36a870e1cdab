#![doc = include_str!("../README.md")]

mod broker;

use broker::config::{BrokerConfig, CliArgs};
use broker::pool::manager::Broker;
use broker::stream::{read_inbound, write_outbound};
use broker::telemetry::init_telemetry;
use clap::Parser;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::timeout;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = BrokerConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let (outbound_tx, outbound_rx) = mpsc::channel(config.channel_buffer_size);
    let writer = tokio::spawn(write_outbound(tokio::io::stdout(), outbound_rx));
    let broker = Broker::spawn(&config, outbound_tx);

    let input = BufReader::new(tokio::io::stdin());
    let read_result = tokio::select! {
        result = read_inbound(input, &broker) => result.map(|_| ()),
        () = shutdown_signal() => Ok(()),
    };

    if let Err(e) = broker.shutdown().await {
        tracing::error!("Error during broker shutdown: {e:?}");
    }

    // Pipelines dropped their senders on shutdown, so the writer finishes
    // once the remaining messages are out.
    match timeout(config.shutdown_timeout, writer).await {
        Ok(Ok(Ok(written))) => tracing::info!("Wrote {written} outbound messages"),
        Ok(Ok(Err(e))) => tracing::error!("Outbound writer failed: {e}"),
        Ok(Err(e)) => tracing::error!("Outbound writer panicked: {e}"),
        Err(_) => tracing::warn!("Outbound writer did not finish in time"),
    }

    read_result
}

fn log_startup_info(config: &BrokerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting broker with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting broker (max {} requests per app, default timeout {:?})",
            config.max_requests_per_app,
            config.default_timeout
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
