//! STOMP Source Connector
//!
//! Subscribes to a destination on a STOMP broker (ActiveMQ, RabbitMQ,
//! Artemis, ...) and turns every message into structured events. Events are
//! written as JSON lines to stdout or published to a Danube topic. Broker
//! restarts are survived by reconnecting and resubscribing.

mod client;
mod codec;
mod config;
mod frame;

use client::StompClient;
use config::StompSourceConfig;
use stomp_connect_core::{
    ConnectorResult, DanubeSink, EventSink, OutputKind, SourceRuntime, StdoutSink,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ConnectorResult<()> {
    // Load configuration
    let config = StompSourceConfig::load()?;

    // Initialize logging
    init_tracing(&config);

    tracing::info!("Starting STOMP Source Connector");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    config.validate().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        e
    })?;

    tracing::info!("Configuration loaded successfully");
    tracing::info!("Connector: {}", config.core.connector_name);
    tracing::info!("Output: {:?}", config.core.output);

    let client = StompClient::new(config.stomp.clone());

    match config.core.output {
        OutputKind::Stdout => run(client, StdoutSink::new(), &config).await?,
        OutputKind::Danube => {
            tracing::info!(
                "Destination Topic: {}",
                config.core.destination_topic.as_deref().unwrap_or("<not set>")
            );
            let sink = DanubeSink::connect(&config.core).await?;
            run(client, sink, &config).await?
        }
    }

    tracing::info!("STOMP Source Connector stopped");
    Ok(())
}

async fn run<S: EventSink>(
    client: StompClient,
    sink: S,
    config: &StompSourceConfig,
) -> ConnectorResult<()> {
    let mut runtime = SourceRuntime::new(client, sink, &config.core, &config.stomp)?;

    // Run until shutdown signal
    runtime.run().await
}

/// Initialize tracing/logging
///
/// `RUST_LOG` wins; otherwise `debug` when the stomp debug flag is set,
/// else the configured log level.
fn init_tracing(config: &StompSourceConfig) {
    let default_level = if config.stomp.debug {
        "debug"
    } else {
        config.core.log_level.as_str()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
