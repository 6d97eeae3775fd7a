//! Source Runtime for STOMP → event pipeline connectors
//!
//! Keeps one subscription alive on the configured destination, builds events
//! from every delivered message and pushes them to the sink. A single task
//! drives the whole state machine, so reconnects and message handling never
//! interleave.

use crate::builder::EventBuilder;
use crate::config::{ConnectorConfig, StompConfig};
use crate::connection::ConnectionManager;
use crate::message::RawMessage;
use crate::metrics::ConnectorMetrics;
use crate::retry::RetryPolicy;
use crate::subscription::Subscription;
use crate::traits::{BrokerClient, ConnectionClosed, EventSink};
use crate::{ConnectorError, ConnectorResult};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Subscription loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not started
    Idle,
    /// Connecting and waiting for the subscription to be acknowledged
    Subscribing,
    /// Receiving messages
    Active,
    /// The connection closed; a fresh subscription is being established
    Reconnecting,
    /// Shut down
    Stopped,
}

/// Runtime for the STOMP source connector
pub struct SourceRuntime<B: BrokerClient, S: EventSink> {
    connection: ConnectionManager<B>,
    builder: EventBuilder,
    sink: S,
    destination: String,
    metrics: ConnectorMetrics,
    shutdown: CancellationToken,
    state: watch::Sender<LoopState>,
}

impl<B: BrokerClient, S: EventSink> SourceRuntime<B, S> {
    /// Create a new source runtime
    pub fn new(
        client: B,
        sink: S,
        config: &ConnectorConfig,
        stomp: &StompConfig,
    ) -> ConnectorResult<Self> {
        // Validate configuration
        config.validate()?;
        stomp.validate()?;

        info!("Initializing Source Runtime");
        info!("Connector: {}", config.connector_name);
        info!("Broker: {}", stomp.stomp_url());
        info!("Codec: {:?}", stomp.codec);
        info!("Projected headers: {:?}", stomp.headers);

        let metrics = ConnectorMetrics::new(&config.connector_name, &stomp.destination);
        metrics.set_health(true);

        let (state, _) = watch::channel(LoopState::Idle);

        Ok(Self {
            connection: ConnectionManager::new(client, config.retry_policy(), metrics.clone()),
            builder: EventBuilder::from_config(stomp),
            sink,
            destination: stomp.destination.clone(),
            metrics,
            shutdown: CancellationToken::new(),
            state,
        })
    }

    /// Replace the event builder (builder pattern)
    pub fn with_event_builder(mut self, builder: EventBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Replace the connection retry policy (builder pattern)
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.connection.set_policy(policy);
        self
    }

    /// Token that stops the runtime when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub fn connection(&self) -> &ConnectionManager<B> {
        &self.connection
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run until SIGINT or until the shutdown token is cancelled
    pub async fn run(&mut self) -> ConnectorResult<()> {
        super::spawn_ctrl_c_handler(self.shutdown.clone());
        self.run_until_cancelled().await
    }

    /// Run until the shutdown token is cancelled
    ///
    /// Returns an error only when a bounded retry policy gives up or the
    /// closed-signal channel breaks; shutdown itself is not an error.
    pub async fn run_until_cancelled(&mut self) -> ConnectorResult<()> {
        info!("Starting Source Runtime");

        let shutdown = self.shutdown.clone();
        let mut closed = self.connection.on_closed();

        let result = self.process_subscription_loop(&shutdown, &mut closed).await;

        self.shutdown_connector().await;

        match result {
            Ok(()) | Err(ConnectorError::Shutdown) => Ok(()),
            Err(e) => {
                error!("Source Runtime failed: {}", e);
                Err(e)
            }
        }
    }

    fn set_state(&self, state: LoopState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Subscription loop state changed");
        }
    }

    /// Main loop: deliver messages, resubscribe on connection loss
    async fn process_subscription_loop(
        &mut self,
        shutdown: &CancellationToken,
        closed: &mut mpsc::UnboundedReceiver<ConnectionClosed>,
    ) -> ConnectorResult<()> {
        let mut subscription = self.establish(shutdown).await?;
        // Newest connection epoch whose loss has already been handled
        let mut handled_epoch = 0;

        info!("Entering main subscription loop");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => return Ok(()),

                signal = closed.recv() => {
                    let Some(signal) = signal else {
                        return Err(ConnectorError::fatal("connection-closed channel dropped"));
                    };

                    let signal = coalesce(signal, closed);
                    if signal.epoch < self.connection.epoch() || signal.epoch <= handled_epoch {
                        debug!(
                            epoch = signal.epoch,
                            current = self.connection.epoch(),
                            handled = handled_epoch,
                            "Ignoring closed signal for an already handled connection"
                        );
                        continue;
                    }

                    info!(epoch = signal.epoch, "Connection to stomp server closed, reconnecting");
                    handled_epoch = signal.epoch;
                    subscription = self.resubscribe(subscription, shutdown).await?;
                }

                message = subscription.recv() => match message {
                    Some(message) => {
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => return Ok(()),
                            _ = Self::deliver(&self.builder, &self.sink, &self.metrics, message) => {}
                        }
                    }
                    None => {
                        debug!(
                            subscription = subscription.id(),
                            "Subscription channel closed, reconnecting"
                        );
                        handled_epoch = handled_epoch.max(subscription.epoch());
                        subscription = self.resubscribe(subscription, shutdown).await?;
                    }
                },
            }
        }
    }

    /// Connect (if needed) and subscribe, retrying until both succeed
    async fn establish(&mut self, shutdown: &CancellationToken) -> ConnectorResult<Subscription> {
        loop {
            self.set_state(LoopState::Subscribing);
            self.connection.ensure_connected(shutdown).await?;

            match self.connection.subscribe(&self.destination).await {
                Ok(subscription) => {
                    info!(
                        destination = %self.destination,
                        subscription = subscription.id(),
                        "Subscribed to destination"
                    );
                    self.set_state(LoopState::Active);
                    return Ok(subscription);
                }
                Err(e) => {
                    warn!(
                        destination = %self.destination,
                        error = %e,
                        "Failed to subscribe, will retry"
                    );
                    let policy = self.connection.policy();
                    policy.wait(shutdown).await?;
                }
            }
        }
    }

    /// Drop the stale subscription and establish a fresh one
    async fn resubscribe(
        &mut self,
        stale: Subscription,
        shutdown: &CancellationToken,
    ) -> ConnectorResult<Subscription> {
        self.set_state(LoopState::Reconnecting);
        self.metrics.record_resubscribe();

        if let Err(e) = self.connection.unsubscribe(&stale).await {
            debug!(
                subscription = stale.id(),
                error = %e,
                "Failed to cancel stale subscription"
            );
        }
        drop(stale);

        self.establish(shutdown).await
    }

    /// Build events for one message and push them in order
    ///
    /// Decode failures and push failures are logged and counted; they never
    /// stop the loop.
    async fn deliver(
        builder: &EventBuilder,
        sink: &S,
        metrics: &ConnectorMetrics,
        message: RawMessage,
    ) {
        let start = Instant::now();
        metrics.record_received(message.size());

        let events = match builder.build(&message) {
            Ok(events) => events,
            Err(e) => {
                metrics.record_decode_error();
                warn!(
                    message_id = message.message_id().unwrap_or("<none>"),
                    error = %e,
                    "Failed to decode message, skipping"
                );
                return;
            }
        };

        debug!(
            message_id = message.message_id().unwrap_or("<none>"),
            events = events.len(),
            "Processing message"
        );

        for event in events {
            match sink.push(event).await {
                Ok(()) => metrics.record_success(),
                Err(e) => {
                    error!("Failed to push event: {}", e);
                    metrics.record_push_error();
                }
            }
        }

        metrics.record_processing_time(start.elapsed());
    }

    /// Graceful shutdown of the connector
    async fn shutdown_connector(&mut self) {
        info!("Shutting down connector");

        if let Err(e) = self.connection.disconnect().await {
            warn!("Failed to disconnect from stomp server: {}", e);
        }
        if let Err(e) = self.sink.close().await {
            warn!("Failed to close sink: {}", e);
        }

        self.metrics.set_health(false);
        self.set_state(LoopState::Stopped);
        info!("Source Runtime stopped");
    }
}

/// Collapse queued closed signals into the newest one
fn coalesce(
    first: ConnectionClosed,
    closed: &mut mpsc::UnboundedReceiver<ConnectionClosed>,
) -> ConnectionClosed {
    let mut latest = first;
    while let Ok(next) = closed.try_recv() {
        if next.epoch > latest.epoch {
            latest = next;
        }
    }
    latest
}
