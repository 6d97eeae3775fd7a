//! Broker connection lifecycle.
//!
//! The [`ConnectionManager`] owns the broker client. It connects with retry,
//! stamps every successful connection with a new epoch and forwards closed
//! notifications to a single listener. It never reconnects on its own; the
//! subscription loop decides when to call [`ConnectionManager::ensure_connected`]
//! again.

use crate::metrics::ConnectorMetrics;
use crate::retry::RetryPolicy;
use crate::subscription::Subscription;
use crate::traits::{BrokerClient, ClosedNotifier, ConnectionClosed};
use crate::{ConnectorError, ConnectorResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State of the logical broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the broker client and its connection
pub struct ConnectionManager<B: BrokerClient> {
    client: B,
    policy: RetryPolicy,
    state: ConnectionState,
    epoch: u64,
    closed_tx: mpsc::UnboundedSender<ConnectionClosed>,
    metrics: ConnectorMetrics,
}

impl<B: BrokerClient> ConnectionManager<B> {
    pub fn new(client: B, policy: RetryPolicy, metrics: ConnectorMetrics) -> Self {
        // Signals sent before `on_closed` is called have no listener and are dropped.
        let (closed_tx, _) = mpsc::unbounded_channel();

        Self {
            client,
            policy,
            state: ConnectionState::Disconnected,
            epoch: 0,
            closed_tx,
            metrics,
        }
    }

    /// Register the listener for connection-closed signals
    ///
    /// Replaces any previous listener. Each closed connection produces one
    /// [`ConnectionClosed`] carrying the epoch of that connection.
    pub fn on_closed(&mut self) -> mpsc::UnboundedReceiver<ConnectionClosed> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.closed_tx = tx;
        rx
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Epoch of the current connection; 0 before the first connect
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    pub fn client(&self) -> &B {
        &self.client
    }

    /// Connect unless already connected, retrying per the policy
    ///
    /// Blocks until a connection is up. Fails only with
    /// [`ConnectorError::Shutdown`] when `shutdown` is cancelled, or with
    /// [`ConnectorError::RetriesExhausted`] under a bounded policy.
    pub async fn ensure_connected(&mut self, shutdown: &CancellationToken) -> ConnectorResult<()> {
        if self.client.is_connected() {
            self.state = ConnectionState::Connected;
            return Ok(());
        }

        let mut attempts: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                self.state = ConnectionState::Disconnected;
                return Err(ConnectorError::Shutdown);
            }

            attempts += 1;
            self.state = ConnectionState::Connecting;
            self.metrics.record_connect_attempt();

            let notifier = ClosedNotifier::new(self.epoch + 1, self.closed_tx.clone());

            match self.client.connect(notifier).await {
                Ok(()) => {
                    self.epoch += 1;
                    self.state = ConnectionState::Connected;
                    self.metrics.set_connected(true);
                    info!(epoch = self.epoch, attempts, "Connected to stomp server");
                    return Ok(());
                }
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    self.metrics.set_connected(false);
                    self.metrics.record_connect_failure();
                    debug!(
                        error = ?e,
                        attempt = attempts,
                        "Failed to connect to stomp server, will retry"
                    );

                    if !self.policy.should_retry(attempts) {
                        warn!(attempts, "Giving up connecting to stomp server");
                        return Err(ConnectorError::retries_exhausted(attempts, e));
                    }

                    self.policy.wait(shutdown).await?;
                }
            }
        }
    }

    /// Subscribe on the current connection
    pub async fn subscribe(&mut self, destination: &str) -> ConnectorResult<Subscription> {
        let mut subscription = self.client.subscribe(destination).await?;
        subscription.set_epoch(self.epoch);
        Ok(subscription)
    }

    /// Cancel a subscription if it belongs to the live connection
    pub async fn unsubscribe(&mut self, subscription: &Subscription) -> ConnectorResult<()> {
        if subscription.epoch() != self.epoch || !self.client.is_connected() {
            return Ok(());
        }
        self.client.unsubscribe(subscription).await
    }

    /// Close the connection on request
    pub async fn disconnect(&mut self) -> ConnectorResult<()> {
        let result = if self.client.is_connected() {
            self.client.disconnect().await
        } else {
            Ok(())
        };
        self.state = ConnectionState::Disconnected;
        self.metrics.set_connected(false);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Fails `failures` times, then connects
    struct FlakyClient {
        failures: u32,
        attempts: u32,
        connected: bool,
        notifier: Option<ClosedNotifier>,
    }

    impl FlakyClient {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: 0,
                connected: false,
                notifier: None,
            }
        }
    }

    #[async_trait]
    impl BrokerClient for FlakyClient {
        async fn connect(&mut self, on_closed: ClosedNotifier) -> ConnectorResult<()> {
            self.attempts += 1;
            if self.attempts <= self.failures {
                return Err(ConnectorError::connection("connection refused"));
            }
            self.connected = true;
            self.notifier = Some(on_closed);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn subscribe(&mut self, destination: &str) -> ConnectorResult<Subscription> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(Subscription::new("sub-1", destination, rx))
        }

        async fn unsubscribe(&mut self, _subscription: &Subscription) -> ConnectorResult<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> ConnectorResult<()> {
            self.connected = false;
            Ok(())
        }
    }

    fn manager(client: FlakyClient, policy: RetryPolicy) -> ConnectionManager<FlakyClient> {
        ConnectionManager::new(client, policy, ConnectorMetrics::new("test", "/queue/test"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_connected() {
        let delay = Duration::from_secs(2);
        let mut manager = manager(FlakyClient::new(3), RetryPolicy::forever(delay));
        let shutdown = CancellationToken::new();

        let start = tokio::time::Instant::now();
        manager.ensure_connected(&shutdown).await.unwrap();

        assert_eq!(manager.client().attempts, 4);
        assert!(start.elapsed() >= delay * 3);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.epoch(), 1);
    }

    #[tokio::test]
    async fn test_already_connected_is_a_no_op() {
        let mut manager = manager(FlakyClient::new(0), RetryPolicy::immediate());
        let shutdown = CancellationToken::new();

        manager.ensure_connected(&shutdown).await.unwrap();
        manager.ensure_connected(&shutdown).await.unwrap();

        assert_eq!(manager.client().attempts, 1);
        assert_eq!(manager.epoch(), 1);
    }

    #[tokio::test]
    async fn test_bounded_policy_gives_up() {
        let policy = RetryPolicy::bounded(Duration::ZERO, 2);
        let mut manager = manager(FlakyClient::new(u32::MAX), policy);

        let err = manager
            .ensure_connected(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConnectorError::RetriesExhausted { attempts: 2, .. }
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let mut manager = manager(
            FlakyClient::new(u32::MAX),
            RetryPolicy::forever(Duration::from_secs(3600)),
        );
        let shutdown = CancellationToken::new();

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = manager.ensure_connected(&shutdown).await.unwrap_err();
        assert!(err.is_shutdown());
        assert_eq!(manager.client().attempts, 1);
    }

    #[tokio::test]
    async fn test_closed_signal_carries_connection_epoch() {
        let mut manager = manager(FlakyClient::new(0), RetryPolicy::immediate());
        let mut closed = manager.on_closed();

        manager
            .ensure_connected(&CancellationToken::new())
            .await
            .unwrap();

        let notifier = manager.client().notifier.clone().unwrap();
        assert!(notifier.notify());
        assert_eq!(closed.recv().await, Some(ConnectionClosed { epoch: 1 }));
    }

    #[tokio::test]
    async fn test_subscription_is_stamped_with_epoch() {
        let mut manager = manager(FlakyClient::new(0), RetryPolicy::immediate());
        manager
            .ensure_connected(&CancellationToken::new())
            .await
            .unwrap();

        let subscription = manager.subscribe("/topic/logstash").await.unwrap();
        assert_eq!(subscription.epoch(), 1);
        assert_eq!(subscription.destination(), "/topic/logstash");
    }
}
