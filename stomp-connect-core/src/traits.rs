//! Collaborator traits: the broker client and the output sink.

use crate::event::Event;
use crate::subscription::Subscription;
use crate::ConnectorResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Signal that the connection with the given epoch was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionClosed {
    pub epoch: u64,
}

/// Handle a broker client uses to report that its connection closed
///
/// One notifier is handed to the client per connect attempt. The client fires
/// it when the connection it established goes away; it must not fire it for
/// connections closed on request via [`BrokerClient::disconnect`].
#[derive(Debug, Clone)]
pub struct ClosedNotifier {
    epoch: u64,
    tx: mpsc::UnboundedSender<ConnectionClosed>,
}

impl ClosedNotifier {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<ConnectionClosed>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report the closure; returns `false` if nobody is listening
    pub fn notify(&self) -> bool {
        self.tx
            .send(ConnectionClosed { epoch: self.epoch })
            .is_ok()
    }
}

/// Client side of the broker wire protocol
///
/// Implementations own the transport. Messages for a subscription are
/// delivered through the channel inside the returned [`Subscription`], in the
/// order the broker sent them.
#[async_trait]
pub trait BrokerClient: Send {
    /// Open a connection and authenticate
    ///
    /// `on_closed` must be fired once if the established connection is lost.
    async fn connect(&mut self, on_closed: ClosedNotifier) -> ConnectorResult<()>;

    /// Whether the last established connection is still up
    fn is_connected(&self) -> bool;

    /// Subscribe to `destination`; returns once the broker acknowledged it
    async fn subscribe(&mut self, destination: &str) -> ConnectorResult<Subscription>;

    /// Cancel a subscription on the current connection
    async fn unsubscribe(&mut self, subscription: &Subscription) -> ConnectorResult<()>;

    /// Close the connection without firing the closed notifier
    async fn disconnect(&mut self) -> ConnectorResult<()>;
}

/// Output channel of the host pipeline
///
/// `push` may wait when the sink applies backpressure.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn push(&self, event: Event) -> ConnectorResult<()>;

    /// Flush and release resources
    async fn close(&self) -> ConnectorResult<()> {
        Ok(())
    }
}
