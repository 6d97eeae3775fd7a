//! Live subscriptions.

use crate::message::RawMessage;
use tokio::sync::mpsc;

/// A registration on one destination over one connection
///
/// Broker subscriptions are connection-scoped: once the connection that
/// created it goes away the subscription is dropped and a new one is created.
/// Dropping it also drops its delivery channel, so messages still in flight
/// from the old connection are never processed.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    destination: String,
    epoch: u64,
    messages: mpsc::Receiver<RawMessage>,
}

impl Subscription {
    /// Wrap the delivery channel of a subscription created by a broker client
    pub fn new(
        id: impl Into<String>,
        destination: impl Into<String>,
        messages: mpsc::Receiver<RawMessage>,
    ) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            epoch: 0,
            messages,
        }
    }

    /// Broker-side subscription id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Epoch of the connection this subscription was created on
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    /// Next delivered message; `None` once the client dropped the route
    pub async fn recv(&mut self) -> Option<RawMessage> {
        self.messages.recv().await
    }
}
