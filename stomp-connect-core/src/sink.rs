//! Output sinks for built events.

use crate::config::ConnectorConfig;
use crate::event::Event;
use crate::traits::EventSink;
use crate::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use danube_client::{DanubeClient, Producer};
use std::collections::HashMap;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// Pushes events into a bounded channel
///
/// `push` waits while the channel is full, which slows the subscription loop
/// down and, through the client's bounded delivery channel, the broker too.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Event>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn from_sender(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn push(&self, event: Event) -> ConnectorResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ConnectorError::fatal("output channel closed"))
    }
}

/// Writes every event as one JSON line on standard output
#[derive(Debug)]
pub struct StdoutSink {
    out: Mutex<Stdout>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for StdoutSink {
    async fn push(&self, event: Event) -> ConnectorResult<()> {
        let mut line = event.to_json_vec()?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        out.flush().await?;
        Ok(())
    }

    async fn close(&self) -> ConnectorResult<()> {
        self.out.lock().await.flush().await?;
        Ok(())
    }
}

/// Publishes every event as a JSON document to a Danube topic
pub struct DanubeSink {
    producer: Mutex<Producer>,
    topic: String,
    attributes: HashMap<String, String>,
}

impl DanubeSink {
    /// Connect to Danube and create the producer for `destination_topic`
    pub async fn connect(config: &ConnectorConfig) -> ConnectorResult<Self> {
        let topic = config.destination_topic.clone().ok_or_else(|| {
            ConnectorError::config("destination_topic is required when output is danube")
        })?;

        info!("Danube URL: {}", config.danube_service_url);

        let client = DanubeClient::builder()
            .service_url(&config.danube_service_url)
            .build()
            .await
            .map_err(|e| ConnectorError::fatal_with_source("Failed to create Danube client", e))?;

        // Generate producer name: connector_name-topic_name
        let topic_suffix = topic.replace('/', "-");
        let producer_name = format!("{}{}", config.connector_name, topic_suffix);

        let mut producer_builder = client
            .new_producer()
            .with_topic(&topic)
            .with_name(&producer_name);

        if config.reliable_dispatch {
            producer_builder = producer_builder.with_reliable_dispatch();
        }

        let mut producer = producer_builder.build();
        producer.create().await.map_err(|e| {
            ConnectorError::fatal_with_source(
                format!("Failed to create producer for topic {}", topic),
                e,
            )
        })?;

        info!("Producer created successfully for topic: {}", topic);

        let mut attributes = HashMap::new();
        attributes.insert("source".to_string(), "stomp".to_string());
        attributes.insert("connector".to_string(), config.connector_name.clone());

        Ok(Self {
            producer: Mutex::new(producer),
            topic,
            attributes,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl EventSink for DanubeSink {
    async fn push(&self, event: Event) -> ConnectorResult<()> {
        let payload = event.to_json_vec()?;

        let mut producer = self.producer.lock().await;
        let message_id = producer
            .send(payload, Some(self.attributes.clone()))
            .await
            .map_err(|e| {
                ConnectorError::connection_with_source(
                    format!("Failed to publish event to {}", self.topic),
                    e,
                )
            })?;

        debug!("Event published: {}", message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new(4);

        sink.push(Event::from_message("first")).await.unwrap();
        sink.push(Event::from_message("second")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().get_str("message"), Some("first"));
        assert_eq!(rx.recv().await.unwrap().get_str("message"), Some("second"));
    }

    #[tokio::test]
    async fn test_channel_sink_applies_backpressure() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.push(Event::from_message("fills the buffer")).await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            sink.push(Event::from_message("waits")),
        )
        .await;
        assert!(blocked.is_err());

        rx.recv().await.unwrap();
        sink.push(Event::from_message("fits now")).await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);

        let err = sink.push(Event::new()).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
