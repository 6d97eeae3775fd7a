//! Connector metrics.
//!
//! Handles are registered once per runtime through the `metrics` facade and
//! are no-ops until the host installs a recorder.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use std::time::Duration;

/// Metric handles for one connector instance
#[derive(Clone)]
pub struct ConnectorMetrics {
    messages_received: Counter,
    bytes_received: Counter,
    events_pushed: Counter,
    decode_errors: Counter,
    push_errors: Counter,
    connect_attempts: Counter,
    connect_failures: Counter,
    resubscriptions: Counter,
    connected: Gauge,
    health: Gauge,
    processing_time: Histogram,
}

impl ConnectorMetrics {
    /// Register metric handles labelled with connector name and destination
    pub fn new(connector_name: &str, destination: &str) -> Self {
        let labels = [
            ("connector", connector_name.to_string()),
            ("destination", destination.to_string()),
        ];

        Self {
            messages_received: counter!("stomp_connector_messages_received_total", &labels),
            bytes_received: counter!("stomp_connector_bytes_received_total", &labels),
            events_pushed: counter!("stomp_connector_events_pushed_total", &labels),
            decode_errors: counter!("stomp_connector_decode_errors_total", &labels),
            push_errors: counter!("stomp_connector_push_errors_total", &labels),
            connect_attempts: counter!("stomp_connector_connect_attempts_total", &labels),
            connect_failures: counter!("stomp_connector_connect_failures_total", &labels),
            resubscriptions: counter!("stomp_connector_resubscriptions_total", &labels),
            connected: gauge!("stomp_connector_connected", &labels),
            health: gauge!("stomp_connector_health", &labels),
            processing_time: histogram!("stomp_connector_processing_seconds", &labels),
        }
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.increment(1);
        self.bytes_received.increment(bytes as u64);
    }

    pub fn record_success(&self) {
        self.events_pushed.increment(1);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.increment(1);
    }

    pub fn record_push_error(&self) {
        self.push_errors.increment(1);
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.increment(1);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.increment(1);
    }

    pub fn record_resubscribe(&self) {
        self.resubscriptions.increment(1);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(if connected { 1.0 } else { 0.0 });
    }

    pub fn set_health(&self, healthy: bool) {
        self.health.set(if healthy { 1.0 } else { 0.0 });
    }

    /// Record time spent building and pushing the events of one message
    pub fn record_processing_time(&self, duration: Duration) {
        self.processing_time.record(duration.as_secs_f64());
    }
}

impl std::fmt::Debug for ConnectorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorMetrics").finish_non_exhaustive()
    }
}
