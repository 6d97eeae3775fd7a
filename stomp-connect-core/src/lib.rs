//! # STOMP Connect Core
//!
//! Core library for the STOMP source connector.
//!
//! It keeps a subscription to one STOMP destination alive across broker
//! restarts and network failures, turns every delivered message into one or
//! more structured [`Event`]s and pushes them to an [`EventSink`]. The wire
//! protocol lives behind the [`BrokerClient`] trait so the subscription loop
//! can be driven by any client, including in-memory fakes in tests.
//!
//! ## Overview
//!
//! - [`ConnectionManager`] connects with a fixed-delay [`RetryPolicy`] and tags
//!   every connection with an epoch
//! - [`SourceRuntime`] runs the subscription loop: deliver, resubscribe on
//!   connection loss, stop on shutdown
//! - [`EventBuilder`] decodes message bodies with a [`Codec`], decorates the
//!   events and projects the configured message headers into event fields
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stomp_connect_core::{
//!     BrokerClient, ChannelSink, ConnectorConfig, ConnectorResult, SourceRuntime, StompConfig,
//! };
//!
//! async fn run<B: BrokerClient>(client: B) -> ConnectorResult<()> {
//!     let config = ConnectorConfig::from_env()?;
//!     let stomp = StompConfig::from_env()?;
//!
//!     let (sink, mut events) = ChannelSink::new(128);
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     SourceRuntime::new(client, sink, &config, &stomp)?.run().await
//! }
//! ```

mod builder;
mod codec;
mod config;
mod connection;
mod decorate;
mod error;
mod event;
mod message;
mod metrics;
mod retry;
mod runtime;
mod sink;
mod subscription;
mod traits;

// Re-export public API
pub use builder::EventBuilder;
pub use codec::{Codec, CodecKind, JsonCodec, JsonLinesCodec, LineCodec, PlainCodec};
pub use config::{ConnectorConfig, OutputKind, StompConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use decorate::{
    Decorator, PipelineDecorator, EVENT_VERSION, TAGS_FIELD, TIMESTAMP_FIELD, TYPE_FIELD,
    VERSION_FIELD,
};
pub use error::{BoxError, ConnectorError, ConnectorResult};
pub use event::{Event, MESSAGE_FIELD};
pub use message::RawMessage;
pub use metrics::ConnectorMetrics;
pub use retry::{RetryPolicy, DEFAULT_RECONNECT_DELAY};
pub use runtime::{LoopState, SourceRuntime};
pub use sink::{ChannelSink, DanubeSink, StdoutSink};
pub use subscription::Subscription;
pub use traits::{BrokerClient, ClosedNotifier, ConnectionClosed, EventSink};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
