//! STOMP client over TCP.
//!
//! One reader task per connection owns the read half of the socket. It routes
//! MESSAGE frames to their subscription channel, completes pending receipts
//! and fires the closed notifier when the server goes away. Writes happen on
//! the caller's task.

use crate::codec::StompCodec;
use crate::frame::{Command, Frame};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stomp_connect_core::{
    BrokerClient, ClosedNotifier, ConnectorError, ConnectorResult, RawMessage, StompConfig,
    Subscription,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

/// Outcome of a frame sent with a `receipt` header
type ReceiptResult = Result<(), String>;

/// State shared between the client and its reader task
#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    /// Set before a requested close so the reader does not report it
    closing: AtomicBool,
    routes: Mutex<HashMap<String, mpsc::Sender<RawMessage>>>,
    receipts: Mutex<HashMap<String, oneshot::Sender<ReceiptResult>>>,
}

struct Connection {
    writer: FramedWrite<OwnedWriteHalf, StompCodec>,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    version: String,
}

/// [`BrokerClient`] speaking STOMP 1.0 to 1.2
pub struct StompClient {
    config: StompConfig,
    connection: Option<Connection>,
    next_subscription: u64,
    next_receipt: u64,
}

impl StompClient {
    pub fn new(config: StompConfig) -> Self {
        Self {
            config,
            connection: None,
            next_subscription: 0,
            next_receipt: 0,
        }
    }

    /// Protocol version negotiated with the server
    pub fn version(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.version.as_str())
    }

    fn next_receipt(&mut self) -> String {
        self.next_receipt += 1;
        format!("receipt-{}", self.next_receipt)
    }

    fn live(&mut self) -> ConnectorResult<&mut Connection> {
        match self.connection.as_mut() {
            Some(conn) if conn.shared.connected.load(Ordering::Acquire) => Ok(conn),
            _ => Err(ConnectorError::connection("not connected to stomp server")),
        }
    }

    /// Drop the current connection without reporting it as lost
    fn teardown(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.shared.closing.store(true, Ordering::Release);
            conn.shared.connected.store(false, Ordering::Release);
            conn.reader.abort();
        }
    }

    /// Send `frame` and wait for the server to acknowledge `receipt`
    async fn request(&mut self, frame: Frame, receipt: String) -> ConnectorResult<()> {
        let wait = self.config.connect_timeout();
        let conn = self.live()?;

        let (tx, rx) = oneshot::channel();
        conn.shared.receipts.lock().await.insert(receipt.clone(), tx);

        if let Err(e) = conn.writer.send(frame).await {
            conn.shared.receipts.lock().await.remove(&receipt);
            return Err(e);
        }

        match timeout(wait, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(ConnectorError::connection(format!(
                "stomp server error: {}",
                message
            ))),
            Ok(Err(_)) => Err(ConnectorError::connection(
                "connection closed before receipt arrived",
            )),
            Err(_) => {
                conn.shared.receipts.lock().await.remove(&receipt);
                Err(ConnectorError::timeout(format!(
                    "no {} from stomp server within {:?}",
                    receipt, wait
                )))
            }
        }
    }
}

impl Drop for StompClient {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[async_trait]
impl BrokerClient for StompClient {
    async fn connect(&mut self, on_closed: ClosedNotifier) -> ConnectorResult<()> {
        self.teardown();

        let address = self.config.address();
        let wait = self.config.connect_timeout();

        let stream = timeout(wait, TcpStream::connect(&address))
            .await
            .map_err(|_| ConnectorError::timeout(format!("connecting to {} timed out", address)))?
            .map_err(|e| {
                ConnectorError::connection_with_source(
                    format!("failed to connect to {}", address),
                    e,
                )
            })?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, StompCodec::new());
        let mut writer = FramedWrite::new(write_half, StompCodec::new());

        writer
            .send(Frame::connect(
                self.config.host_header(),
                &self.config.user,
                &self.config.password,
            ))
            .await?;

        let reply = match timeout(wait, reader.next()).await {
            Ok(Some(frame)) => frame?,
            Ok(None) => {
                return Err(ConnectorError::connection(
                    "stomp server closed the connection during handshake",
                ))
            }
            Err(_) => {
                return Err(ConnectorError::timeout(format!(
                    "no CONNECTED frame from {} within {:?}",
                    address, wait
                )))
            }
        };

        match reply.command {
            Command::Connected => {}
            Command::Error => {
                return Err(ConnectorError::connection(format!(
                    "stomp server refused the connection: {}",
                    reply.error_message()
                )))
            }
            other => {
                return Err(ConnectorError::connection(format!(
                    "unexpected {} frame during handshake",
                    other
                )))
            }
        }

        // Servers that omit the version speak STOMP 1.0, which has no escaping
        let version = reply.header("version").unwrap_or("1.0").to_string();
        if version == "1.0" {
            reader.decoder_mut().set_escaping(false);
            writer.encoder_mut().set_escaping(false);
        }

        debug!(
            address = %address,
            version = %version,
            server = reply.header("server").unwrap_or("unknown"),
            "STOMP session established"
        );

        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::Release);

        let reader = tokio::spawn(read_loop(reader, shared.clone(), on_closed));

        self.connection = Some(Connection {
            writer,
            shared,
            reader,
            version,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.shared.connected.load(Ordering::Acquire))
    }

    async fn subscribe(&mut self, destination: &str) -> ConnectorResult<Subscription> {
        let shared = self.live()?.shared.clone();

        self.next_subscription += 1;
        let id = format!("sub-{}", self.next_subscription);
        let receipt = self.next_receipt();

        // Route first: the broker may deliver right after the receipt
        let (tx, rx) = mpsc::channel(self.config.message_buffer.max(1));
        shared.routes.lock().await.insert(id.clone(), tx);

        if let Err(e) = self
            .request(Frame::subscribe(destination, &id, &receipt), receipt)
            .await
        {
            shared.routes.lock().await.remove(&id);
            return Err(e);
        }

        debug!(destination = %destination, subscription = %id, "Subscription acknowledged");
        Ok(Subscription::new(id, destination, rx))
    }

    async fn unsubscribe(&mut self, subscription: &Subscription) -> ConnectorResult<()> {
        let conn = self.live()?;
        conn.shared.routes.lock().await.remove(subscription.id());
        conn.writer.send(Frame::unsubscribe(subscription.id())).await
    }

    async fn disconnect(&mut self) -> ConnectorResult<()> {
        let Some(conn) = self.connection.as_ref() else {
            return Ok(());
        };
        conn.shared.closing.store(true, Ordering::Release);

        let result = if self.is_connected() {
            let receipt = self.next_receipt();
            self.request(Frame::disconnect(&receipt), receipt).await
        } else {
            Ok(())
        };

        if let Some(mut conn) = self.connection.take() {
            if let Err(e) = conn.writer.close().await {
                debug!(error = %e, "Failed to close stomp socket");
            }
            conn.shared.connected.store(false, Ordering::Release);
            conn.reader.abort();
        }

        result
    }
}

/// Marks the connection lost when the reader task ends, even by panic
struct ReaderGuard {
    shared: Arc<Shared>,
    on_closed: ClosedNotifier,
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.shared.connected.store(false, Ordering::Release);

        // Already empty after a clean exit
        if let Ok(mut routes) = self.shared.routes.try_lock() {
            routes.clear();
        }
        if let Ok(mut receipts) = self.shared.receipts.try_lock() {
            receipts.clear();
        }

        if !self.shared.closing.load(Ordering::Acquire) {
            debug!(epoch = self.on_closed.epoch(), "Connection to stomp server lost");
            self.on_closed.notify();
        }
    }
}

async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, StompCodec>,
    shared: Arc<Shared>,
    on_closed: ClosedNotifier,
) {
    let _guard = ReaderGuard {
        shared: shared.clone(),
        on_closed,
    };

    while let Some(result) = reader.next().await {
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to read frame from stomp server");
                break;
            }
        };

        match frame.command {
            Command::Message => dispatch(&shared, frame).await,
            Command::Receipt => {
                if let Some(id) = frame.header("receipt-id") {
                    if let Some(tx) = shared.receipts.lock().await.remove(id) {
                        let _ = tx.send(Ok(()));
                    }
                }
            }
            Command::Error => {
                let message = frame.error_message();
                warn!(error = %message, "Received ERROR frame from stomp server");

                if let Some(id) = frame.header("receipt-id") {
                    if let Some(tx) = shared.receipts.lock().await.remove(id) {
                        let _ = tx.send(Err(message));
                    }
                }
            }
            other => debug!(command = %other, "Ignoring unexpected frame"),
        }
    }

    shared.connected.store(false, Ordering::Release);
    shared.routes.lock().await.clear();
    shared.receipts.lock().await.clear();
}

/// Hand a MESSAGE frame to its subscription, waiting while the channel is full
async fn dispatch(shared: &Shared, frame: Frame) {
    let Some(id) = frame.header("subscription").map(str::to_string) else {
        debug!("Dropping message without subscription header");
        return;
    };

    let route = shared.routes.lock().await.get(&id).cloned();
    let Some(route) = route else {
        debug!(subscription = %id, "Dropping message for unknown subscription");
        return;
    };

    if route.send(frame.into_raw_message()).await.is_err() {
        shared.routes.lock().await.remove(&id);
    }
}
