//! Runtime for managing the connector lifecycle.
//!
//! The runtime handles:
//! - Broker connection management with reconnect
//! - Subscribing and resubscribing to the destination
//! - Turning messages into events and pushing them to the sink
//! - Graceful shutdown

mod source_runtime;

pub use source_runtime::{LoopState, SourceRuntime};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel `shutdown` on SIGINT; the listener exits once `shutdown` is cancelled
pub(crate) fn spawn_ctrl_c_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(e) => {
                        error!("Failed to listen for ctrl-c: {}", e);
                        return;
                    }
                }
                shutdown.cancel();
            }
        }
    });
}
