//! Event bus: best-effort fan-out of decoded frames, log lines, and
//! connection-state changes to zero or more subscribers.
//!
//! Built on `tokio::sync::broadcast`: publishing never blocks on a slow
//! subscriber (a lagging receiver just misses messages and finds out via
//! `RecvError::Lagged` next time it polls), and publishing with zero
//! subscribers is a harmless no-op.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::decode::DecodedTransaction;

/// One of the three push topics on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum GatewayEvent {
    /// A decoded transaction for one pump.
    PumpMessage {
        /// Pump bus address.
        address: u8,
        /// Milliseconds since the Unix epoch.
        timestamp_ms: u64,
        /// The decoded transaction.
        transaction: DecodedTransaction,
        /// Hex dump of the frame it came from.
        raw_hex: String,
    },
    /// A log line, categorized by [`LogKind`].
    Log {
        /// Milliseconds since the Unix epoch.
        ts_ms: u64,
        /// Log category.
        kind: LogKind,
        /// Human-readable message.
        message: String,
        /// Optional structured detail.
        data: Option<String>,
        /// Optional hex dump.
        hex: Option<String>,
    },
    /// Serial connection up/down.
    ConnectionStatus {
        /// Whether the serial device is currently open.
        connected: bool,
        /// Error description, if the transition was caused by a failure.
        error: Option<String>,
    },
}

/// Log line category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Raw bytes as read off the wire.
    Raw,
    /// A complete extracted frame.
    Frame,
    /// A successfully decoded transaction.
    Decoded,
    /// An outbound frame that was sent.
    Sent,
    /// An error condition.
    Error,
    /// A recognized-but-unsupported transaction.
    Unknown,
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Channel capacity for the broadcast bus. A subscriber more than this
/// many events behind is dropped.
const BUS_CAPACITY: usize = 1024;

/// Fan-out publisher/subscriber handle.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new bus with no subscribers yet.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribe to the bus. Each subscriber gets every event published
    /// from this point on, independent of other subscribers' consumption
    /// rate.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Never blocks; a no-subscriber bus silently drops
    /// it.
    pub fn publish(&self, event: GatewayEvent) {
        let _ = self.tx.send(event);
    }

    /// Publish a decoded transaction as a `PumpMessage`. `timestamp_ms` is
    /// supplied by the caller rather than sampled here, so that every
    /// transaction decoded from the same inbound frame shares one
    /// timestamp.
    pub fn publish_pump_message(
        &self,
        address: u8,
        timestamp_ms: u64,
        transaction: DecodedTransaction,
        raw_hex: String,
    ) {
        self.publish(GatewayEvent::PumpMessage {
            address,
            timestamp_ms,
            transaction,
            raw_hex,
        });
    }

    /// Publish a log line.
    pub fn publish_log(
        &self,
        kind: LogKind,
        message: impl Into<String>,
        data: Option<String>,
        hex: Option<String>,
    ) {
        self.publish(GatewayEvent::Log {
            ts_ms: now_ms(),
            kind,
            message: message.into(),
            data,
            hex,
        });
    }

    /// Publish a connection-state transition.
    pub fn publish_connection(&self, connected: bool, error: Option<String>) {
        self.publish(GatewayEvent::ConnectionStatus { connected, error });
    }
}
