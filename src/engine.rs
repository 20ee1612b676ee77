//! Protocol engine: orchestrates both directions of the gateway.
//!
//! Ingress: heartbeat filter → pattern match → structural parse → event
//! emission, exactly in that order. Egress: validate → transaction
//! encode → control-byte selection → frame build → hand to transport.
//!
//! The engine deliberately never sends an acknowledgment frame in
//! response to inbound traffic: an earlier iteration did, and it induced
//! a runaway status-churn loop on the reference hardware. Do not "fix"
//! this without new protocol evidence.

use log::{debug, warn};

use crate::command::{cd1, CommandRequest};
use crate::decode::{self, DecodedTransaction, DEFAULT_PRICE_RANGE};
use crate::error::{Error, Result};
use crate::events::{EventBus, LogKind};
use crate::frame::{self, ParsedFrame, Transaction};
use crate::pattern;
use crate::state::{NozzleReading, StateProjector};
use crate::transport::{IngressBuffer, Transport};

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

/// Orchestrates the ingress and egress pipelines against one RS-485
/// segment. Owns the reassembly buffer and the per-pump projection; both
/// are mutated only from here.
pub struct ProtocolEngine {
    ingress: IngressBuffer,
    projector: StateProjector,
    bus: EventBus,
    price_range: (f64, f64),
    next_command_id: u64,
}

impl ProtocolEngine {
    /// Create a new engine publishing to `bus`, using the default DC3
    /// price-acceptance range.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self::with_price_range(bus, DEFAULT_PRICE_RANGE)
    }

    /// Create a new engine with a market-specific DC3 price range.
    #[must_use]
    pub fn with_price_range(bus: EventBus, price_range: (f64, f64)) -> Self {
        Self {
            ingress: IngressBuffer::new(),
            projector: StateProjector::new(),
            bus,
            price_range,
            next_command_id: 0,
        }
    }

    /// Read-only access to the per-pump projection, for `get_status`-style
    /// queries.
    #[must_use]
    pub fn projector(&self) -> &StateProjector {
        &self.projector
    }

    /// Discard any partial frame buffered from the transport. Call this
    /// after a transport fault so reassembly starts clean once the
    /// connection comes back.
    pub fn reset_ingress(&mut self) {
        self.ingress.reset();
    }

    /// Feed newly read bytes into the reassembly buffer and run the
    /// ingress pipeline over every complete frame it yields.
    pub fn process_inbound(&mut self, bytes: &[u8]) {
        let now = std::time::Instant::now();
        let timestamp_ms = crate::events::now_ms();
        for frame in self.ingress.push_and_extract(bytes) {
            self.process_frame(&frame, now, timestamp_ms);
        }
    }

    fn process_frame(&mut self, frame: &[u8], now: std::time::Instant, timestamp_ms: u64) {
        self.bus
            .publish_log(LogKind::Raw, "frame received", None, Some(hex_dump(frame)));

        if frame.len() < 6 {
            debug!("dropping frame shorter than 6 bytes");
            return;
        }
        let address = frame[0];
        if frame::validate_address(address).is_err() {
            debug!("dropping frame with out-of-range address {address:#04x}");
            return;
        }
        if pattern::is_heartbeat(frame) {
            return;
        }

        if let Some((addr, decoded)) = pattern::match_status_frame(frame) {
            self.emit(addr, decoded, frame, now, timestamp_ms);
            return;
        }

        let parsed = match frame::parse_frame(frame) {
            Ok(p) => p,
            Err(e) => {
                self.bus.publish_log(
                    LogKind::Error,
                    format!("malformed frame: {e}"),
                    None,
                    Some(hex_dump(frame)),
                );
                return;
            }
        };
        self.process_parsed(&parsed, frame, now, timestamp_ms);
    }

    fn process_parsed(
        &mut self,
        parsed: &ParsedFrame,
        raw: &[u8],
        now: std::time::Instant,
        timestamp_ms: u64,
    ) {
        if parsed.transactions.is_empty() {
            self.bus.publish_log(
                LogKind::Error,
                "unrecognized frame: no transactions decoded",
                None,
                Some(hex_dump(raw)),
            );
            return;
        }
        let mut any_emitted = false;
        for tx in &parsed.transactions {
            match decode::decode(tx, self.price_range) {
                Ok(Some(decoded)) => {
                    any_emitted = true;
                    self.emit(parsed.address, decoded, raw, now, timestamp_ms);
                }
                Ok(None) => {
                    // Structurally valid but filtered (e.g. DC3 out of
                    // price range). Not an error, not emitted.
                }
                Err(Error::UnknownTransaction { trans, lng }) => {
                    self.bus.publish_log(
                        LogKind::Unknown,
                        format!("unknown transaction {trans:#04x} ({lng} bytes)"),
                        None,
                        None,
                    );
                }
                Err(e) => {
                    warn!("unexpected decode error: {e}");
                }
            }
        }
        if !any_emitted && parsed.transactions.iter().all(|t| {
            matches!(
                decode::decode(t, self.price_range),
                Ok(None) | Err(Error::UnknownTransaction { .. })
            )
        }) {
            self.bus.publish_log(
                LogKind::Error,
                "unrecognized frame: no transactions decoded",
                None,
                Some(hex_dump(raw)),
            );
        }
    }

    fn emit(
        &mut self,
        address: u8,
        decoded: DecodedTransaction,
        raw: &[u8],
        now: std::time::Instant,
        timestamp_ms: u64,
    ) {
        match &decoded {
            DecodedTransaction::Status(s) => {
                self.projector.observe_status(address, *s, now);
            }
            DecodedTransaction::VolumeAmount { volume, amount } => {
                self.projector
                    .observe_volume_amount(address, *volume, *amount, now);
            }
            DecodedTransaction::NozzlePrice {
                price,
                nozzle,
                nozzle_out,
            } => {
                self.projector.observe_nozzle(
                    address,
                    NozzleReading {
                        price: *price,
                        nozzle: *nozzle,
                        nozzle_out: *nozzle_out,
                    },
                    now,
                );
            }
            DecodedTransaction::Identity(id) => {
                self.projector.observe_identity(address, id.clone(), now);
            }
            _ => {}
        }
        self.bus
            .publish_pump_message(address, timestamp_ms, decoded, hex_dump(raw));
    }

    /// Pick the control byte for an outbound CD1, when the supervisor
    /// doesn't supply one: empirically, RESET and
    /// AUTHORIZE need distinct values to produce correct pump behaviour.
    #[must_use]
    pub fn default_control_byte(req: &CommandRequest) -> u8 {
        match req {
            CommandRequest::Cd1(cmd) if *cmd == cd1::RESET => 0x39,
            CommandRequest::Cd1(cmd) if *cmd == cd1::AUTHORIZE => 0x3C,
            _ => 0x00,
        }
    }

    /// Build, log, and send a command frame. Publishes the `sent` log
    /// event before the write is attempted, so observers see the request
    /// even if the transport write fails.
    ///
    /// # Errors
    /// Returns [`Error::InvalidAddress`]/[`Error::InvalidArgument`] if
    /// validation fails (no byte is written in that case), or
    /// [`Error::Transport`] if the write itself fails.
    pub async fn send_command(
        &mut self,
        req: &CommandRequest,
        address: u8,
        control: Option<u8>,
        transport: &mut Transport,
    ) -> Result<SentCommand> {
        frame::validate_address(address)?;
        let tx = crate::command::encode(req)?;
        let ctrl = control.unwrap_or_else(|| Self::default_control_byte(req));
        let built = frame::build_frame(address, ctrl, &[Transaction::new(tx.trans, tx.data)?])?;

        self.next_command_id += 1;
        let command_id = self.next_command_id;
        self.bus.publish_log(
            LogKind::Sent,
            format!("sending command {command_id} to {address:#04x}, ctrl={ctrl:#04x}"),
            None,
            Some(hex_dump(&built)),
        );

        transport.write_frame(&built).await?;

        Ok(SentCommand {
            command_id,
            address,
            control: ctrl,
            frame: built,
        })
    }
}

/// Result of a successful [`ProtocolEngine::send_command`] call.
#[derive(Debug, Clone)]
pub struct SentCommand {
    /// Monotonically increasing id assigned by the engine.
    pub command_id: u64,
    /// Destination pump address.
    pub address: u8,
    /// Control byte actually used.
    pub control: u8,
    /// The exact bytes written to the wire.
    pub frame: Vec<u8>,
}
