//! `dart_gateway`: a bidirectional bridge between a fuel-pump RS-485
//! half-duplex serial bus speaking the DART line protocol and a
//! supervisory client connected over a message-oriented channel.
//!
//! The hard core lives in [`bcd`], [`crc`], [`frame`], [`command`],
//! [`decode`], and [`pattern`] (the wire codec), [`transport`] (the
//! half-duplex serial driver), [`engine`] (the orchestrator tying codec
//! and transport together), [`state`] (per-pump status projection), and
//! [`events`] (fan-out to subscribers). [`config`] and [`supervisor`]
//! are the thin ambient layer around that core; [`supervisor_net`] is
//! one concrete binding of the supervisor surface onto TCP.

pub mod bcd;
pub mod command;
pub mod config;
pub mod crc;
pub mod decode;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod pattern;
pub mod state;
pub mod supervisor;
pub mod supervisor_net;
pub mod transport;

pub use command::CommandRequest;
pub use config::GatewayConfig;
pub use decode::DecodedTransaction;
pub use engine::{ProtocolEngine, SentCommand};
pub use error::{Error, Result};
pub use events::{EventBus, GatewayEvent, LogKind};
pub use frame::{ParsedFrame, Transaction};
pub use state::{PumpState, StateProjector};
pub use supervisor::{PumpAddressInput, SupervisorRequest, SupervisorResponse};
pub use supervisor_net::GatewayHandle;
pub use transport::{SerialParams, Transport};
