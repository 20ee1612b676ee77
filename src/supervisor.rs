//! Supervisor request/response surface.
//!
//! The wire envelope is deliberately dumb — a tagged JSON enum per
//! direction — with one shared boundary validator,
//! [`parse_pump_address`], so every entry point applies the same
//! decimal-or-hex acceptance rule.

use serde::{Deserialize, Serialize};

use crate::command::CommandRequest;
use crate::error::{Error, Result};
use crate::frame::validate_address;

/// A pump address as it arrives from the supervisor: either a JSON
/// number or a string, in decimal or `0x`-prefixed hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PumpAddressInput {
    /// A bare integer, e.g. `80`.
    Int(u8),
    /// A decimal or hex string, e.g. `"80"` or `"0x50"`.
    Text(String),
}

/// Parse and validate a supervisor-supplied pump address into a wire
/// byte.
///
/// # Errors
/// Returns [`Error::InvalidAddress`] if the input isn't parseable as
/// decimal or hex, or if the resulting byte falls outside
/// `0x50..=0x6F`.
pub fn parse_pump_address(input: &PumpAddressInput) -> Result<u8> {
    let byte = match input {
        PumpAddressInput::Int(b) => *b,
        PumpAddressInput::Text(s) => {
            let s = s.trim();
            let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u8::from_str_radix(hex, 16)
            } else {
                s.parse::<u8>()
            };
            parsed.map_err(|_| Error::InvalidAddress(format!("unparsable pump address {s:?}")))?
        }
    };
    validate_address(byte)?;
    Ok(byte)
}

/// A request from the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SupervisorRequest {
    /// Encode, select a control byte, build, and send a frame.
    SendCommand {
        /// The command to encode.
        command: CommandRequest,
        /// Destination pump address.
        pump_address: PumpAddressInput,
        /// Supervisor-supplied control byte override, if any.
        control: Option<u8>,
    },
    /// Read current connection status and configuration.
    GetStatus,
    /// Close (if open) and reopen the transport with new parameters.
    UpdateConfig {
        /// New serial device path.
        port: String,
        /// New baud rate.
        baud: u32,
        /// New pump address.
        pump_address: PumpAddressInput,
    },
}

/// A response to the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SupervisorResponse {
    /// `send_command` succeeded.
    SendCommandOk {
        /// Id assigned by the protocol engine.
        command_id: u64,
        /// Hex dump of the frame written to the wire.
        frame_hex: String,
    },
    /// `get_status` result.
    StatusOk {
        /// Whether the transport is currently open.
        connected: bool,
        /// Current serial device path.
        port: String,
        /// Current baud rate.
        baud: u32,
        /// Current pump address, formatted as `0xNN`.
        pump_address: String,
    },
    /// `update_config` succeeded.
    UpdateConfigOk {
        /// The configuration now in effect.
        port: String,
        /// The configuration now in effect.
        baud: u32,
        /// The configuration now in effect, formatted as `0xNN`.
        pump_address: String,
    },
    /// Any request failed; `reason` is human-readable.
    Err {
        /// Description of the failure.
        reason: String,
    },
}

impl From<Error> for SupervisorResponse {
    fn from(e: Error) -> Self {
        SupervisorResponse::Err {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_decimal_int() {
        assert_eq!(parse_pump_address(&PumpAddressInput::Int(80)).unwrap(), 0x50);
    }

    #[test]
    fn accepts_decimal_string() {
        assert_eq!(
            parse_pump_address(&PumpAddressInput::Text("80".into())).unwrap(),
            0x50
        );
    }

    #[test]
    fn accepts_hex_string() {
        assert_eq!(
            parse_pump_address(&PumpAddressInput::Text("0x50".into())).unwrap(),
            0x50
        );
        assert_eq!(
            parse_pump_address(&PumpAddressInput::Text("0X5F".into())).unwrap(),
            0x5F
        );
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(parse_pump_address(&PumpAddressInput::Int(10)).is_err());
        assert!(parse_pump_address(&PumpAddressInput::Text("0x70".into())).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_pump_address(&PumpAddressInput::Text("pump-1".into())).is_err());
    }
}
