//! Gateway configuration.
//!
//! Intentionally tiny: the three durable parameters a deployment needs,
//! with no persistence layer of its own — the binary is responsible for
//! sourcing these from CLI flags or environment and handing them to the
//! library.

use crate::error::{Error, Result};
use crate::frame::validate_address;

/// Durable gateway parameters: which device to open, at what baud, and
/// which pump address this instance talks to.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`.
    pub port: String,
    /// Baud rate. Typical values are 9600/19200/38400/57600/115200.
    pub baud: u32,
    /// The pump address this gateway instance talks to.
    pub pump_address: u8,
}

impl GatewayConfig {
    /// Build a config, validating the pump address up front.
    ///
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `pump_address` is outside
    /// `0x50..=0x6F`, or [`Error::Config`] if `port` is empty.
    pub fn new(port: impl Into<String>, baud: u32, pump_address: u8) -> Result<Self> {
        let port = port.into();
        if port.is_empty() {
            return Err(Error::Config("serial device path is empty".into()));
        }
        validate_address(pump_address)?;
        Ok(Self {
            port,
            baud,
            pump_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_address() {
        assert!(GatewayConfig::new("/dev/ttyUSB0", 9600, 0x10).is_err());
    }

    #[test]
    fn rejects_empty_port() {
        assert!(GatewayConfig::new("", 9600, 0x50).is_err());
    }

    #[test]
    fn accepts_valid_config() {
        let c = GatewayConfig::new("/dev/ttyUSB0", 9600, 0x50).unwrap();
        assert_eq!(c.baud, 9600);
    }
}
