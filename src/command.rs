//! Transaction encoder: maps typed supervisor command requests onto
//! `(TRANS, LNG, DATA)` triples.
//!
//! Validation happens here, before any byte is emitted, so an
//! [`Error::InvalidArgument`] aborts the whole command rather than
//! producing a partial frame.

use serde::{Deserialize, Serialize};

use crate::bcd::{encode_bcd, encode_price, encode_vol_or_amount};
use crate::error::{Error, Result};
use crate::frame::Transaction;

/// CD1 single-byte commands recognized by the pump.
///
/// Only `RESET` and `AUTHORIZE` carry default control-byte overrides; the
/// rest are named and left as raw codes otherwise.
pub mod cd1 {
    /// Request current status.
    pub const STATUS: u8 = 0x00;
    /// Stop the current fueling.
    pub const STOP: u8 = 0x02;
    /// Switch the pump off.
    pub const SWITCH_OFF: u8 = 0x03;
    /// Request filling info.
    pub const FILLING_INFO: u8 = 0x04;
    /// Reset the pump. Gets control byte `0x39` when unspecified.
    pub const RESET: u8 = 0x05;
    /// Authorize a fill. Gets control byte `0x3C` when unspecified.
    pub const AUTHORIZE: u8 = 0x06;
    /// Request pump identity.
    pub const IDENTITY: u8 = 0x08;
    /// Request current unit prices.
    pub const PRICES: u8 = 0x0A;

    /// All CD1 command bytes the pump accepts.
    pub const RECOGNIZED: &[u8] = &[
        STATUS,
        STOP,
        SWITCH_OFF,
        FILLING_INFO,
        RESET,
        AUTHORIZE,
        IDENTITY,
        PRICES,
        0x0D,
        0x0E,
        0x0F,
    ];
}

/// A typed supervisor command, prior to wire encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CommandRequest {
    /// CD1: single-byte command. Use constants in [`cd1`].
    Cd1(u8),
    /// CD2: allowed-nozzle set, each in `1..=15`.
    AllowedNozzles(Vec<u8>),
    /// CD3: preset volume, litres.
    PresetVolume(f64),
    /// CD4: preset amount, currency units.
    PresetAmount(f64),
    /// CD5: one or more unit prices to push to the pump.
    PriceUpdate(Vec<f64>),
    /// CD7: output function and output command bytes.
    OutputFunction {
        /// Output function selector.
        function: u8,
        /// Output command value.
        command: u8,
    },
    /// CD9: pump parameters.
    PumpParameters {
        /// Display volume decimals.
        dp_vol: u8,
        /// Display amount decimals.
        dp_amo: u8,
        /// Display unit-price decimals.
        dp_unp: u8,
        /// Maximum preset amount.
        max_amount: Option<f64>,
    },
    /// CD13: filling type, `false` = cash, `true` = credit.
    FillingType(bool),
    /// CD14: suspend nozzle.
    Suspend(u8),
    /// CD15: resume nozzle.
    Resume(u8),
    /// CD101: request a total-counter readout.
    RequestCounters(u8),
}

fn valid_counter(counter: u8) -> bool {
    (0x01..=0x09).contains(&counter) || (0x11..=0x19).contains(&counter)
}

/// Encode a [`CommandRequest`] into its wire `(TRANS, LNG, DATA)` form.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if any field is out of its legal
/// range.
pub fn encode(req: &CommandRequest) -> Result<Transaction> {
    match req {
        CommandRequest::Cd1(cmd) => {
            if !cd1::RECOGNIZED.contains(cmd) {
                return Err(Error::InvalidArgument(format!(
                    "unrecognized CD1 command {cmd:#04x}"
                )));
            }
            Transaction::new(1, vec![*cmd])
        }
        CommandRequest::AllowedNozzles(nozzles) => {
            if nozzles.is_empty() {
                return Err(Error::InvalidArgument(
                    "CD2 requires at least one nozzle".into(),
                ));
            }
            for &n in nozzles {
                if !(1..=15).contains(&n) {
                    return Err(Error::InvalidArgument(format!(
                        "nozzle {n} out of range 1..=15"
                    )));
                }
            }
            Transaction::new(2, nozzles.clone())
        }
        CommandRequest::PresetVolume(v) => {
            Transaction::new(3, encode_vol_or_amount(*v)?.to_vec())
        }
        CommandRequest::PresetAmount(a) => {
            Transaction::new(4, encode_vol_or_amount(*a)?.to_vec())
        }
        CommandRequest::PriceUpdate(prices) => {
            if prices.is_empty() {
                return Err(Error::InvalidArgument(
                    "CD5 requires at least one price".into(),
                ));
            }
            let mut data = Vec::with_capacity(prices.len() * 3);
            for p in prices {
                data.extend_from_slice(&encode_price(*p)?);
            }
            Transaction::new(5, data)
        }
        CommandRequest::OutputFunction { function, command } => {
            Transaction::new(7, vec![*function, *command])
        }
        CommandRequest::PumpParameters {
            dp_vol,
            dp_amo,
            dp_unp,
            max_amount,
        } => {
            // 22 reserved + dpVol + dpAmo + dpUnp + 5 reserved + 4-byte
            // maxAmount + 17 reserved = 51 bytes total.
            let mut data = vec![0u8; 22];
            data.push(*dp_vol);
            data.push(*dp_amo);
            data.push(*dp_unp);
            data.extend(std::iter::repeat_n(0u8, 5));
            data.extend_from_slice(&encode_vol_or_amount(max_amount.unwrap_or(0.0))?);
            data.extend(std::iter::repeat_n(0u8, 17));
            debug_assert_eq!(data.len(), 51);
            Transaction::new(9, data)
        }
        CommandRequest::FillingType(credit) => {
            Transaction::new(13, vec![if *credit { 1 } else { 0 }])
        }
        CommandRequest::Suspend(nozzle) => {
            if *nozzle > 15 {
                return Err(Error::InvalidArgument(format!(
                    "nozzle {nozzle} out of range 0..=15"
                )));
            }
            Transaction::new(14, vec![*nozzle])
        }
        CommandRequest::Resume(nozzle) => {
            if *nozzle > 15 {
                return Err(Error::InvalidArgument(format!(
                    "nozzle {nozzle} out of range 0..=15"
                )));
            }
            Transaction::new(15, vec![*nozzle])
        }
        CommandRequest::RequestCounters(counter) => {
            if !valid_counter(*counter) {
                return Err(Error::InvalidArgument(format!(
                    "counter id {counter:#04x} out of range"
                )));
            }
            Transaction::new(101, vec![*counter])
        }
    }
}

/// Encode a raw BCD byte sequence of the given width. Exposed for callers
/// building CD9/CD101-adjacent payloads that need ad hoc BCD fields.
pub fn bcd(value: u64, width: usize) -> Result<Vec<u8>> {
    encode_bcd(value, width)
}
