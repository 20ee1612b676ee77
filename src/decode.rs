//! Structural transaction decoder: turns the raw transactions a
//! [`crate::frame::ParsedFrame`] carries into typed [`DecodedTransaction`]
//! values.
//!
//! Represented as a single tagged enum rather than a class hierarchy, one
//! variant per transaction number. Any transaction number not covered by
//! the table below decodes to `None` and is reported by the caller as
//! [`Error::UnknownTransaction`] without aborting the rest of the frame.

use serde::{Deserialize, Serialize};

use crate::bcd::{decode_bcd, decode_identity, decode_price, decode_vol_or_amount};
use crate::error::{Error, Result};
use crate::frame::Transaction;

/// Acceptable DC3 price range: narrow to the reference
/// deployment, parameterized so other markets can override it.
pub const DEFAULT_PRICE_RANGE: (f64, f64) = (0.5, 10.0);

/// A structurally decoded DART transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DecodedTransaction {
    /// DC1: pump status.
    Status(u8),
    /// DC2: filled volume and amount.
    VolumeAmount {
        /// Filled volume, litres.
        volume: f64,
        /// Filled amount, currency units.
        amount: f64,
    },
    /// DC3: nozzle and price. Only ever produced when `price` is within
    /// the configured range; out-of-range DC3s are dropped at decode.
    NozzlePrice {
        /// Unit price.
        price: f64,
        /// Nozzle number (low nibble of NOZIO).
        nozzle: u8,
        /// Whether the nozzle is out (bit 4 of NOZIO).
        nozzle_out: bool,
    },
    /// DC5: alarm code.
    Alarm(u8),
    /// DC7: pump parameters readout.
    PumpParameters {
        /// Display volume decimals.
        dp_vol: u8,
        /// Display amount decimals.
        dp_amo: u8,
        /// Display unit-price decimals.
        dp_unp: u8,
        /// Maximum preset amount.
        max_amount: f64,
        /// Grade bytes.
        grades: Vec<u8>,
    },
    /// DC9: pump identity, 10 decimal digits.
    Identity(String),
    /// DC14: suspend-nozzle reply.
    SuspendReply(u8),
    /// DC15: resume-nozzle reply.
    ResumeReply(u8),
    /// DC101: total counters.
    Counters {
        /// Counter id.
        counter: u8,
        /// Total value.
        tot_val: u64,
        /// Total, month minus 1.
        tot_m1: u64,
        /// Total, month minus 2 (0 if the frame didn't carry it).
        tot_m2: u64,
    },
    /// DC102: IFSF stand-alone mode.
    StandAloneMode {
        /// Mode byte.
        mode: u8,
        /// Whether a key is currently pressed.
        pressed: bool,
    },
    /// DC103: unit-price table.
    PriceTable(Vec<f64>),
}

/// Structurally decode one transaction.
///
/// Returns `Ok(None)` for a DC3 whose price falls outside `price_range`
/// (dropped as noise, not an error) and for a DC1 status byte not in
/// [`VALID_STATUSES`] (same treatment, "doesn't decode" rather than
/// aborting the frame).
///
/// # Errors
/// Returns [`Error::UnknownTransaction`] for a `trans` code not in the
/// table; callers are expected to log and continue.
pub fn decode(tx: &Transaction, price_range: (f64, f64)) -> Result<Option<DecodedTransaction>> {
    let data = &tx.data;
    let lng = data.len();
    match tx.trans {
        0x01 if lng >= 1 => Ok(parse_status(data[0]).map(DecodedTransaction::Status)),
        0x02 if lng >= 8 => {
            let volume = decode_vol_or_amount(&data[0..4].try_into().unwrap());
            let amount = decode_vol_or_amount(&data[4..8].try_into().unwrap());
            Ok(Some(DecodedTransaction::VolumeAmount { volume, amount }))
        }
        0x03 if lng >= 4 => {
            let price = decode_price(&data[0..3].try_into().unwrap());
            let (lo, hi) = price_range;
            if price < lo || price > hi {
                return Ok(None);
            }
            let nozio = data[3];
            Ok(Some(DecodedTransaction::NozzlePrice {
                price,
                nozzle: nozio & 0x0F,
                nozzle_out: nozio & 0x10 != 0,
            }))
        }
        0x05 if lng >= 1 => Ok(Some(DecodedTransaction::Alarm(data[0]))),
        0x07 if lng >= 50 => Ok(Some(DecodedTransaction::PumpParameters {
            dp_vol: data[22],
            dp_amo: data[23],
            dp_unp: data[24],
            max_amount: decode_vol_or_amount(&data[29..33].try_into().unwrap()),
            grades: data[35..50].to_vec(),
        })),
        0x09 if lng >= 5 => Ok(Some(DecodedTransaction::Identity(decode_identity(
            &data[0..5].try_into().unwrap(),
        )))),
        0x0E if lng >= 1 => Ok(Some(DecodedTransaction::SuspendReply(data[0]))),
        0x0F if lng >= 1 => Ok(Some(DecodedTransaction::ResumeReply(data[0]))),
        0x65 if lng >= 11 => {
            let counter = data[0];
            let tot_val = decode_bcd(&data[1..6]);
            let tot_m1 = decode_bcd(&data[6..11]);
            let tot_m2 = if lng >= 16 { decode_bcd(&data[11..16]) } else { 0 };
            Ok(Some(DecodedTransaction::Counters {
                counter,
                tot_val,
                tot_m1,
                tot_m2,
            }))
        }
        0x66 if lng >= 2 => Ok(Some(DecodedTransaction::StandAloneMode {
            mode: data[0],
            pressed: data[1] != 0,
        })),
        0x67 if lng >= 3 && lng % 3 == 0 => {
            let prices = data
                .chunks_exact(3)
                .map(|c| decode_price(&[c[0], c[1], c[2]]))
                .collect();
            Ok(Some(DecodedTransaction::PriceTable(prices)))
        }
        trans @ (0x01 | 0x02 | 0x03 | 0x05 | 0x07 | 0x09 | 0x0E | 0x0F | 0x65 | 0x66 | 0x67) => {
            // Recognized trans code, but too short for its minimum LNG.
            Err(Error::UnknownTransaction {
                trans,
                lng: lng as u8,
            })
        }
        trans => Err(Error::UnknownTransaction {
            trans,
            lng: lng as u8,
        }),
    }
}

/// Recognized DC1 status codes.
const VALID_STATUSES: [u8; 8] = [0, 1, 2, 4, 5, 6, 7, 8];

fn parse_status(byte: u8) -> Option<u8> {
    VALID_STATUSES.contains(&byte).then_some(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(trans: u8, data: &[u8]) -> Transaction {
        Transaction::new(trans, data.to_vec()).unwrap()
    }

    #[test]
    fn decodes_status() {
        let d = decode(&tx(0x01, &[5]), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(d, Some(DecodedTransaction::Status(5)));
    }

    #[test]
    fn unrecognized_status_byte_is_dropped() {
        let d = decode(&tx(0x01, &[3]), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(d, None);
    }

    #[test]
    fn decodes_volume_amount() {
        // 4-byte BCD each: 00001234 -> 12.34, 00005678 -> 56.78
        let data = [0x00, 0x00, 0x12, 0x34, 0x00, 0x00, 0x56, 0x78];
        let d = decode(&tx(0x02, &data), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(
            d,
            Some(DecodedTransaction::VolumeAmount {
                volume: 12.34,
                amount: 56.78
            })
        );
    }

    #[test]
    fn dc3_out_of_range_price_is_dropped() {
        // 030400 BCD = 30400, /1000 = 30.4, out of [0.5, 10.0].
        let data = [0x03, 0x04, 0x00, 0x21];
        let d = decode(&tx(0x03, &data), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(d, None);
    }

    #[test]
    fn dc3_in_range_price_decodes_with_nozzle_fields() {
        // 000500 BCD = 500, /1000 = 0.5 -> lower bound inclusive.
        let data = [0x00, 0x05, 0x00, 0x13]; // nozzle=3, nozzle_out bit set
        let d = decode(&tx(0x03, &data), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(
            d,
            Some(DecodedTransaction::NozzlePrice {
                price: 0.5,
                nozzle: 3,
                nozzle_out: true
            })
        );
    }

    #[test]
    fn unknown_trans_is_an_error_not_silently_dropped() {
        let err = decode(&tx(0x42, &[1, 2, 3]), DEFAULT_PRICE_RANGE).unwrap_err();
        assert!(matches!(err, Error::UnknownTransaction { trans: 0x42, .. }));
    }

    #[test]
    fn too_short_for_its_type_is_unknown_transaction() {
        let err = decode(&tx(0x01, &[]), DEFAULT_PRICE_RANGE).unwrap_err();
        assert!(matches!(err, Error::UnknownTransaction { trans: 0x01, .. }));
    }

    #[test]
    fn dc101_short_form_has_zero_m2() {
        let mut data = vec![0x01];
        data.extend([0x00, 0x00, 0x00, 0x01, 0x23]); // tot_val
        data.extend([0x00, 0x00, 0x00, 0x04, 0x56]); // tot_m1
        let d = decode(&tx(0x65, &data), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(
            d,
            Some(DecodedTransaction::Counters {
                counter: 1,
                tot_val: 123,
                tot_m1: 456,
                tot_m2: 0
            })
        );
    }

    #[test]
    fn decodes_dc5_alarm() {
        let d = decode(&tx(0x05, &[0x07]), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(d, Some(DecodedTransaction::Alarm(0x07)));
    }

    #[test]
    fn decodes_dc7_pump_parameters() {
        let mut data = vec![0u8; 50];
        data[22] = 2; // dp_vol
        data[23] = 2; // dp_amo
        data[24] = 3; // dp_unp
        let max_amount = crate::bcd::encode_vol_or_amount(999.99).unwrap();
        data[29..33].copy_from_slice(&max_amount);
        let grades: Vec<u8> = (0..15).collect();
        data[35..50].copy_from_slice(&grades);
        let d = decode(&tx(0x07, &data), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(
            d,
            Some(DecodedTransaction::PumpParameters {
                dp_vol: 2,
                dp_amo: 2,
                dp_unp: 3,
                max_amount: 999.99,
                grades,
            })
        );
    }

    #[test]
    fn decodes_dc9_identity() {
        let enc = crate::bcd::encode_bcd(1234567890, 5).unwrap();
        let d = decode(&tx(0x09, &enc), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(d, Some(DecodedTransaction::Identity("1234567890".into())));
    }

    #[test]
    fn decodes_dc14_suspend_reply() {
        let d = decode(&tx(0x0E, &[3]), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(d, Some(DecodedTransaction::SuspendReply(3)));
    }

    #[test]
    fn decodes_dc15_resume_reply() {
        let d = decode(&tx(0x0F, &[3]), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(d, Some(DecodedTransaction::ResumeReply(3)));
    }

    #[test]
    fn decodes_dc102_stand_alone_mode_key_pressed() {
        let d = decode(&tx(0x66, &[1, 1]), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(
            d,
            Some(DecodedTransaction::StandAloneMode {
                mode: 1,
                pressed: true
            })
        );
    }

    #[test]
    fn decodes_dc102_stand_alone_mode_key_not_pressed() {
        let d = decode(&tx(0x66, &[1, 0]), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(
            d,
            Some(DecodedTransaction::StandAloneMode {
                mode: 1,
                pressed: false
            })
        );
    }

    #[test]
    fn dc103_price_table() {
        let p1 = crate::bcd::encode_price(1.5).unwrap();
        let p2 = crate::bcd::encode_price(2.0).unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(&p1);
        data.extend_from_slice(&p2);
        let d = decode(&tx(0x67, &data), DEFAULT_PRICE_RANGE).unwrap();
        assert_eq!(d, Some(DecodedTransaction::PriceTable(vec![15.0, 20.0])));
    }
}
