//! DART frame codec: build outbound frames, extract delimited frames from
//! an arbitrary byte stream, and structurally split a frame into its
//! transaction stream.
//!
//! The reassembly loop in [`extract_frames`] accumulates into a buffer,
//! recognizes a terminator, and hands back whatever didn't yet form a
//! complete frame — in whole bytes rather than bits, since DART frames
//! are byte-delimited, not bit-stuffed.

use crate::crc::{crc16_ccitt, split_be};
use crate::error::{Error, Result};

/// Start of the valid pump-address range.
pub const ADDR_MIN: u8 = 0x50;
/// End of the valid pump-address range (inclusive).
pub const ADDR_MAX: u8 = 0x6F;

const ETX: u8 = 0x03;
const SF: u8 = 0xFA;

/// A single `(TRANS, LNG, DATA)` transaction, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction number.
    pub trans: u8,
    /// Transaction payload. Its length is the wire `LNG` byte.
    pub data: Vec<u8>,
}

impl Transaction {
    /// Build a transaction from its wire trans code and payload.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `data` is longer than 255
    /// bytes (it wouldn't fit in the one-byte `LNG` field).
    pub fn new(trans: u8, data: Vec<u8>) -> Result<Self> {
        if data.len() > u8::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "transaction {trans:#04x} data too long: {} bytes",
                data.len()
            )));
        }
        Ok(Self { trans, data })
    }

    fn wire_len(&self) -> usize {
        2 + self.data.len()
    }

    fn write_into(&self, out: &mut Vec<u8>) {
        out.push(self.trans);
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
    }
}

/// Check that `address` is in the legal `0x50..=0x6F` pump-address range.
pub fn validate_address(address: u8) -> Result<()> {
    if !(ADDR_MIN..=ADDR_MAX).contains(&address) {
        return Err(Error::InvalidAddress(format!(
            "{address:#04x} not in {ADDR_MIN:#04x}..={ADDR_MAX:#04x}"
        )));
    }
    Ok(())
}

/// Build a complete outbound frame: `ADR · CTRL · (TRANS · LNG · DATA)+ ·
/// CRC1 · CRC2 · ETX · SF`.
///
/// # Errors
/// - [`Error::InvalidAddress`] if `address` is outside `0x50..=0x6F`.
/// - [`Error::InvalidArgument`] if `transactions` is empty (every frame
///   carries at least one transaction).
pub fn build_frame(address: u8, control: u8, transactions: &[Transaction]) -> Result<Vec<u8>> {
    validate_address(address)?;
    if transactions.is_empty() {
        return Err(Error::InvalidArgument(
            "a frame must carry at least one transaction".into(),
        ));
    }
    let body_len = 2 + transactions.iter().map(Transaction::wire_len).sum::<usize>();
    let mut out = Vec::with_capacity(body_len + 4);
    out.push(address);
    out.push(control);
    for t in transactions {
        t.write_into(&mut out);
    }
    let crc = crc16_ccitt(&out);
    let (crc1, crc2) = split_be(crc);
    out.push(crc1);
    out.push(crc2);
    out.push(ETX);
    out.push(SF);
    Ok(out)
}

/// Scan `buffer` for complete DART frames, removing them (and any
/// recognized wrapper-block noise) from the front. Whatever remains after
/// the last complete frame stays in `buffer` for the next call.
///
/// Wrapper blocks — `{0x50|0x51}, _, 0xFA` — are non-DART line-sharing
/// artifacts and are dropped without becoming part of any candidate frame.
///
/// If the trailing, still-incomplete candidate grows past ~1000 bytes
/// without a terminator, it is truncated to its last ~500 bytes so a
/// noisy line can't grow the buffer without bound.
pub fn extract_frames(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    const OVERFLOW_CAP: usize = 1000;
    const OVERFLOW_KEEP: usize = 500;

    let input = std::mem::take(buffer);
    let mut frames = Vec::new();
    let mut candidate: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < input.len() {
        if i + 2 < input.len()
            && (input[i] == 0x50 || input[i] == 0x51)
            && input[i + 2] == SF
        {
            i += 3;
            continue;
        }
        candidate.push(input[i]);
        i += 1;
        let n = candidate.len();
        if n >= 2 && candidate[n - 2] == ETX && candidate[n - 1] == SF {
            frames.push(std::mem::take(&mut candidate));
        } else if candidate.len() > OVERFLOW_CAP {
            let keep_from = candidate.len() - OVERFLOW_KEEP;
            candidate.drain(..keep_from);
        }
    }
    *buffer = candidate;
    frames
}

/// A frame, split into its address/control header and its transaction
/// stream. The CRC is captured but intentionally not validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    /// The frame's ADR byte.
    pub address: u8,
    /// The frame's CTRL byte.
    pub control: u8,
    /// Transactions found in wire order.
    pub transactions: Vec<Transaction>,
    /// The two CRC bytes as read off the wire, unvalidated.
    pub crc: (u8, u8),
}

/// Structurally parse a complete frame (as produced by [`extract_frames`])
/// into its header and transaction stream.
///
/// # Errors
/// Returns [`Error::MalformedFrame`] if the frame is shorter than 8 bytes,
/// doesn't end in `ETX, SF`, or has an address outside `0x50..=0x6F`.
/// Transaction walking stops (without erroring) at whichever comes first:
/// the exact end of the transaction region, an out-of-bounds `LNG`, or no
/// further progress being possible.
pub fn parse_frame(frame: &[u8]) -> Result<ParsedFrame> {
    if frame.len() < 8 {
        return Err(Error::MalformedFrame(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }
    let len = frame.len();
    if frame[len - 2] != ETX || frame[len - 1] != SF {
        return Err(Error::MalformedFrame("missing ETX/SF terminator".into()));
    }
    let address = frame[0];
    validate_address(address).map_err(|_| {
        Error::MalformedFrame(format!("address {address:#04x} out of range"))
    })?;
    let control = frame[1];
    let crc = (frame[len - 4], frame[len - 3]);

    let body_end = len - 4; // exclusive; everything before CRC1
    let mut transactions = Vec::new();
    let mut pos = 2usize;
    while pos < body_end {
        if pos + 2 > body_end {
            break; // not enough room for a TRANS/LNG header
        }
        let trans = frame[pos];
        let lng = frame[pos + 1] as usize;
        let data_start = pos + 2;
        let data_end = data_start + lng;
        if data_end > body_end {
            break; // declared LNG would spill past the transaction region
        }
        transactions.push(Transaction {
            trans,
            data: frame[data_start..data_end].to_vec(),
        });
        let next_pos = data_end;
        if next_pos == pos {
            break; // no progress; avoid an infinite loop on malformed input
        }
        pos = next_pos;
    }

    Ok(ParsedFrame {
        address,
        control,
        transactions,
        crc,
    })
}
