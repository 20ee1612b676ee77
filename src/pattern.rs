//! Pattern matcher and heartbeat filter: a fast, tolerant path for
//! the one frame shape common enough, and trustworthy enough, to skip full
//! structural parsing — the 9-byte single-status frame — plus the
//! pre-filter that drops line-sharing keepalive noise before either
//! decoder sees it.
//!
//! "Recognize a short, fixed byte shape directly, fall through
//! otherwise" — a whole-byte analogue of a bit-level correlator.

use crate::decode::DecodedTransaction;
use crate::frame::{ADDR_MAX, ADDR_MIN};

/// Try to match a complete frame against the known 9-byte status-frame
/// shape: `ADR · CTRL · 0x01 · 0x01 · STATUS · CRC1 · CRC2 · 0x03 · 0xFA`.
///
/// Never matches anything that could carry more than one transaction —
/// those are always left for the structural decoder, so a frame is never
/// double-decoded.
#[must_use]
pub fn match_status_frame(frame: &[u8]) -> Option<(u8, DecodedTransaction)> {
    if frame.len() != 9 {
        return None;
    }
    let address = frame[0];
    if !(ADDR_MIN..=ADDR_MAX).contains(&address) {
        return None;
    }
    if frame[2] != 0x01 || frame[3] != 0x01 {
        return None;
    }
    let status = frame[4];
    if !(0..=8).contains(&status) {
        return None;
    }
    if frame[7] != 0x03 || frame[8] != 0xFA {
        return None;
    }
    Some((address, DecodedTransaction::Status(status)))
}

/// Returns `true` if `frame` is line-sharing keepalive noise that must
/// never be surfaced as a `pump_message`, regardless of what either
/// decoder would otherwise make of it.
#[must_use]
pub fn is_heartbeat(frame: &[u8]) -> bool {
    if frame.len() == 3 && frame[0] == 0x50 && frame[2] == 0xFA {
        let x = frame[1];
        if x == 0x20 || x == 0x70 || (0xC1..=0xCF).contains(&x) {
            return true;
        }
    }
    if frame.len() < 6 {
        return true;
    }
    let body = &frame[..frame.len() - 2];
    if body
        .iter()
        .all(|&b| matches!(b, 0x50 | 0x51 | 0x20 | 0x70 | 0xFA))
    {
        return true;
    }
    false
}
