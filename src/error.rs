//! Crate-wide error type.
//!
//! A single error type with `From` impls for the handful of foreign
//! errors the crate actually crosses, generated with `thiserror` instead
//! of hand-writing `Display`.

use thiserror::Error;

/// All errors this crate can produce.
///
/// Decode-side variants (`MalformedFrame`, `UnknownTransaction`,
/// `UnrecognizedFrame`) are recoverable by design: the protocol engine logs
/// and continues rather than propagating them. `InvalidAddress` and
/// `InvalidArgument` are boundary-validation failures that abort a single
/// encode or request before any byte is emitted. `Transport` surfaces an
/// OS-level serial failure.
#[derive(Error, Debug)]
pub enum Error {
    /// Pump address outside the legal 0x50..=0x6F range.
    #[error("invalid pump address: {0}")]
    InvalidAddress(String),

    /// A command argument (nozzle, counter id, price, ...) was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A frame was too short, missing its terminator, or its transaction
    /// stream could not be walked.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A transaction had a recognized structure but an unsupported TRANS
    /// code. Not fatal; surrounding transactions still decode.
    #[error("unknown transaction {trans:#04x} ({lng} bytes)")]
    UnknownTransaction {
        /// The transaction number.
        trans: u8,
        /// The transaction's declared length.
        lng: u8,
    },

    /// Neither the pattern matcher nor the structural decoder produced a
    /// record for this frame.
    #[error("unrecognized frame: {0}")]
    UnrecognizedFrame(String),

    /// OS-level serial transport failure (open/write/read/drain).
    #[error("transport error: {0}")]
    Transport(String),

    /// Supervisor-supplied configuration was invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(e: std::num::TryFromIntError) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
