//! Half-duplex serial transport: owns the RS-485 device, drives the
//! post-transmit quiet-time, and hands raw inbound bytes to the protocol
//! engine's reassembly buffer.
//!
//! A byte-oriented async source that reads what's available and leaves a
//! partial tail for next time. The serial link adds one constraint a TCP
//! socket doesn't have — RS-485 is half-duplex, so every write must be
//! followed by a fixed quiet-time before anything else touches the line.

use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result};

/// Mandatory pause after every outbound write, to respect RS-485 DE/RE
/// turnaround.
pub const QUIET_TIME: Duration = Duration::from_millis(50);

/// Fixed serial parameters: 8 data bits, no parity, 1 stop bit.
/// Baud is the only configurable line parameter.
#[derive(Debug, Clone)]
pub struct SerialParams {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub port: String,
    /// Baud rate. Typical values are 9600/19200/38400/57600/115200, but
    /// any rate the OS accepts is passed through.
    pub baud: u32,
}

/// Half-duplex serial transport over one RS-485 segment.
pub struct Transport {
    params: SerialParams,
    port: Option<SerialStream>,
}

impl Transport {
    /// Create a transport for `params`, not yet open.
    #[must_use]
    pub fn new(params: SerialParams) -> Self {
        Self { params, port: None }
    }

    /// Whether the device is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Current serial parameters.
    #[must_use]
    pub fn params(&self) -> &SerialParams {
        &self.params
    }

    /// Open the device. No-op if already open.
    ///
    /// # Errors
    /// Returns [`Error::Transport`] if the OS open call fails.
    pub fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = tokio_serial::new(&self.params.port, self.params.baud)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .open_native_async()
            .map_err(|e| Error::Transport(format!("open {}: {e}", self.params.port)))?;
        self.port = Some(port);
        debug!(
            "transport: opened {} at {} baud",
            self.params.port, self.params.baud
        );
        Ok(())
    }

    /// Close the device and drop buffered state.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("transport: closed {}", self.params.port);
        }
    }

    /// Reconfigure and reopen: `close()` then `open()` with new
    /// parameters.
    ///
    /// # Errors
    /// Returns [`Error::Transport`] if opening with the new parameters
    /// fails.
    pub fn reconfigure(&mut self, params: SerialParams) -> Result<()> {
        self.close();
        self.params = params;
        self.open()
    }

    /// Write a complete frame, drain the kernel TX buffer, then sleep the
    /// mandatory quiet-time before returning.
    ///
    /// # Errors
    /// Returns [`Error::Transport`] if the device isn't open or the OS
    /// write/flush fails.
    pub async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::Transport("device not open".into()))?;
        port.write_all(bytes)
            .await
            .map_err(|e| Error::Transport(format!("write: {e}")))?;
        port.flush()
            .await
            .map_err(|e| Error::Transport(format!("drain: {e}")))?;
        tokio::time::sleep(QUIET_TIME).await;
        Ok(())
    }

    /// Read whatever bytes are currently available into `buf`, returning
    /// the number read. `0` means the device reported EOF/disconnect.
    ///
    /// # Errors
    /// Returns [`Error::Transport`] if the device isn't open or the OS
    /// read fails.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::Transport("device not open".into()))?;
        let n = port
            .read(buf)
            .await
            .map_err(|e| Error::Transport(format!("read: {e}")))?;
        if n == 0 {
            warn!("transport: serial device reported EOF");
        }
        Ok(n)
    }
}

/// Reassembly buffer discipline: appends bytes, extracts
/// complete frames, and periodically trims the remainder so line noise
/// can't grow memory without bound.
#[derive(Debug, Default)]
pub struct IngressBuffer {
    buf: Vec<u8>,
}

impl IngressBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append newly read bytes and extract any complete frames now
    /// present. Calls [`cleanup`] afterwards to bound the buffer's growth.
    pub fn push_and_extract(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let frames = crate::frame::extract_frames(&mut self.buf);
        self.cleanup();
        frames
    }

    /// Backstop cleanup: if the buffer still contains a complete
    /// terminator (shouldn't happen after `extract_frames`, but guarded
    /// against regardless), discard through it; otherwise cap length at
    /// ~500 bytes once it exceeds 1000.
    fn cleanup(&mut self) {
        if let Some(pos) = find_last_terminator(&self.buf) {
            self.buf.drain(..=pos);
            return;
        }
        if self.buf.len() > 1000 {
            let keep_from = self.buf.len() - 500;
            self.buf.drain(..keep_from);
        }
    }

    /// Current remainder, for inspection/testing.
    #[must_use]
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }

    /// Discard any partial frame in progress. Used when a transport
    /// fault invalidates whatever bytes were buffered so reassembly
    /// resumes clean after reconnect.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

fn find_last_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .rposition(|w| w == [0x03, 0xFA])
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_buffer_extracts_and_keeps_remainder() {
        let frame = crate::frame::build_frame(
            0x50,
            0,
            &[crate::frame::Transaction::new(1, vec![5]).unwrap()],
        )
        .unwrap();
        let mut ib = IngressBuffer::new();
        let mut data = frame.clone();
        data.extend_from_slice(&[0x11, 0x22]); // partial tail, no terminator
        let frames = ib.push_and_extract(&data);
        assert_eq!(frames, vec![frame]);
        assert_eq!(ib.remainder(), &[0x11, 0x22]);
    }

    #[test]
    fn ingress_buffer_bounds_noise_without_terminator() {
        let mut ib = IngressBuffer::new();
        let noise = vec![0xAAu8; 2000];
        let frames = ib.push_and_extract(&noise);
        assert!(frames.is_empty());
        assert!(ib.remainder().len() <= 1000);
    }

    #[test]
    fn find_last_terminator_locates_tail_pair() {
        let buf = [0x01, 0x03, 0xFA, 0x02, 0x03];
        assert_eq!(find_last_terminator(&buf), Some(2));
    }
}
