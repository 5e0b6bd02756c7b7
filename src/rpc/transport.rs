//! Transport abstraction: any byte-oriented channel.
//!
//! Concrete implementations:
//! - UART0 serial at the configured baud rate (on target)
//! - in-memory scripted links (host tests)
//!
//! The service is generic over `Transport`; everything above it only ever
//! sees whole lines through [`LineSink`].

use log::warn;

use crate::error::TransportError;

/// Consecutive zero-byte writes tolerated before a line is abandoned.
const MAX_WRITE_STALLS: u32 = 16;

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;
}

/// Object-safe, line-granular output.
///
/// Stream producers and the dispatcher write through this so they need not
/// be generic over the concrete transport.
pub trait LineSink {
    /// Write one complete `\n`-terminated line and flush it.
    fn send_line(&mut self, line: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport> LineSink for T {
    fn send_line(&mut self, line: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        let mut stalls = 0;
        while written < line.len() {
            match self.write(&line[written..]) {
                Ok(0) => {
                    stalls += 1;
                    if stalls >= MAX_WRITE_STALLS {
                        warn!("transport: gave up after {written}/{} bytes", line.len());
                        return Err(TransportError::ShortWrite);
                    }
                }
                Ok(n) => {
                    written += n;
                    stalls = 0;
                }
                Err(e) => {
                    warn!("transport: write failed: {e:?}");
                    return Err(TransportError::WriteFailed);
                }
            }
        }
        self.flush().map_err(|e| {
            warn!("transport: flush failed: {e:?}");
            TransportError::FlushFailed
        })
    }
}
