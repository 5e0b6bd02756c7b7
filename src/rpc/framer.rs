//! Newline-delimited record framer.
//!
//! Wire format: one UTF-8 JSON document per line.
//! ```text
//! ┌──────────────────────────────┬────┐
//! │ record bytes (≤ N)           │ \n │   ('\r' anywhere is ignored)
//! └──────────────────────────────┴────┘
//! ```
//!
//! The framer accumulates bytes into a fixed-capacity buffer and yields
//! complete records. It never blocks: a byte either completes a record or
//! it doesn't.
//!
//! Overflow policy: once the buffer is full, further bytes of that record
//! are discarded until the next `\n`, and the truncated prefix is still
//! emitted as the record. The JSON decoder downstream will normally reject
//! it, which gives the same silent drop as any other malformed line.

use heapless::Vec;
use log::warn;

/// A complete record yielded by [`LineFramer::feed`].
pub type Record<const N: usize> = Vec<u8, N>;

/// Streaming line framer with a fixed `N`-byte record buffer.
pub struct LineFramer<const N: usize> {
    buf: Vec<u8, N>,
    /// Bytes discarded from the record currently being assembled.
    overflowed: usize,
}

impl<const N: usize> Default for LineFramer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineFramer<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflowed: 0,
        }
    }

    /// Feed one byte.
    ///
    /// Returns `Some(record)` when `byte` is a `\n` that terminates a
    /// non-empty record. Empty lines produce nothing.
    pub fn feed(&mut self, byte: u8) -> Option<Record<N>> {
        match byte {
            b'\r' => None,
            b'\n' => {
                if self.overflowed > 0 {
                    warn!(
                        "framer: record exceeded {} bytes, {} bytes truncated",
                        N, self.overflowed
                    );
                    self.overflowed = 0;
                }
                if self.buf.is_empty() {
                    None
                } else {
                    Some(core::mem::take(&mut self.buf))
                }
            }
            _ => {
                if self.buf.push(byte).is_err() {
                    self.overflowed += 1;
                }
                None
            }
        }
    }

    /// Feed a slice, invoking `on_record` for every record it completes.
    pub fn feed_slice(&mut self, data: &[u8], mut on_record: impl FnMut(&[u8])) {
        for &byte in data {
            if let Some(record) = self.feed(byte) {
                on_record(&record);
            }
        }
    }

    /// Bytes currently buffered for the incomplete record.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Discard any partial record (e.g. after the link is re-opened).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.overflowed = 0;
    }
}
