//! Per-connection read-ahead store.
//!
//! Frames always carry 100 payload bytes, but a caller may ask `receive` for
//! fewer.  The bytes of an accepted frame that did not fit into the caller's
//! buffer are parked here and handed out, in order, by the next `receive`
//! before any new frame is pulled off the wire.

/// Owned byte store with a consumption offset.
#[derive(Debug, Default)]
pub struct ReadAhead {
    buf: Vec<u8>,
    offset: usize,
}

impl ReadAhead {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes buffered but not yet consumed.
    pub fn len(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append bytes behind everything already buffered.
    pub fn stash(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if self.offset > 0 {
            // Compact consumed bytes away before growing.
            self.buf.drain(..self.offset);
            self.offset = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Copy up to `out.len()` buffered bytes into `out`.
    ///
    /// Returns the number of bytes copied.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len());
        out[..n].copy_from_slice(&self.buf[self.offset..self.offset + n]);
        self.offset += n;
        if self.offset == self.buf.len() {
            self.clear();
        }
        n
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.offset = 0;
    }
}
