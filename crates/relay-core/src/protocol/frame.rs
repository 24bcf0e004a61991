//! Incremental framing of the relay byte stream.
//!
//! Frame layout:
//! ```text
//! [length:4][compression:1][payload:length-5]
//! ```
//! `length` is big-endian and counts the whole frame, prefix included.
//!
//! TCP delivers bytes in arbitrary chunks: one read may carry half a length
//! prefix, the next may carry the rest of that frame plus three more.  The
//! [`Framer`] keeps the unconsumed bytes plus a running "bytes remaining in
//! the current frame" counter so every complete frame is emitted exactly once
//! and in order, whatever the chunk boundaries were.

use tracing::{debug, warn};

use crate::protocol::codec::{decode_message, decompress, ProtocolError};
use crate::protocol::messages::{
    Compression, RelayMessage, FRAME_HEADER_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE,
};

/// One complete frame, still possibly compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw compression byte as received.
    pub compression: u8,
    /// Frame body after the compression byte.
    pub body: Vec<u8>,
}

impl Frame {
    /// Returns the payload, inflating it when the frame is compressed.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnsupportedCompression`] for unknown flags and
    /// [`ProtocolError::Decompress`] for corrupt zlib data.
    pub fn payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let compression = Compression::try_from(self.compression)
            .map_err(|_| ProtocolError::UnsupportedCompression(self.compression))?;
        decompress(compression, &self.body)
    }

    /// Inflates and decodes the frame into a [`RelayMessage`].
    ///
    /// # Errors
    ///
    /// Any decompression or grammar error for this frame.
    pub fn decode(&self) -> Result<RelayMessage, ProtocolError> {
        decode_message(&self.payload()?)
    }
}

/// Reassembles frames from arbitrarily chunked input.
#[derive(Debug, Default)]
pub struct Framer {
    pending: Vec<u8>,
    /// Bytes (compression flag + payload) still owed by the current frame.
    /// Zero while waiting for the next length prefix.
    bytes_remaining: usize,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one chunk and returns every frame it completed, in order.
    ///
    /// A corrupt length prefix is not fatal: the buffered bytes are dropped
    /// and framing restarts with the next chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            if self.bytes_remaining == 0 {
                if self.pending.len() < LENGTH_PREFIX_SIZE {
                    break;
                }
                let declared = u32::from_be_bytes([
                    self.pending[0],
                    self.pending[1],
                    self.pending[2],
                    self.pending[3],
                ]);
                let total = declared as usize;
                if total < FRAME_HEADER_SIZE || total > MAX_FRAME_SIZE {
                    warn!(
                        "invalid frame length {declared}; discarding {} buffered bytes",
                        self.pending.len()
                    );
                    self.pending.clear();
                    break;
                }
                self.pending.drain(..LENGTH_PREFIX_SIZE);
                self.bytes_remaining = total - LENGTH_PREFIX_SIZE;
            }

            if self.pending.len() < self.bytes_remaining {
                break;
            }

            let mut body: Vec<u8> = self.pending.drain(..self.bytes_remaining).collect();
            self.bytes_remaining = 0;
            let compression = body.remove(0);
            frames.push(Frame { compression, body });
        }

        frames
    }

    /// Number of bytes held for a frame that is not complete yet.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops any partial frame, e.g. when the stream ends or reconnects.
    ///
    /// Returns the number of bytes discarded.
    pub fn reset(&mut self) -> usize {
        let discarded = self.pending.len();
        if discarded > 0 || self.bytes_remaining > 0 {
            debug!(
                "discarding partial frame ({discarded} bytes buffered, {} still expected)",
                self.bytes_remaining
            );
        }
        self.pending.clear();
        self.bytes_remaining = 0;
        discarded
    }
}
