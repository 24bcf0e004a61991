//! The protocol context's per-connection state: framer, decoder and
//! dispatch table.
//!
//! [`ProtocolSession::ingest`] takes raw socket bytes and returns the
//! envelopes to hand to the graph context, in decode order.  It never fails:
//! framing and decode problems are logged and only cost the affected frame.

use relay_core::{Frame, Framer, Object, Record};
use tracing::{debug, warn};

use super::dispatch::{DispatchTable, Route};
use super::worker::Envelope;

#[derive(Debug)]
pub struct ProtocolSession {
    epoch: u64,
    framer: Framer,
    dispatch: DispatchTable,
    pongs: u64,
    dropped: u64,
}

impl ProtocolSession {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            framer: Framer::new(),
            dispatch: DispatchTable::new(),
            pongs: 0,
            dropped: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Feeds one chunk of socket data.
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<Envelope> {
        self.framer
            .feed(chunk)
            .iter()
            .filter_map(|frame| self.handle_frame(frame))
            .collect()
    }

    fn handle_frame(&mut self, frame: &Frame) -> Option<Envelope> {
        let msg = match frame.decode() {
            Ok(msg) => msg,
            Err(e) => {
                self.dropped += 1;
                warn!("dropping undecodable message: {e}");
                return None;
            }
        };

        match self.dispatch.route(&msg.id) {
            Route::Graph(handler) => {
                let ignored = msg
                    .objects
                    .iter()
                    .filter(|o| !matches!(o, Object::HData(_)))
                    .count();
                if ignored > 0 {
                    debug!("{:?}: ignoring {ignored} non-hdata objects", msg.id);
                }
                Some(Envelope {
                    epoch: self.epoch,
                    handler,
                    record: Record::from(msg),
                })
            }
            Route::Pong => {
                self.pongs += 1;
                debug!("pong received");
                None
            }
            Route::Unimplemented | Route::Unknown => None,
        }
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.dispatch.is_handshake_complete()
    }

    pub fn pongs_received(&self) -> u64 {
        self.pongs
    }

    /// Messages dropped because they failed to decode.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped
    }

    /// Ends the stream, discarding any partial frame.  Returns the number of
    /// bytes thrown away.
    pub fn finish(&mut self) -> usize {
        self.framer.reset()
    }
}
