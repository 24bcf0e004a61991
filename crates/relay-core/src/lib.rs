//! # relay-core
//!
//! Shared library for the relay client: wire framing, message decoding,
//! outbound command formatting and the entity graph.
//!
//! It has no dependency on sockets or an async runtime, so everything in it
//! is tested with plain byte slices.
//!
//! # Architecture overview (for beginners)
//!
//! A chat relay multiplexes many chat buffers (channels, private queries,
//! server consoles) over one TCP connection.  The server sends binary
//! messages; the client sends short text commands.
//!
//! - **`protocol`**: how bytes travel.  The [`Framer`] cuts the byte stream
//!   into frames, [`decode_message`] turns one frame payload into a typed
//!   [`RelayMessage`], and [`Command`] renders the client's requests.
//!
//! - **`domain`**: what the bytes mean.  [`EntityGraph`] holds every buffer,
//!   line, nick and hotlist entry keyed by server pointer, plus the selected
//!   buffer and the filtered buffer list.

pub mod domain;
pub mod protocol;

pub use domain::entities::{hydrate, Buffer, Entity, FieldError, HotlistItem, Line, Nick};
pub use domain::events::GraphEvent;
pub use domain::graph::{EntityGraph, GraphError, LineKey, Placement};
pub use domain::view::{BufferView, HistoryFetcher, MemorySessionStore, NoHistory, SessionStore};
pub use protocol::codec::{decode_message, encode_frame, encode_message, ProtocolError};
pub use protocol::commands::{request_ids, Command};
pub use protocol::frame::{Frame, Framer};
pub use protocol::messages::{Compression, HData, HDataItem, Object, ObjectType, Pointer, Record, RelayMessage};
