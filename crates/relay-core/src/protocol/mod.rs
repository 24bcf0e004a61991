//! Protocol module: framing, the binary payload codec, wire types, and
//! outbound text commands.

pub mod codec;
pub mod commands;
pub mod frame;
pub mod messages;

pub use codec::{decode_message, encode_frame, encode_message, ProtocolError};
pub use commands::Command;
pub use frame::{Frame, Framer};
pub use messages::*;
