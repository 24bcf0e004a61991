//! Application layer for the relay client.
//!
//! # What runs where?
//!
//! - **`dispatch`** and **`protocol`** belong to the protocol context: they
//!   turn socket bytes into routed, epoch-stamped envelopes and track the
//!   handshake.
//!
//! - **`worker`** and **`handlers`** belong to the graph context: the worker
//!   owns the entity graph and applies each envelope with the handler the
//!   dispatch table picked.

pub mod dispatch;
pub mod handlers;
pub mod protocol;
pub mod worker;
