//! relay-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does relay-client do? (for beginners)
//!
//! The relay is a chat multiplexer running next to an IRC (or similar)
//! client on a server.  This program connects to it and keeps a live copy of
//! its state:
//!
//! 1. Connects over TCP, authenticates with `init` and asks for the buffer
//!    list, the latest lines, the hotlist and the nicklists.
//! 2. Subscribes to live events with `sync`.
//! 3. Cuts the incoming byte stream into frames, decodes each one and routes
//!    it through the dispatch table.
//! 4. Applies the routed records to the entity graph in a separate task and
//!    publishes what changed as typed events.

/// Application layer: dispatch, protocol session and graph worker.
pub mod application;

/// Infrastructure layer: network and storage adapters.
pub mod infrastructure;
