//! The in-memory model of everything the relay reports.
//!
//! # What lives here? (for beginners)
//!
//! Nothing in this module touches a socket or an async runtime.  Handlers in
//! the client crate feed it decoded items; it keeps the model consistent and
//! queues [`events::GraphEvent`]s describing what changed.
//!
//! - **`entities`**: buffers, lines, nicks and hotlist entries, each with a
//!   typed field schema.
//! - **`graph`**: the pointer-indexed store that enforces identity, parent
//!   links and deferred removal.
//! - **`view`**: the filtered projection and the selected index, plus the
//!   session-restore and history collaborators a selection change calls.
//! - **`events`**: change notifications.

pub mod entities;
pub mod events;
pub mod graph;
pub mod view;
