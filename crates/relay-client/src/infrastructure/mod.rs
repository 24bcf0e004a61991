//! Infrastructure layer for the relay client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `relay_core`, but MUST NOT be imported by the application layer.
//!
//! - **`network`**: the TCP connection, reconnect loop, keepalive and hotlist
//!   polling, plus the [`network::CommandSender`] handle.
//! - **`storage`**: TOML configuration and the session-restore file.

pub mod network;
pub mod storage;
