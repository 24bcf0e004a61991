//! Storage infrastructure: configuration and session files.
//!
//! - **`config`**: reads the TOML configuration from the platform config
//!   directory, with defaults for everything on first run.
//! - **`session`**: remembers the selected buffer index between runs.

pub mod config;
pub mod session;
