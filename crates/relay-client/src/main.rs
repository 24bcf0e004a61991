//! Relay client entry point.
//!
//! Wires together the configuration, the connection task (protocol context)
//! and the graph worker (graph context), then runs until Ctrl+C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ RelayConnection::start()  -- TCP reconnect loop, framing, dispatch
//!        │  Inbound (ordered mpsc)
//!        ▼
//!  └─ GraphWorker::run()        -- entity graph, selection, filter
//!        │  GraphEvent (ordered mpsc)
//!        ▼
//!  └─ event log task            -- stands in for a presentation layer
//! ```
//!
//! # Usage
//!
//! ```text
//! relay-client [OPTIONS]
//!
//! Options:
//!   --config <PATH>      Config file [default: platform config dir]
//!   --host <HOST>        Relay host            [env: RELAY_HOST]
//!   --port <PORT>        Relay port            [env: RELAY_PORT]
//!   --password <PASS>    Relay password        [env: RELAY_PASSWORD]
//!   --no-compression     Ask for uncompressed messages
//!   --log-level <LEVEL>  Log filter when RUST_LOG is unset
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use relay_core::{Command, EntityGraph, GraphEvent, MemorySessionStore, SessionStore};
use tokio::{sync::mpsc, time};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use relay_client::application::worker::GraphWorker;
use relay_client::infrastructure::network::{CommandSender, RelayConnection, RelayConnectionConfig};
use relay_client::infrastructure::storage::config::{load_config, load_config_from, AppConfig};
use relay_client::infrastructure::storage::session::FileSessionStore;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Chat relay client.
///
/// Values given here override the configuration file.
#[derive(Debug, Parser)]
#[command(name = "relay-client", about = "Client for a chat relay", version)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hostname or IP address of the relay.
    #[arg(long, env = "RELAY_HOST")]
    host: Option<String>,

    /// TCP port of the relay.
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Relay password.
    #[arg(long, env = "RELAY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Ask the relay not to compress its messages.
    #[arg(long)]
    no_compression: bool,

    /// `tracing` filter used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the configuration file and applies the command-line overrides.
    fn into_config(self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => load_config().context("failed to load configuration")?,
        };
        if let Some(host) = self.host {
            config.relay.host = host;
        }
        if let Some(port) = self.port {
            config.relay.port = port;
        }
        if let Some(password) = self.password {
            config.relay.password = Some(password);
        }
        if self.no_compression {
            config.relay.compression = false;
        }
        if let Some(level) = self.log_level {
            config.logging.log_level = level;
        }
        Ok(config)
    }
}

fn session_store() -> Box<dyn SessionStore> {
    match FileSessionStore::open_default() {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!("session restore disabled: {e}");
            Box::new(MemorySessionStore::default())
        }
    }
}

fn log_event(event: &GraphEvent) {
    match event {
        GraphEvent::BufferAdded { buffer, index } => info!("buffer {buffer} added at {index}"),
        GraphEvent::BufferRemoved { buffer } => info!("buffer {buffer} removed"),
        GraphEvent::SelectionChanged { index } => info!("selection: {index:?}"),
        GraphEvent::Reset => info!("graph reset"),
        other => debug!("{other:?}"),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    info!("relay client starting; relay at {}", config.relay.address());

    let running = Arc::new(AtomicBool::new(true));

    // ── Graph context ─────────────────────────────────────────────────────────
    let (commands, command_rx) = CommandSender::new(config.relay.history_batch);
    let graph = EntityGraph::new(session_store(), Box::new(commands.clone()));
    let (event_tx, mut event_rx) = mpsc::channel::<GraphEvent>(256);
    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    let worker = tokio::spawn(GraphWorker::new(graph, event_tx).run(inbound_rx));

    let events = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            log_event(&event);
        }
    });

    // ── Protocol context ──────────────────────────────────────────────────────
    let connection = RelayConnection::new(RelayConnectionConfig::from(&config.relay));
    let network = connection.start(Arc::clone(&running), inbound_tx, command_rx);

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("shutdown signal received");
    running.store(false, Ordering::Relaxed);
    commands.send(Command::Quit);
    let mut network = network;
    if time::timeout(SHUTDOWN_GRACE, &mut network).await.is_err() {
        debug!("connection task still busy; aborting it");
        network.abort();
    }

    let graph = worker.await.context("graph worker panicked")?;
    let _ = events.await;
    info!(
        "relay client stopped ({} buffers, {} lines held)",
        graph.buffer_count(),
        graph.line_count()
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
