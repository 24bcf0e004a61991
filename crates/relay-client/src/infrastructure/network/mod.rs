//! Network infrastructure: the TCP connection to the relay.
//!
//! Architecture:
//! - `RelayConnection` runs a reconnect loop.  Each successful connect opens
//!   a new epoch, tells the graph context (`Inbound::Connected`), sends
//!   `init` plus the handshake requests and then drives one session.
//! - A session `select!`s over socket reads, queued outbound commands, the
//!   hotlist poll timer (only once the handshake is complete) and the ping
//!   timer, which also enforces the idle timeout.
//! - Decoded envelopes go to the graph context over an `mpsc` channel, in
//!   the order they were decoded.
//!
//! Outbound commands from anywhere else (history fetches triggered by a
//! selection change, user input) go through a [`CommandSender`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_core::{Command, HistoryFetcher, Pointer};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::application::protocol::ProtocolSession;
use crate::application::worker::Inbound;
use crate::infrastructure::storage::config::RelayConfig;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Errors that end one connection.  The reconnect loop logs them and retries.
#[derive(Debug, Error)]
pub enum ClientNetworkError {
    /// TCP connection to the relay failed.
    #[error("failed to connect to relay at {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The relay closed the connection.
    #[error("connection closed by relay")]
    Closed,
    /// Nothing was received for longer than the idle timeout.
    #[error("no data from relay for {0:?}")]
    IdleTimeout(Duration),
    /// The graph context is gone; there is nobody left to deliver to.
    #[error("graph context stopped")]
    GraphStopped,
}

/// Settings for one [`RelayConnection`].
#[derive(Debug, Clone)]
pub struct RelayConnectionConfig {
    /// `host:port` of the relay.
    pub addr: String,
    pub password: String,
    pub compression: bool,
    pub reconnect_interval: Duration,
    pub hotlist_poll_interval: Duration,
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for RelayConnectionConfig {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for RelayConnectionConfig {
    fn from(cfg: &RelayConfig) -> Self {
        Self {
            addr: cfg.address(),
            password: cfg.password.clone().unwrap_or_default(),
            compression: cfg.compression,
            reconnect_interval: cfg.reconnect_interval(),
            hotlist_poll_interval: cfg.hotlist_poll_interval(),
            ping_interval: cfg.ping_interval(),
            idle_timeout: cfg.idle_timeout(),
        }
    }
}

// ── Outbound commands ─────────────────────────────────────────────────────────

/// Cloneable handle for queuing commands on the current connection.
///
/// Commands queued while disconnected are written on the next connection,
/// right after `init` and the handshake requests.  They do not wait for the
/// handshake replies.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
    history_batch: usize,
}

impl CommandSender {
    pub fn new(history_batch: usize) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, history_batch }, rx)
    }

    /// Queues a command.  Returns `false` when the connection task is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Queues text (or a `/command`) for a buffer.
    pub fn send_input(&self, buffer: Pointer, text: &str) -> bool {
        self.send(Command::Input {
            buffer,
            text: text.to_string(),
        })
    }
}

impl HistoryFetcher for CommandSender {
    fn fetch_more_lines(&self, buffer: Pointer, loaded: usize) {
        let count = loaded + self.history_batch;
        if !self.send(Command::FetchLines { buffer, count }) {
            debug!("history fetch for {buffer} dropped; connection task stopped");
        }
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// Manages the connection from the client to the relay.
pub struct RelayConnection {
    config: RelayConnectionConfig,
}

impl RelayConnection {
    pub fn new(config: RelayConnectionConfig) -> Self {
        Self { config }
    }

    /// Runs the reconnect loop until `running` is cleared or the graph
    /// context stops.
    pub fn start(
        self,
        running: Arc<AtomicBool>,
        graph_tx: mpsc::Sender<Inbound>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut epoch = 0u64;
            while running.load(Ordering::Relaxed) {
                match TcpStream::connect(&self.config.addr).await {
                    Ok(stream) => {
                        epoch += 1;
                        info!("connected to relay at {} (epoch {epoch})", self.config.addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("could not set TCP_NODELAY: {e}");
                        }
                        let (reader, writer) = stream.into_split();

                        let result = self
                            .run_session(epoch, reader, writer, &graph_tx, &mut commands, &running)
                            .await;
                        match result {
                            Ok(()) => info!("session {epoch} ended"),
                            Err(ClientNetworkError::GraphStopped) => {
                                info!("graph context stopped; closing connection task");
                                return;
                            }
                            Err(e) => warn!("session {epoch} ended: {e}"),
                        }
                        if graph_tx.send(Inbound::Disconnected).await.is_err() {
                            return;
                        }
                    }
                    Err(source) => {
                        let e = ClientNetworkError::ConnectFailed {
                            addr: self.config.addr.clone(),
                            source,
                        };
                        warn!("{e}");
                    }
                }

                if running.load(Ordering::Relaxed) {
                    debug!("reconnecting in {:?}", self.config.reconnect_interval);
                    time::sleep(self.config.reconnect_interval).await;
                }
            }
        })
    }

    /// Drives one connection: handshake, then reads, commands and timers
    /// until the stream ends, an error occurs or `running` is cleared.
    ///
    /// # Errors
    ///
    /// Any [`ClientNetworkError`] that ended the session.
    pub async fn run_session<R, W>(
        &self,
        epoch: u64,
        mut reader: R,
        mut writer: W,
        graph_tx: &mpsc::Sender<Inbound>,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        running: &AtomicBool,
    ) -> Result<(), ClientNetworkError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        graph_tx
            .send(Inbound::Connected { epoch })
            .await
            .map_err(|_| ClientNetworkError::GraphStopped)?;

        send_command(
            &mut writer,
            &Command::Init {
                password: self.config.password.clone(),
                compression: self.config.compression,
            },
        )
        .await?;
        for command in Command::handshake_sequence() {
            send_command(&mut writer, &command).await?;
        }

        let mut session = ProtocolSession::new(epoch);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut last_activity = Instant::now();

        let mut hotlist_timer = time::interval_at(
            Instant::now() + self.config.hotlist_poll_interval,
            self.config.hotlist_poll_interval,
        );
        hotlist_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ping_timer = time::interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            if !running.load(Ordering::Relaxed) {
                break Ok(());
            }

            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => break Err(ClientNetworkError::Closed),
                        Ok(n) => n,
                        Err(e) => break Err(ClientNetworkError::Io(e)),
                    };
                    last_activity = Instant::now();
                    for envelope in session.ingest(&buf[..n]) {
                        if graph_tx.send(Inbound::Record(envelope)).await.is_err() {
                            return Err(ClientNetworkError::GraphStopped);
                        }
                    }
                }

                Some(command) = commands.recv() => {
                    if let Err(e) = send_command(&mut writer, &command).await {
                        break Err(e);
                    }
                }

                _ = hotlist_timer.tick(), if session.is_handshake_complete() => {
                    if let Err(e) = send_command(&mut writer, &Command::RequestHotlist { initial: false }).await {
                        break Err(e);
                    }
                }

                _ = ping_timer.tick() => {
                    let idle = last_activity.elapsed();
                    if !self.config.idle_timeout.is_zero() && idle > self.config.idle_timeout {
                        break Err(ClientNetworkError::IdleTimeout(idle));
                    }
                    let token = epoch.to_string();
                    if let Err(e) = send_command(&mut writer, &Command::Ping { token }).await {
                        break Err(e);
                    }
                }
            }
        };

        let discarded = session.finish();
        if discarded > 0 {
            debug!("discarded {discarded} bytes of a partial frame");
        }
        result
    }
}

async fn send_command<W>(writer: &mut W, command: &Command) -> Result<(), ClientNetworkError>
where
    W: AsyncWrite + Unpin,
{
    let line = command.to_line();
    if let Command::Init { .. } = command {
        debug!("sending init");
    } else {
        debug!("sending {}", line.trim_end());
    }
    writer.write_all(line.as_bytes()).await.map_err(|e| {
        error!("failed to send command: {e}");
        ClientNetworkError::Io(e)
    })?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
