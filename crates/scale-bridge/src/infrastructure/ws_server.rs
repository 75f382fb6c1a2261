//! WebSocket server: accept loop and the single active relay session.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured host and port.
//! 2. Accepting incoming TCP connections from browsers.
//! 3. Upgrading each connection to a WebSocket session in its own task.
//! 4. Running one [`RelaySession`] at a time against the shared serial channel.
//! 5. Gracefully shutting down when the `running` flag is cleared.
//!
//! # One session at a time
//!
//! There is one scale and one serial channel, so only one browser may drive it.
//! When a new browser completes its WebSocket handshake while a session is
//! active, the old session is stopped first (it logs its disconnect), then the
//! new one starts.  The most recent connection always wins, which matches the
//! common case of a page being reloaded.  Connections that never finish the
//! handshake leave the active session alone.
//!
//! # Portability
//!
//! Uses only `tokio::net` APIs which are portable across Windows, Linux, and
//! macOS.  Shutdown is triggered by a shared `AtomicBool` that is set by a
//! Ctrl+C signal handler (see `main.rs`), which is also cross-platform.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::application::{MetricsSink, RelayError};
use crate::domain::config::BridgeConfig;
use crate::infrastructure::relay::{RelaySession, SessionEnd};
use crate::infrastructure::serial::SerialChannel;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Upper bound on the WebSocket upgrade handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Completed handshakes waiting for the accept loop.
const UPGRADE_QUEUE: usize = 8;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the WebSocket listener and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: &BridgeConfig,
    serial: Arc<SerialChannel>,
    metrics: Arc<dyn MetricsSink>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    // `bind` resolves host names, so `localhost` works as well as an IP.
    let listener = TcpListener::bind((config.ws_host.as_str(), config.ws_port))
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.ws_url()))?;

    info!("WebSocket server listening on {}", config.ws_url());
    serve(listener, serial, metrics, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// Returns after `running` is cleared and the active session (if any) has
/// been stopped and has logged its disconnect.
///
/// # Errors
///
/// Currently infallible at runtime; accept errors are logged and the loop
/// continues.
pub async fn serve(
    listener: TcpListener,
    serial: Arc<SerialChannel>,
    metrics: Arc<dyn MetricsSink>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let mut active: Option<ActiveSession> = None;

    // Handshakes run in their own tasks and report back here.  Only a
    // completed handshake may replace the active session, so a port scan or a
    // stray HTTP request never disturbs the browser that is connected.
    let (upgraded_tx, mut upgraded_rx) = mpsc::channel::<Upgraded>(UPGRADE_QUEUE);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Use a short timeout on `accept()` so the loop can periodically check
        // the `running` flag even when no browsers are connecting.
        tokio::select! {
            accepted = timeout(ACCEPT_POLL, listener.accept()) => match accepted {
                Ok(Ok((stream, peer))) => {
                    tokio::spawn(upgrade(stream, peer, upgraded_tx.clone()));
                }
                Ok(Err(e)) => {
                    // Transient accept error (e.g., too many open file descriptors).
                    error!("accept error: {e}");
                }
                Err(_) => {
                    // Timeout: loop back to check the `running` flag.
                }
            },
            Some(Upgraded { peer, ws_stream }) = upgraded_rx.recv() => {
                if let Some(previous) = active.take() {
                    if !previous.is_finished() {
                        info!("client {peer} replaces active client {}", previous.peer);
                    }
                    previous.stop().await;
                }
                active = Some(ActiveSession::spawn(
                    ws_stream,
                    peer,
                    Arc::clone(&serial),
                    Arc::clone(&metrics),
                ));
            }
        }
    }

    if let Some(session) = active.take() {
        session.stop().await;
    }

    Ok(())
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// A connection that completed the WebSocket upgrade.
struct Upgraded {
    peer: SocketAddr,
    ws_stream: WebSocketStream<TcpStream>,
}

/// Upgrades one accepted connection and hands it to the accept loop.
///
/// Failures are logged here and never reach the active session.
async fn upgrade(stream: TcpStream, peer: SocketAddr, upgraded: mpsc::Sender<Upgraded>) {
    match handshake(stream).await {
        Ok(ws_stream) => {
            if upgraded.send(Upgraded { peer, ws_stream }).await.is_err() {
                debug!("server stopped before the session for {peer} could start");
            }
        }
        Err(e) => warn!("rejected connection from {peer}: {e}"),
    }
}

async fn handshake(stream: TcpStream) -> Result<WebSocketStream<TcpStream>, RelayError> {
    match timeout(HANDSHAKE_TIMEOUT, accept_async(stream)).await {
        Ok(Ok(ws_stream)) => Ok(ws_stream),
        Ok(Err(e)) => Err(RelayError::Handshake(e)),
        Err(_) => Err(RelayError::HandshakeTimeout),
    }
}

// ── Active session bookkeeping ────────────────────────────────────────────────

/// Handle to the spawned task running the current session.
struct ActiveSession {
    peer: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ActiveSession {
    fn spawn(
        ws_stream: WebSocketStream<TcpStream>,
        peer: SocketAddr,
        serial: Arc<SerialChannel>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(handle_client(ws_stream, peer, serial, metrics, stop_rx));
        Self { peer, stop, task }
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the session to stop and waits until it has wound down.
    async fn stop(self) {
        // The receiver is gone if the session already finished; that is fine.
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            error!("session task for {} failed: {e}", self.peer);
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Runs the relay for one upgraded browser connection and logs the outcome.
///
/// Every session logs exactly one "client connected" and one "client
/// disconnected" line.
async fn handle_client(
    ws_stream: WebSocketStream<TcpStream>,
    peer: SocketAddr,
    serial: Arc<SerialChannel>,
    metrics: Arc<dyn MetricsSink>,
    stop: oneshot::Receiver<()>,
) {
    info!("  Client connected: {peer}");
    match RelaySession::new(peer, serial, metrics).run(ws_stream, stop).await {
        Ok(SessionEnd::ClientClosed) => info!("  Client disconnected: {peer}"),
        Ok(SessionEnd::Stopped) => info!("  Client disconnected: {peer} (stopped by server)"),
        Err(e) => warn!("  Client disconnected: {peer} (error: {e})"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
