//! One relay session: a WebSocket connection bridged to the serial channel.
//!
//! A session runs two directions concurrently:
//!
//! - **Serial → WebSocket**: read up to 256 bytes (off the runtime, see
//!   `serial.rs`), reassemble lines, send each line as a text frame.  Idle
//!   reads are followed by a 50 ms sleep so the loop never spins.
//! - **WebSocket → Serial**: await the next frame, forward non-empty commands
//!   with a `\r\n` terminator.
//!
//! The session ends as soon as either direction finishes or the server asks
//! it to stop.  Both directions are plain futures polled by one
//! `tokio::select!`, so finishing one drops (cancels) the other immediately.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use scale_core::parse_weight;
use scale_core::protocol::serial::{POLL_INTERVAL, READ_CHUNK_SIZE};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::application::{classify_frame, is_disconnect, InboundFrame, MetricsSink, RelayError};
use crate::infrastructure::serial::SerialChannel;

/// Upper bound on sending our Close frame when a session is stopped.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The browser closed the connection.
    ClientClosed,
    /// The server stopped the session (newer client or shutdown).
    Stopped,
}

/// Binds one WebSocket connection to the shared serial channel.
pub struct RelaySession {
    peer: SocketAddr,
    serial: Arc<SerialChannel>,
    metrics: Arc<dyn MetricsSink>,
}

impl RelaySession {
    pub fn new(peer: SocketAddr, serial: Arc<SerialChannel>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            peer,
            serial,
            metrics,
        }
    }

    /// Relays until the client disconnects, an error occurs, or `stop`
    /// resolves (a value is sent or the sender is dropped).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serial`] if the scale stops responding and
    /// [`RelayError::WebSocket`] on WebSocket errors other than a disconnect.
    pub async fn run<S>(
        self,
        ws_stream: WebSocketStream<S>,
        mut stop: oneshot::Receiver<()>,
    ) -> Result<SessionEnd, RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut ws_tx, ws_rx) = ws_stream.split();
        let peer = self.peer;

        let outcome = tokio::select! {
            result = serial_to_ws(&self.serial, &mut ws_tx, self.metrics.as_ref(), peer) => {
                debug!("session {peer}: serial→ws direction ended");
                result.map(|()| SessionEnd::ClientClosed)
            }
            result = ws_to_serial(&self.serial, ws_rx, peer) => {
                debug!("session {peer}: ws→serial direction ended");
                result.map(|()| SessionEnd::ClientClosed)
            }
            _ = &mut stop => {
                debug!("session {peer}: stop requested");
                Ok(SessionEnd::Stopped)
            }
        };

        // Best effort: tell the browser we are going away.  The peer may
        // already be gone, so errors are irrelevant here.
        if let Ok(Err(e)) = timeout(CLOSE_TIMEOUT, ws_tx.close()).await {
            debug!("session {peer}: close frame not sent: {e}");
        }

        outcome
    }
}

// ── Serial → WebSocket ────────────────────────────────────────────────────────

/// Forwards complete serial lines to the WebSocket until the peer is gone.
///
/// Each forwarded line that contains a weight is also recorded in `metrics`.
///
/// # Errors
///
/// Returns [`RelayError::Serial`] on a device error and
/// [`RelayError::WebSocket`] on a send error that is not a disconnect.
pub async fn serial_to_ws<S>(
    serial: &SerialChannel,
    ws_tx: &mut S,
    metrics: &dyn MetricsSink,
    peer: SocketAddr,
) -> Result<(), RelayError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    loop {
        let chunk = serial.read(READ_CHUNK_SIZE).await?;
        if chunk.is_empty() {
            sleep(POLL_INTERVAL).await;
            continue;
        }

        for line in serial.assemble_lines(&chunk) {
            let reading = parse_weight(&line);
            if let Err(e) = ws_tx.send(WsMessage::Text(line)).await {
                if is_disconnect(&e) {
                    debug!("session {peer}: WebSocket send failed (client disconnected)");
                    return Ok(());
                }
                return Err(e.into());
            }
            if let Some(reading) = reading {
                metrics.record(&reading);
            }
        }
    }
}

// ── WebSocket → Serial ────────────────────────────────────────────────────────

/// Forwards browser commands to the scale until the WebSocket closes.
///
/// # Errors
///
/// Returns [`RelayError::Serial`] if a write to the scale fails and
/// [`RelayError::WebSocket`] on a receive error that is not a disconnect.
pub async fn ws_to_serial<R>(serial: &SerialChannel, mut ws_rx: R, peer: SocketAddr) -> Result<(), RelayError>
where
    R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = ws_rx.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) if is_disconnect(&e) => {
                debug!("session {peer}: WebSocket closed: {e}");
                return Ok(());
            }
            Err(e) => {
                warn!("session {peer}: WebSocket receive error: {e}");
                return Err(e.into());
            }
        };

        match classify_frame(&message) {
            InboundFrame::Command(command) => {
                serial.write_command(&command).await?;
                info!("  → sent to scale: {command}");
            }
            InboundFrame::Ignore => {}
            InboundFrame::Close => {
                debug!("session {peer}: Close frame received");
                return Ok(());
            }
        }
    }

    debug!("session {peer}: WebSocket stream ended");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
