//! Interpretation of browser WebSocket frames.
//!
//! The browser-facing protocol is deliberately thin: every text frame is one
//! command for the scale, and every serial line goes back as one text frame.
//! This module decides what an inbound frame means for the relay so that the
//! I/O loop in `infrastructure::relay` stays a plain dispatch.

use thiserror::Error;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use crate::infrastructure::serial::SerialError;

/// Errors that end a relay session early.
///
/// These stay inside the session: the server logs them and keeps accepting.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The WebSocket upgrade handshake did not complete.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[source] WsError),

    /// The handshake did not finish within the allowed time.
    #[error("WebSocket handshake timed out")]
    HandshakeTimeout,

    /// Reading from or writing to the scale failed.
    #[error("serial error: {0}")]
    Serial(#[from] SerialError),

    /// A WebSocket error other than a normal close.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

/// What the relay should do with one inbound WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Forward this (trimmed, non-empty) command to the scale.
    Command(String),
    /// Nothing to forward (blank command, binary, ping/pong, raw frame).
    Ignore,
    /// The peer sent a Close frame.
    Close,
}

/// Classifies a frame received from the browser.
///
/// Text frames are trimmed and forwarded when non-empty.  The browser
/// protocol is text only, so binary frames are ignored without ending the
/// session.
pub fn classify_frame(message: &WsMessage) -> InboundFrame {
    match message {
        WsMessage::Text(text) => command_from_text(text),
        WsMessage::Close(_) => InboundFrame::Close,
        WsMessage::Binary(_) | WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {
            InboundFrame::Ignore
        }
    }
}

fn command_from_text(text: &str) -> InboundFrame {
    let command = text.trim();
    if command.is_empty() {
        InboundFrame::Ignore
    } else {
        InboundFrame::Command(command.to_string())
    }
}

/// Returns `true` if `error` only means the peer went away.
///
/// Browsers frequently drop the TCP connection without a closing handshake
/// (tab closed, page reloaded), which tungstenite reports as a protocol error.
pub fn is_disconnect(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Protocol(_) | WsError::Io(_)
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
