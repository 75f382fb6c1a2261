//! The shared serial channel to the scale.
//!
//! # Threading model
//!
//! Serial reads block the calling thread for up to the read timeout (100 ms).
//! Doing that on a Tokio worker would stall every WebSocket task scheduled on
//! it, so the channel splits the device into two independent handles:
//!
//! - **Read side**: owned by a dedicated `serial-reader` OS thread.  Async
//!   callers send a read request over a channel and await the reply on a
//!   oneshot.  Requests are served one at a time, so there is never more than
//!   one read in flight.
//! - **Write side**: a second handle obtained with `try_clone`, guarded by a
//!   mutex and written from `spawn_blocking`.
//!
//! # No lost bytes on cancellation
//!
//! When a relay session ends, its pending read future is dropped.  The reader
//! thread may still be blocked inside that read; if the read returns data
//! nobody is waiting for, the thread keeps the bytes and hands them to the
//! next read request instead of discarding them.
//!
//! # Line buffer
//!
//! The [`LineAssembler`] lives here too, so a partial line that straddles two
//! sessions is completed rather than dropped.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use scale_core::{frame_command, LineAssembler, SerialSettings};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Errors raised by the serial channel.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The device does not exist, is claimed by another process, or rejected
    /// the line settings.  Fatal at startup.
    #[error("could not open serial port {path}: {source}")]
    PortOpen {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// A read or write on an open port failed (e.g., the scale was unplugged).
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// The reader thread has exited, so no further reads are possible.
    #[error("serial reader thread has stopped")]
    ReaderGone,
}

/// One read request for the reader thread.
struct ReadRequest {
    max_bytes: usize,
    reply: oneshot::Sender<io::Result<Vec<u8>>>,
}

/// An open serial device shared by successive relay sessions.
///
/// Wrap it in an `Arc` and hand a clone to each session.  At most one session
/// reads at a time by convention; the server enforces this by running a single
/// session at once.
pub struct SerialChannel {
    name: String,
    requests: mpsc::Sender<ReadRequest>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    lines: Mutex<LineAssembler>,
}

impl SerialChannel {
    /// Opens the device described by `settings` with 8N1 framing and no flow
    /// control.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::PortOpen`] if the port cannot be opened or its
    /// handle cannot be cloned for writing.
    pub fn open(settings: &SerialSettings) -> Result<Self, SerialError> {
        let port_open_error = |source| SerialError::PortOpen {
            path: settings.path.clone(),
            source,
        };

        let port = serialport::new(&settings.path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(port_open_error)?;

        let writer = port.try_clone().map_err(port_open_error)?;
        let name = port.name().unwrap_or_else(|| settings.path.clone());

        info!(
            "serial port {name} opened at {} baud (8N1, timeout {:?})",
            settings.baud_rate, settings.read_timeout
        );
        Self::from_parts(name, port, writer)
    }

    /// Builds a channel over arbitrary read and write halves.
    ///
    /// `reader` must behave like a serial port with a read timeout: return
    /// `ErrorKind::TimedOut` (or `Ok(0)`) when no data arrived in time.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Io`] if the reader thread cannot be spawned.
    pub fn from_parts<R, W>(name: impl Into<String>, reader: R, writer: W) -> Result<Self, SerialError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let name = name.into();
        // Capacity 1: a new request can only be queued once the previous one
        // has been picked up.
        let (requests, request_rx) = mpsc::channel(1);

        thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || reader_loop(reader, request_rx))?;

        Ok(Self {
            name,
            requests,
            writer: Arc::new(Mutex::new(Box::new(writer))),
            lines: Mutex::new(LineAssembler::new()),
        })
    }

    /// Device name used in log messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads up to `max_bytes`, waiting at most one read timeout.
    ///
    /// Returns an empty vector when nothing arrived in time.  Never blocks the
    /// async runtime.  Dropping the returned future is safe: bytes read for a
    /// dropped request are returned by the next call.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Io`] on device failure and
    /// [`SerialError::ReaderGone`] if the reader thread has exited.
    pub async fn read(&self, max_bytes: usize) -> Result<Vec<u8>, SerialError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(ReadRequest { max_bytes, reply })
            .await
            .map_err(|_| SerialError::ReaderGone)?;
        let chunk = response.await.map_err(|_| SerialError::ReaderGone)??;
        Ok(chunk)
    }

    /// Feeds a raw chunk to the channel's line buffer and returns the lines it
    /// completed.
    pub fn assemble_lines(&self, chunk: &[u8]) -> Vec<String> {
        // A poisoned lock only means another thread panicked mid-feed; the
        // buffer itself is always a valid string.
        let mut assembler = self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let lines: Vec<String> = assembler.feed(chunk).collect();
        if !assembler.pending().is_empty() {
            trace!("holding partial line {:?}", assembler.pending());
        }
        lines
    }

    /// Writes `command` followed by `\r\n`, blocking until the whole payload
    /// has been handed to the driver.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Io`] if the write or flush fails.
    pub async fn write_command(&self, command: &str) -> Result<(), SerialError> {
        let payload = frame_command(command);
        let writer = Arc::clone(&self.writer);

        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut port = writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            port.write_all(&payload)?;
            port.flush()
        })
        .await
        .map_err(io::Error::other)??;
        Ok(())
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel").field("name", &self.name).finish_non_exhaustive()
    }
}

// ── Reader thread ─────────────────────────────────────────────────────────────

/// Serves read requests until every [`SerialChannel`] handle is dropped.
fn reader_loop<R: Read>(mut reader: R, mut requests: mpsc::Receiver<ReadRequest>) {
    // Bytes read for a request whose caller had already gone away.
    let mut carried: Vec<u8> = Vec::new();

    while let Some(ReadRequest { max_bytes, reply }) = requests.blocking_recv() {
        let result = if carried.is_empty() {
            read_chunk(&mut reader, max_bytes)
        } else {
            Ok(std::mem::take(&mut carried))
        };

        if let Err(unclaimed) = reply.send(result) {
            match unclaimed {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!("keeping {} serial bytes for the next reader", bytes.len());
                    carried.extend(bytes);
                }
                Ok(_) => {}
                Err(e) => warn!("serial read failed with no reader waiting: {e}"),
            }
        }
    }

    debug!("serial reader thread exiting");
}

/// Performs one bounded read; a timeout yields an empty chunk.
fn read_chunk<R: Read>(reader: &mut R, max_bytes: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; max_bytes];
    match reader.read(&mut buf) {
        Ok(n) => {
            buf.truncate(n);
            Ok(buf)
        }
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
