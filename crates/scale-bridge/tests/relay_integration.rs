//! Integration tests for the WebSocket server and relay sessions.
//!
//! # Purpose
//!
//! These tests run the real accept loop (`serve`) on a loopback port and talk
//! to it with a real WebSocket client, exactly as a browser page would.  Only
//! the serial device is faked: a reader fed from a channel and a writer that
//! records everything sent to the "scale".
//!
//! They verify:
//!
//! - Serial lines arrive as trimmed text frames, even when split across reads.
//! - Browser commands reach the scale with a `\r\n` terminator.
//! - The server keeps accepting after a client leaves.
//! - A newer client supersedes the active one, but a connection that never
//!   completes the WebSocket handshake does not.
//! - Weight readings are recorded in the metrics sink.
//!
//! ```text
//! test ──ws──▶ serve() ──▶ RelaySession ──▶ SerialChannel ──▶ FakePort / Recorder
//! ```

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use scale_bridge::application::{MetricsSink, NoopSink};
use scale_bridge::infrastructure::{serve, SerialChannel};
use scale_core::WeightReading;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

// ── Fake serial device ────────────────────────────────────────────────────────

/// Read half: yields queued chunks, times out like a real port when idle.
struct FakePort {
    chunks: std_mpsc::Receiver<Vec<u8>>,
}

impl Read for FakePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.chunks.recv_timeout(Duration::from_millis(20)) {
            Ok(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(_) => Err(io::ErrorKind::TimedOut.into()),
        }
    }
}

/// Write half: records every byte written to the scale.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<u8>>>);

impl Recorder {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for Recorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Metrics sink that remembers every reading.
#[derive(Default)]
struct RecordingSink(Mutex<Vec<WeightReading>>);

#[async_trait]
impl MetricsSink for RecordingSink {
    fn record(&self, reading: &WeightReading) {
        self.0.lock().unwrap().push(reading.clone());
    }

    async fn close(&self) {}
}

// ── Test fixture ──────────────────────────────────────────────────────────────

/// A running bridge on a loopback port with a fake scale behind it.
struct Bridge {
    addr: SocketAddr,
    scale: std_mpsc::Sender<Vec<u8>>,
    written: Recorder,
    running: Arc<AtomicBool>,
    server: JoinHandle<anyhow::Result<()>>,
}

impl Bridge {
    async fn start(metrics: Arc<dyn MetricsSink>) -> Self {
        let (scale, chunks) = std_mpsc::channel();
        let written = Recorder::default();
        let serial = SerialChannel::from_parts("fake-scale", FakePort { chunks }, written.clone()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let server = tokio::spawn(serve(listener, Arc::new(serial), metrics, Arc::clone(&running)));

        Self {
            addr,
            scale,
            written,
            running,
            server,
        }
    }

    async fn connect(&self) -> Client {
        let (ws, _response) = timeout(WAIT, connect_async(format!("ws://{}", self.addr)))
            .await
            .expect("connect timed out")
            .expect("WebSocket handshake failed");
        ws
    }

    /// Makes the fake scale "print" `bytes`.
    fn scale_prints(&self, bytes: &[u8]) {
        self.scale.send(bytes.to_vec()).unwrap();
    }

    async fn wait_for_written(&self, expected: &[u8]) {
        let result = timeout(WAIT, async {
            while self.written.contents() != expected {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(
            result.is_ok(),
            "scale received {:?}",
            String::from_utf8_lossy(&self.written.contents())
        );
    }

    async fn shutdown(self) {
        self.running.store(false, Ordering::Relaxed);
        timeout(WAIT, self.server)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Waits for the next text frame, skipping control frames.
async fn next_text(ws: &mut Client) -> String {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("no frame within timeout")
            .expect("connection ended")
            .expect("WebSocket error");
        if let Message::Text(text) = frame {
            return text;
        }
    }
}

// ── Serial → WebSocket ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_serial_line_arrives_trimmed() {
    // Arrange
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let mut ws = bridge.connect().await;

    // Act
    bridge.scale_prints(b"  -5.0 kg  \r\n");

    // Assert
    assert_eq!(next_text(&mut ws).await, "-5.0 kg");

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_line_split_across_reads_is_reassembled() {
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let mut ws = bridge.connect().await;

    bridge.scale_prints(b"12.3");
    sleep(Duration::from_millis(150)).await;
    bridge.scale_prints(b"4 g\n");

    assert_eq!(next_text(&mut ws).await, "12.34 g");

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_blank_lines_are_not_forwarded() {
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let mut ws = bridge.connect().await;

    bridge.scale_prints(b"\r\n   \n");
    bridge.scale_prints(b"OK\n");

    assert_eq!(next_text(&mut ws).await, "OK");

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_weight_readings_reach_metrics() {
    // Arrange
    let sink = Arc::new(RecordingSink::default());
    let bridge = Bridge::start(Arc::clone(&sink) as Arc<dyn MetricsSink>).await;
    let mut ws = bridge.connect().await;

    // Act
    bridge.scale_prints(b"ST,GS,  123.45 g\nERR\n");
    assert_eq!(next_text(&mut ws).await, "ST,GS,  123.45 g");
    assert_eq!(next_text(&mut ws).await, "ERR");

    // Assert
    let readings = sink.0.lock().unwrap().clone();
    assert_eq!(
        readings,
        vec![WeightReading {
            value: 123.45,
            unit: Some("g".to_string()),
        }]
    );

    bridge.shutdown().await;
}

// ── WebSocket → Serial ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_command_is_written_with_crlf() {
    // Arrange
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let mut ws = bridge.connect().await;

    // Act
    ws.send(Message::Text("T".to_string())).await.unwrap();

    // Assert
    bridge.wait_for_written(b"T\r\n").await;

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_empty_command_is_not_written() {
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let mut ws = bridge.connect().await;

    ws.send(Message::Text("  ".to_string())).await.unwrap();
    ws.send(Message::Text("Z".to_string())).await.unwrap();

    bridge.wait_for_written(b"Z\r\n").await;

    bridge.shutdown().await;
}

// ── Session lifecycle ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_accepts_new_client_after_disconnect() {
    // Arrange: first client connects and leaves.
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let mut first = bridge.connect().await;
    first.close(None).await.unwrap();
    drop(first);
    sleep(Duration::from_millis(200)).await;

    // Act
    let mut second = bridge.connect().await;
    bridge.scale_prints(b"0.00 g\n");

    // Assert
    assert_eq!(next_text(&mut second).await, "0.00 g");

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_new_client_supersedes_active_client() {
    // Arrange
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let mut first = bridge.connect().await;

    // Act: a second page connects while the first is still open.
    let mut second = bridge.connect().await;

    // Assert: the first client is closed, then the second gets the data.
    let first_end = timeout(WAIT, async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(first_end.is_ok(), "superseded client was not closed");
    bridge.scale_prints(b"7.0 g\n");
    assert_eq!(next_text(&mut second).await, "7.0 g");

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_stray_tcp_connection_leaves_active_client_alone() {
    // Arrange: a working client is receiving readings.
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let mut ws = bridge.connect().await;
    bridge.scale_prints(b"1.0 g\n");
    assert_eq!(next_text(&mut ws).await, "1.0 g");

    // Act: something connects without speaking WebSocket and hangs up.
    drop(TcpStream::connect(bridge.addr).await.unwrap());
    sleep(Duration::from_millis(300)).await;
    bridge.scale_prints(b"2.0 g\n");

    // Assert: the active client was not superseded.
    assert_eq!(next_text(&mut ws).await, "2.0 g");

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_silent_tcp_connection_does_not_block_new_clients() {
    // A connection that never sends its handshake must not hold up others.
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let _silent = TcpStream::connect(bridge.addr).await.unwrap();

    let mut ws = bridge.connect().await;
    bridge.scale_prints(b"3.0 g\n");

    assert_eq!(next_text(&mut ws).await, "3.0 g");

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_active_client() {
    let bridge = Bridge::start(Arc::new(NoopSink)).await;
    let mut ws = bridge.connect().await;

    bridge.shutdown().await;

    let end = timeout(WAIT, ws.next()).await.expect("client not closed");
    assert!(matches!(end, Some(Ok(Message::Close(_))) | Some(Err(_)) | None));
}
