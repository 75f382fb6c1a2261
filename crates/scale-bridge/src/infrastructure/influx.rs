//! InfluxDB v2 metrics sink.
//!
//! Readings are queued by [`InfluxSink::record`] (never blocks the relay) and
//! written by a background task that batches points:
//!
//! - a batch is flushed when it reaches [`BATCH_SIZE`] points, or
//! - every [`FLUSH_INTERVAL`], whichever comes first.
//!
//! Writes go to `POST {url}/api/v2/write?org=..&bucket=..&precision=ns` with
//! `Authorization: Token <token>`.  A failed write is logged and the batch is
//! dropped; the relay never notices.
//!
//! [`InfluxSink::close`] flushes whatever is still queued and stops the writer.
//! `main.rs` calls it on shutdown.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use scale_core::WeightReading;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::metrics::{line_protocol, MetricsSink};
use crate::domain::config::InfluxConfig;

/// Maximum number of points per write request.
pub const BATCH_SIZE: usize = 500;

/// Maximum time a queued point waits before being written.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout for each HTTP request to InfluxDB.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the final flush during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors talking to InfluxDB.  Logged, never propagated into the relay.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Transport-level failure (connection refused, DNS, timeout).
    #[error("InfluxDB request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("InfluxDB returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// `/health` answered but did not report `"pass"`.
    #[error("InfluxDB is not healthy: {0}")]
    Unhealthy(String),
}

/// Body of `GET /health`.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Checks that the InfluxDB server at `url` reports itself healthy.
///
/// # Errors
///
/// Returns [`MetricsError`] if the request fails, the status is not 2xx, the
/// body is not the expected JSON, or the reported status is not `"pass"`.
pub async fn check_health(client: &reqwest::Client, url: &str) -> Result<(), MetricsError> {
    let response = client
        .get(format!("{}/health", url.trim_end_matches('/')))
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;
    parse_health(status.as_u16(), &body)
}

fn parse_health(status: u16, body: &str) -> Result<(), MetricsError> {
    // InfluxDB answers 503 with a JSON body when it is not ready; prefer that
    // body's message over a bare status error.
    let health: HealthResponse = match serde_json::from_str(body) {
        Ok(health) => health,
        Err(_) if !(200..300).contains(&status) => {
            return Err(MetricsError::Status {
                status,
                body: body.to_string(),
            })
        }
        Err(e) => return Err(MetricsError::Unhealthy(format!("unexpected health response: {e}"))),
    };
    if health.status == "pass" {
        Ok(())
    } else {
        Err(MetricsError::Unhealthy(health.message.unwrap_or(health.status)))
    }
}

// ── Write endpoint ────────────────────────────────────────────────────────────

/// Everything needed to issue one write request.
#[derive(Debug, Clone)]
struct WriteTarget {
    write_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl WriteTarget {
    fn new(config: &InfluxConfig) -> Self {
        Self {
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
        }
    }

    async fn write(&self, client: &reqwest::Client, body: String) -> Result<(), MetricsError> {
        let response = client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .timeout(REQUEST_TIMEOUT)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(MetricsError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

enum Command {
    Point(String),
    Close(oneshot::Sender<()>),
}

/// Batching InfluxDB writer implementing [`MetricsSink`].
pub struct InfluxSink {
    measurement: String,
    commands: mpsc::UnboundedSender<Command>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl InfluxSink {
    /// Starts the background writer for `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(client: reqwest::Client, config: &InfluxConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let target = WriteTarget::new(config);
        let writer = tokio::spawn(write_loop(client, target, command_rx));

        info!(
            "InfluxDB logging enabled → {}/{}/{}",
            config.org, config.bucket, config.measurement
        );
        Self {
            measurement: config.measurement.clone(),
            commands,
            writer: Mutex::new(Some(writer)),
        }
    }
}

#[async_trait]
impl MetricsSink for InfluxSink {
    fn record(&self, reading: &WeightReading) {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let point = line_protocol(&self.measurement, reading, timestamp_ns);
        if self.commands.send(Command::Point(point)).is_err() {
            debug!("InfluxDB writer already closed; reading dropped");
        }
    }

    async fn close(&self) {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(writer) = writer else {
            return;
        };

        info!("flushing InfluxDB...");
        let (ack, flushed) = oneshot::channel();
        if self.commands.send(Command::Close(ack)).is_ok() {
            match timeout(CLOSE_TIMEOUT, flushed).await {
                Ok(_) => {}
                Err(_) => warn!("InfluxDB flush did not finish within {CLOSE_TIMEOUT:?}"),
            }
        }
        writer.abort();
        info!("InfluxDB writer closed");
    }
}

async fn write_loop(
    client: reqwest::Client,
    target: WriteTarget,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut batch: Vec<String> = Vec::with_capacity(BATCH_SIZE);
    let mut ticker = interval(FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Point(point)) => {
                    batch.push(point);
                    if batch.len() >= BATCH_SIZE {
                        flush(&client, &target, &mut batch).await;
                    }
                }
                Some(Command::Close(ack)) => {
                    flush(&client, &target, &mut batch).await;
                    let _ = ack.send(());
                    break;
                }
                None => {
                    flush(&client, &target, &mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                flush(&client, &target, &mut batch).await;
            }
        }
    }
}

async fn flush(client: &reqwest::Client, target: &WriteTarget, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let count = batch.len();
    let body = batch.join("\n");
    batch.clear();

    match target.write(client, body).await {
        Ok(()) => debug!("wrote {count} point(s) to InfluxDB"),
        Err(e) => warn!("  InfluxDB write error: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
