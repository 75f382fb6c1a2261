//! Scale Bridge: entry point.
//!
//! This binary opens the serial port of a laboratory scale and relays it to a
//! browser page over a local WebSocket.  Every line the scale prints is sent
//! to the page as one text frame; every text frame the page sends is written
//! to the scale followed by `\r\n`.
//!
//! # Why a separate bridge process?
//!
//! Web pages cannot open serial ports.  They can open WebSockets, so this
//! bridge owns the serial device and exposes it at `ws://localhost:8765`.
//!
//! # Usage
//!
//! ```text
//! scale-bridge [OPTIONS] [PORT]
//!
//! Arguments:
//!   [PORT]  Serial device, e.g. /dev/cu.usbserial-10 or COM3.
//!           When omitted, USB serial ports are listed and you pick one.
//!
//! Options:
//!   --host <HOST>        WebSocket host [default: localhost]
//!   --port <PORT>        WebSocket port [default: 8765]
//!   --config <FILE>      Optional TOML config file
//!   --no-metrics-prompt  Do not ask about InfluxDB logging
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable              | Default     | Description             |
//! |-----------------------|-------------|-------------------------|
//! | `SCALE_BRIDGE_HOST`   | `localhost` | WebSocket host          |
//! | `SCALE_BRIDGE_PORT`   | `8765`      | WebSocket port          |
//! | `SCALE_BRIDGE_CONFIG` | (none)      | Path to the config file |
//!
//! CLI args take precedence over environment variables, which take precedence
//! over the config file.

use std::io;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{bail, Context};
use clap::Parser;
use scale_core::{candidate_ports, SerialSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scale_bridge::application::{prompt_influx_config, select_port, MetricsSink, NoopSink, TokenEntry};
use scale_bridge::domain::config::{DEFAULT_WS_HOST, DEFAULT_WS_PORT};
use scale_bridge::domain::{BridgeConfig, FileConfig, InfluxConfig};
use scale_bridge::infrastructure::{check_health, discover_ports, run_server, InfluxSink, SerialChannel};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket bridge for a laboratory scale on a serial port.
///
/// Host and port have no clap default so that a value from the config file can
/// apply when neither the flag nor the environment variable is set.
#[derive(Debug, Parser)]
#[command(
    name = "scale-bridge",
    about = "Relays a serial-port scale to browser pages over WebSocket",
    version
)]
struct Cli {
    /// Serial device path.  When omitted, USB serial ports are listed.
    #[arg(value_name = "PORT")]
    serial_port: Option<String>,

    /// Host name or IP address the WebSocket server binds to [default: localhost].
    #[arg(long = "host", env = "SCALE_BRIDGE_HOST")]
    ws_host: Option<String>,

    /// TCP port of the WebSocket server [default: 8765].
    #[arg(long = "port", env = "SCALE_BRIDGE_PORT")]
    ws_port: Option<u16>,

    /// Optional TOML config file with `[server]` and `[influxdb]` sections.
    #[arg(long, env = "SCALE_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the interactive "Enable InfluxDB logging?" question.
    #[arg(long)]
    no_metrics_prompt: bool,
}

impl Cli {
    /// Merges the CLI values over `file` and the built-in defaults.
    fn into_bridge_config(self, file: FileConfig) -> BridgeConfig {
        BridgeConfig {
            ws_host: self
                .ws_host
                .or(file.server.host)
                .unwrap_or_else(|| DEFAULT_WS_HOST.to_string()),
            ws_port: self.ws_port.or(file.server.port).unwrap_or(DEFAULT_WS_PORT),
            influxdb: file.influxdb,
        }
    }
}

// ── Startup helpers ───────────────────────────────────────────────────────────

/// Lists serial ports and lets the operator pick one on stdin.
///
/// Returns `Ok(None)` when no port is present or the operator gives no answer.
async fn choose_port() -> anyhow::Result<Option<String>> {
    let ports = match discover_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("could not list serial ports: {e}");
            Vec::new()
        }
    };
    let candidates = candidate_ports(ports);

    let choice = tokio::task::spawn_blocking(move || {
        let mut input = io::stdin().lock();
        let mut output = io::stdout().lock();
        select_port(&candidates, &mut input, &mut output)
    })
    .await
    .context("port selection task failed")?
    .context("failed to read the port choice from the terminal")?;
    Ok(choice)
}

/// Builds the metrics sink: InfluxDB when configured and healthy, otherwise a
/// no-op.
async fn start_metrics(configured: Option<InfluxConfig>, prompt: bool) -> anyhow::Result<Arc<dyn MetricsSink>> {
    let influx = match configured {
        Some(config) if config.is_complete() => Some(config),
        Some(_) => {
            warn!("[influxdb] section in the config file is incomplete; InfluxDB logging disabled");
            None
        }
        None if prompt => tokio::task::spawn_blocking(|| {
            let token_entry = TokenEntry::for_stdin();
            let mut input = io::stdin().lock();
            let mut output = io::stdout().lock();
            prompt_influx_config(&mut input, &mut output, token_entry)
        })
        .await
        .context("InfluxDB setup task failed")?
        .context("failed to read InfluxDB settings from the terminal")?,
        None => None,
    };

    let Some(config) = influx else {
        return Ok(Arc::new(NoopSink));
    };

    let client = reqwest::Client::new();
    match check_health(&client, &config.url).await {
        Ok(()) => Ok(Arc::new(InfluxSink::start(client, &config))),
        Err(e) => {
            warn!("  InfluxDB connection failed: {e}");
            warn!("  Continuing without InfluxDB logging.");
            Ok(Arc::new(NoopSink))
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` controls the level.
/// 2. CLI arguments are parsed and merged with the optional config file.
/// 3. The serial port is taken from the command line or picked interactively.
///    If none can be determined the process exits with status 1.
/// 4. The serial port is opened (fatal on failure).
/// 5. InfluxDB logging is configured from the file, or by prompt.
/// 6. A Ctrl+C handler clears the shared `running` flag.
/// 7. [`run_server`] serves browsers until the flag is cleared, then the
///    metrics sink is flushed and closed.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let cli = Cli::parse();
    let prompt_for_metrics = !cli.no_metrics_prompt;
    let serial_port = cli.serial_port.clone();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("failed to load config file {}", path.display()))?,
        None => FileConfig::default(),
    };
    let config = cli.into_bridge_config(file);

    // ── Serial port ───────────────────────────────────────────────────────────
    let port = match serial_port {
        Some(port) => port,
        None => match choose_port().await? {
            Some(port) => port,
            None => bail!(
                "No serial ports found. Connect a scale and try again, or specify the port: \
                 scale-bridge /dev/cu.usbserial-10"
            ),
        },
    };

    let serial = SerialChannel::open(&SerialSettings::new(port.as_str()))
        .with_context(|| format!("could not open serial port {port}"))?;
    let serial = Arc::new(serial);

    // ── Metrics ───────────────────────────────────────────────────────────────
    let metrics = start_metrics(config.influxdb.clone(), prompt_for_metrics).await?;

    info!("Bridge running: {} ↔ {}", serial.name(), config.ws_url());
    info!("Press Ctrl+C to stop.");

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    //
    // The accept loop in `run_server` checks this flag every 200 ms.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ──────────────────────────────────────────────────────
    let result = run_server(&config, serial, Arc::clone(&metrics), running).await;

    metrics.close().await;
    info!("Bridge stopped.");
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_server(host: Option<&str>, port: Option<u16>) -> FileConfig {
        FileConfig::from_toml(&format!(
            "[server]\n{}{}",
            host.map(|h| format!("host = \"{h}\"\n")).unwrap_or_default(),
            port.map(|p| format!("port = {p}\n")).unwrap_or_default(),
        ))
        .unwrap()
    }

    #[test]
    fn test_cli_without_arguments_has_no_serial_port() {
        // Arrange / Act
        let cli = Cli::parse_from(["scale-bridge"]);

        // Assert
        assert_eq!(cli.serial_port, None);
        assert!(!cli.no_metrics_prompt);
    }

    #[test]
    fn test_cli_positional_serial_port() {
        let cli = Cli::parse_from(["scale-bridge", "/dev/cu.usbserial-10"]);
        assert_eq!(cli.serial_port.as_deref(), Some("/dev/cu.usbserial-10"));
    }

    #[test]
    fn test_cli_host_and_port_flags() {
        let cli = Cli::parse_from(["scale-bridge", "--host", "0.0.0.0", "--port", "9000", "COM3"]);
        assert_eq!(cli.ws_host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.ws_port, Some(9000));
        assert_eq!(cli.serial_port.as_deref(), Some("COM3"));
    }

    #[test]
    fn test_cli_rejects_invalid_port_number() {
        let result = Cli::try_parse_from(["scale-bridge", "--port", "99999"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_no_metrics_prompt_flag() {
        let cli = Cli::parse_from(["scale-bridge", "--no-metrics-prompt"]);
        assert!(cli.no_metrics_prompt);
    }

    #[test]
    fn test_into_bridge_config_defaults() {
        // Arrange
        let cli = Cli::parse_from(["scale-bridge", "--host", "localhost", "--port", "8765"]);

        // Act
        let config = cli.into_bridge_config(FileConfig::default());

        // Assert
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_into_bridge_config_file_fills_unset_values() {
        let cli = Cli {
            serial_port: None,
            ws_host: None,
            ws_port: None,
            config: None,
            no_metrics_prompt: false,
        };

        let config = cli.into_bridge_config(file_with_server(Some("0.0.0.0"), Some(9001)));

        assert_eq!(config.ws_host, "0.0.0.0");
        assert_eq!(config.ws_port, 9001);
    }

    #[test]
    fn test_into_bridge_config_cli_overrides_file() {
        let cli = Cli {
            serial_port: None,
            ws_host: Some("127.0.0.1".to_string()),
            ws_port: Some(8000),
            config: None,
            no_metrics_prompt: false,
        };

        let config = cli.into_bridge_config(file_with_server(Some("0.0.0.0"), Some(9001)));

        assert_eq!(config.ws_url(), "ws://127.0.0.1:8000");
    }

    #[test]
    fn test_into_bridge_config_falls_back_to_defaults() {
        let cli = Cli {
            serial_port: None,
            ws_host: None,
            ws_port: None,
            config: None,
            no_metrics_prompt: true,
        };

        let config = cli.into_bridge_config(FileConfig::default());

        assert_eq!(config.ws_host, DEFAULT_WS_HOST);
        assert_eq!(config.ws_port, DEFAULT_WS_PORT);
        assert!(config.influxdb.is_none());
    }

    #[tokio::test]
    async fn test_start_metrics_without_config_or_prompt_is_noop() {
        // No config and no prompt: nothing to connect to, so no network I/O.
        let metrics = start_metrics(None, false).await.unwrap();
        metrics.close().await;
    }
}
