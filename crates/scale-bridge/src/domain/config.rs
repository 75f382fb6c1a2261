//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is assembled in `main.rs` from three layers, highest priority first:
//!
//! 1. CLI arguments (and their environment variable fallbacks),
//! 2. the optional TOML file given with `--config`,
//! 3. the built-in defaults below.
//!
//! # Example config file
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8765
//!
//! [influxdb]
//! url = "http://localhost:8086"
//! org = "lab"
//! bucket = "scales"
//! token = "..."
//! measurement = "kern_lab1"
//! ```
//!
//! When the `[influxdb]` section is present the interactive InfluxDB prompt is
//! skipped.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default WebSocket host; browsers connect to `ws://localhost:8765`.
pub const DEFAULT_WS_HOST: &str = "localhost";

/// Default WebSocket port.
pub const DEFAULT_WS_PORT: u16 = 8765;

/// Default InfluxDB base URL offered by the setup prompt.
pub const DEFAULT_INFLUX_URL: &str = "http://localhost:8086";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// All runtime configuration for the scale bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Host name or IP address the WebSocket server binds to.
    ///
    /// `localhost` keeps the bridge private to this machine, which is what the
    /// browser page expects.  Use `0.0.0.0` to expose it on the LAN.
    pub ws_host: String,

    /// TCP port of the WebSocket server.
    pub ws_port: u16,

    /// InfluxDB settings; `None` disables metrics logging.
    pub influxdb: Option<InfluxConfig>,
}

impl BridgeConfig {
    /// The URL browsers use to reach the bridge.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.ws_host, self.ws_port)
    }
}

impl Default for BridgeConfig {
    /// | Field    | Default     |
    /// |----------|-------------|
    /// | ws_host  | `localhost` |
    /// | ws_port  | `8765`      |
    /// | influxdb | disabled    |
    fn default() -> Self {
        Self {
            ws_host: DEFAULT_WS_HOST.to_string(),
            ws_port: DEFAULT_WS_PORT,
            influxdb: None,
        }
    }
}

/// Connection settings for an InfluxDB v2 bucket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InfluxConfig {
    /// Base URL of the InfluxDB server.
    #[serde(default = "default_influx_url")]
    pub url: String,
    /// Organization name.
    pub org: String,
    /// Target bucket.
    pub bucket: String,
    /// API token with write access to `bucket`.
    pub token: String,
    /// Measurement name for weight points, e.g. `kern_lab1`.
    pub measurement: String,
}

impl InfluxConfig {
    /// Returns `true` when every required field is non-empty.
    pub fn is_complete(&self) -> bool {
        [&self.url, &self.org, &self.bucket, &self.token, &self.measurement]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

fn default_influx_url() -> String {
    DEFAULT_INFLUX_URL.to_string()
}

// ── Config file schema ────────────────────────────────────────────────────────

/// Contents of the optional `--config` TOML file.  Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    pub influxdb: Option<InfluxConfig>,
}

/// `[server]` section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl FileConfig {
    /// Parses a config file's TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or wrong field types.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn influx() -> InfluxConfig {
        InfluxConfig {
            url: DEFAULT_INFLUX_URL.to_string(),
            org: "lab".to_string(),
            bucket: "scales".to_string(),
            token: "secret".to_string(),
            measurement: "kern_lab1".to_string(),
        }
    }

    #[test]
    fn test_default_endpoint_is_localhost_8765() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.ws_host, "localhost");
        assert_eq!(cfg.ws_port, 8765);
        assert_eq!(cfg.ws_url(), "ws://localhost:8765");
    }

    #[test]
    fn test_default_has_metrics_disabled() {
        assert!(BridgeConfig::default().influxdb.is_none());
    }

    #[test]
    fn test_complete_influx_config() {
        assert!(influx().is_complete());
    }

    #[test]
    fn test_blank_token_makes_influx_config_incomplete() {
        let cfg = InfluxConfig {
            token: "   ".to_string(),
            ..influx()
        };
        assert!(!cfg.is_complete());
    }

    #[test]
    fn test_empty_file_parses_to_defaults() {
        let file = FileConfig::from_toml("").unwrap();
        assert_eq!(file, FileConfig::default());
    }

    #[test]
    fn test_full_file_parses_all_sections() {
        // Arrange
        let text = r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [influxdb]
            org = "lab"
            bucket = "scales"
            token = "secret"
            measurement = "kern_lab1"
        "#;

        // Act
        let file = FileConfig::from_toml(text).unwrap();

        // Assert: url falls back to its default when omitted
        assert_eq!(file.server.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(file.server.port, Some(9000));
        assert_eq!(file.influxdb, Some(influx()));
    }

    #[test]
    fn test_wrong_port_type_is_a_parse_error() {
        let result = FileConfig::from_toml("[server]\nport = \"eighty\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = FileConfig::load(Path::new("/nonexistent/scale-bridge.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
