//! Metrics sink abstraction and InfluxDB line-protocol encoding.
//!
//! Every scale line that contains a weight is offered to a [`MetricsSink`].
//! The sink is constructed once in `main.rs` and injected into the server as
//! an `Arc<dyn MetricsSink>`; when metrics are disabled it is a [`NoopSink`].
//!
//! # Line protocol
//!
//! InfluxDB ingests points as text lines of the form
//!
//! ```text
//! <measurement>,unit=<unit> value=<float> <timestamp_ns>
//! ```
//!
//! Measurement names and tag values must escape commas and spaces (tags also
//! escape `=`), which [`line_protocol`] takes care of.

use async_trait::async_trait;
use scale_core::WeightReading;

/// Destination for parsed weight readings.
///
/// `record` is called from the relay's hot path and must not block: real
/// implementations queue the reading and write it from a background task.
/// Write failures are logged by the implementation and never reach the relay.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Queues one reading, timestamped now.
    fn record(&self, reading: &WeightReading);

    /// Flushes queued readings and releases the sink.  Safe to call twice.
    async fn close(&self);
}

/// Sink used when metrics logging is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl MetricsSink for NoopSink {
    fn record(&self, _reading: &WeightReading) {}

    async fn close(&self) {}
}

/// Encodes one reading as an InfluxDB line-protocol point.
///
/// The value is always written as a float field, matching what the scale
/// prints; the unit becomes the `unit` tag (`"unknown"` when absent).
pub fn line_protocol(measurement: &str, reading: &WeightReading, timestamp_ns: u128) -> String {
    format!(
        "{},unit={} value={:?} {}",
        escape_measurement(measurement),
        escape_tag(reading.unit_or_unknown()),
        reading.value,
        timestamp_ns
    )
}

fn escape_measurement(name: &str) -> String {
    escape(name, &[',', ' '])
}

fn escape_tag(value: &str) -> String {
    escape(value, &[',', ' ', '='])
}

fn escape(text: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(value: f64, unit: Option<&str>) -> WeightReading {
        WeightReading {
            value,
            unit: unit.map(str::to_string),
        }
    }

    #[test]
    fn test_line_protocol_basic_point() {
        let line = line_protocol("kern_lab1", &reading(123.45, Some("g")), 1_700_000_000_000_000_000);
        assert_eq!(line, "kern_lab1,unit=g value=123.45 1700000000000000000");
    }

    #[test]
    fn test_line_protocol_integer_value_is_written_as_float() {
        // `7` without a decimal point would be an integer field in InfluxDB
        // and conflict with earlier float points.
        let line = line_protocol("m", &reading(7.0, Some("%")), 1);
        assert_eq!(line, "m,unit=% value=7.0 1");
    }

    #[test]
    fn test_line_protocol_missing_unit_is_tagged_unknown() {
        let line = line_protocol("m", &reading(-5.0, None), 1);
        assert_eq!(line, "m,unit=unknown value=-5.0 1");
    }

    #[test]
    fn test_line_protocol_escapes_special_characters() {
        let line = line_protocol("lab scale,1", &reading(1.0, Some("a=b c")), 1);
        assert_eq!(line, r"lab\ scale\,1,unit=a\=b\ c value=1.0 1");
    }

    #[tokio::test]
    async fn test_noop_sink_accepts_readings_and_closes() {
        let sink = NoopSink;
        sink.record(&reading(1.0, Some("g")));
        sink.close().await;
        sink.close().await;
    }
}
