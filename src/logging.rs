// src/logging.rs
//
// Telemetry sinks for the precompute pipeline.
// - PipelineSink: trait used by the pipeline, one call per scenario minute
// - NoopSink:     discards all events
// - JsonlSink:    writes one JSON line per minute for offline analysis
//
// Diagnostics go through `tracing`; `init_tracing` installs the subscriber
// used by the binaries.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::types::Minute;

/// Per-minute pipeline telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct MinuteTelemetry<'a> {
    pub scenario_id: &'a str,
    pub minute: Minute,
    pub threat_score: f64,
    pub crowd_volume: u32,
    pub total_transit_load: u64,
    pub total_pedestrian_volume: u64,
    pub routed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    pub strategy: &'a str,
}

/// Abstract sink for per-minute telemetry.
pub trait PipelineSink {
    fn log_minute(&mut self, event: &MinuteTelemetry<'_>);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl PipelineSink for NoopSink {
    fn log_minute(&mut self, _event: &MinuteTelemetry<'_>) {
        // intentionally no-op
    }
}

/// JSONL file sink.
pub struct JsonlSink<W: Write = BufWriter<File>> {
    writer: W,
}

impl JsonlSink {
    /// Create a new sink writing to `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl<W: Write> JsonlSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PipelineSink for JsonlSink<W> {
    fn log_minute(&mut self, event: &MinuteTelemetry<'_>) {
        // Telemetry failures never abort the pipeline.
        if serde_json::to_writer(&mut self.writer, event).is_ok() {
            let _ = self.writer.write_all(b"\n");
        }
        let _ = self.writer.flush();
    }
}

/// Install the global fmt subscriber on stderr.
///
/// `verbosity` 0 honours `RUST_LOG` (default `info`); 1 forces `debug`,
/// 2+ forces `trace`. A second call is a no-op.
pub fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(minute: Minute) -> MinuteTelemetry<'static> {
        MinuteTelemetry {
            scenario_id: "scenario_a_normal_exit",
            minute,
            threat_score: 0.5,
            crowd_volume: 34_000,
            total_transit_load: 1200,
            total_pedestrian_volume: 3100,
            routed: true,
            severity: Some(4),
            strategy: "fallback",
        }
    }

    #[test]
    fn jsonl_sink_writes_one_object_per_line() {
        let mut sink = JsonlSink::from_writer(Vec::new());
        sink.log_minute(&event(1));
        sink.log_minute(&event(2));
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(v["minute"], 2);
        assert_eq!(v["severity"], 4);
        assert_eq!(v["strategy"], "fallback");
    }

    #[test]
    fn file_sink_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minutes.jsonl");
        {
            let mut sink = JsonlSink::create(&path).unwrap();
            sink.log_minute(&event(0));
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"scenario_id\":\"scenario_a_normal_exit\""));
    }
}
