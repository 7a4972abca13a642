//! Metrics sinks: the boundary the aggregation output is handed to.
//!
//! The core is agnostic to transport, batching, and retry; a sink is a
//! capability selected by configuration at startup and injected into the
//! pipeline. Three implementations ship: plain stdout lines, JSON lines, and
//! the Graphite plaintext protocol over TCP.

use crate::aggregate::GroupingSpec;
use crate::config::SinkConfig;
use std::io::{self, BufWriter, Write};
use std::net::TcpStream;

/// Contract required of any metrics sink.
pub trait MetricsEmitter {
    /// Called once before the triples of one projection are emitted.
    fn begin_projection(&mut self, spec: &GroupingSpec) -> io::Result<()>;
    /// Emit one aggregated metric triple for a projection.
    fn emit_projection(
        &mut self,
        spec: &GroupingSpec,
        name: &str,
        value: f64,
        timestamp: i64,
    ) -> io::Result<()>;
    /// Called once after the triples of one projection are emitted.
    fn end_projection(&mut self, spec: &GroupingSpec) -> io::Result<()>;
    /// Emit a run-level statistic outside any projection.
    fn emit(&mut self, name: &str, value: f64, timestamp: i64) -> io::Result<()>;
    /// Flush and release transport resources. Called once, last.
    fn finalize(&mut self) -> io::Result<()>;
}

/// Build the sink named by the configuration.
pub fn create_sink(config: &SinkConfig) -> io::Result<Box<dyn MetricsEmitter>> {
    match config.kind.as_str() {
        "console" => Ok(Box::new(ConsoleSink::stdout())),
        "json" => Ok(Box::new(JsonSink::stdout())),
        "graphite" => {
            let addr = format!("{}:{}", config.graphite_host, config.graphite_port);
            tracing::info!(%addr, "connecting to graphite");
            let stream = TcpStream::connect(&addr)?;
            Ok(Box::new(GraphiteSink {
                writer: BufWriter::new(stream),
            }))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown sink kind {other:?} (expected console, json, or graphite)"),
        )),
    }
}

/// `name value timestamp` lines on stdout.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleSink { out: io::stdout() }
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        ConsoleSink { out }
    }
}

impl<W: Write> MetricsEmitter for ConsoleSink<W> {
    fn begin_projection(&mut self, spec: &GroupingSpec) -> io::Result<()> {
        tracing::debug!(projection = %spec.label(), "emitting projection");
        Ok(())
    }

    fn emit_projection(
        &mut self,
        _spec: &GroupingSpec,
        name: &str,
        value: f64,
        timestamp: i64,
    ) -> io::Result<()> {
        writeln!(self.out, "{name} {value} {timestamp}")
    }

    fn end_projection(&mut self, _spec: &GroupingSpec) -> io::Result<()> {
        Ok(())
    }

    fn emit(&mut self, name: &str, value: f64, timestamp: i64) -> io::Result<()> {
        writeln!(self.out, "{name} {value} {timestamp}")
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// One JSON object per triple on stdout, for piping into other tooling.
pub struct JsonSink<W: Write> {
    out: W,
}

impl JsonSink<io::Stdout> {
    pub fn stdout() -> Self {
        JsonSink { out: io::stdout() }
    }
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        JsonSink { out }
    }

    fn write_triple(&mut self, name: &str, value: f64, timestamp: i64) -> io::Result<()> {
        let obj = serde_json::json!({
            "name": name,
            "value": value,
            "timestamp": timestamp,
        });
        writeln!(self.out, "{obj}")
    }
}

impl<W: Write> MetricsEmitter for JsonSink<W> {
    fn begin_projection(&mut self, _spec: &GroupingSpec) -> io::Result<()> {
        Ok(())
    }

    fn emit_projection(
        &mut self,
        _spec: &GroupingSpec,
        name: &str,
        value: f64,
        timestamp: i64,
    ) -> io::Result<()> {
        self.write_triple(name, value, timestamp)
    }

    fn end_projection(&mut self, _spec: &GroupingSpec) -> io::Result<()> {
        Ok(())
    }

    fn emit(&mut self, name: &str, value: f64, timestamp: i64) -> io::Result<()> {
        self.write_triple(name, value, timestamp)
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Graphite plaintext protocol: `name value timestamp\n` over TCP, buffered,
/// flushed in finalize. Delivery is best-effort; the protocol has no acks.
pub struct GraphiteSink {
    writer: BufWriter<TcpStream>,
}

impl MetricsEmitter for GraphiteSink {
    fn begin_projection(&mut self, spec: &GroupingSpec) -> io::Result<()> {
        tracing::debug!(projection = %spec.label(), "sending projection to graphite");
        Ok(())
    }

    fn emit_projection(
        &mut self,
        _spec: &GroupingSpec,
        name: &str,
        value: f64,
        timestamp: i64,
    ) -> io::Result<()> {
        writeln!(self.writer, "{name} {value} {timestamp}")
    }

    fn end_projection(&mut self, _spec: &GroupingSpec) -> io::Result<()> {
        Ok(())
    }

    fn emit(&mut self, name: &str, value: f64, timestamp: i64) -> io::Result<()> {
        writeln!(self.writer, "{name} {value} {timestamp}")
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
