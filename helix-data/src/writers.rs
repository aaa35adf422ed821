//! Bookcheck and latency-sample CSV sinks.

use std::path::Path;

use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use helix_core::book::BookcheckRow;

use crate::fmt_num;

/// Streams periodic top-of-book rows for comparison against the recorder.
pub struct BookcheckWriter {
    writer: Writer<std::fs::File>,
}

impl BookcheckWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("failed to create bookcheck csv {}", path.display()))?;
        writer.write_record(["ts_ms", "seq", "best_bid", "best_ask", "bid_size", "ask_size"])?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, row: &BookcheckRow) -> Result<()> {
        self.writer.write_record([
            row.ts_ms.to_string(),
            row.seq.to_string(),
            fmt_num(row.best_bid),
            fmt_num(row.best_ask),
            fmt_num(row.bid_size),
            fmt_num(row.ask_size),
        ])?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// One latency draw per scheduled taker action, for offline re-fitting.
#[derive(Clone, Copy, Debug)]
pub struct LatencySample {
    pub ts_ms: i64,
    pub seq: i64,
    pub action_idx: u64,
    pub latency_ms: f64,
}

/// Writes `latency_samples.csv` in one pass at end of run.
pub struct LatencySamplesWriter;

impl LatencySamplesWriter {
    pub fn write_all(path: &Path, samples: &[LatencySample]) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("failed to create latency samples {}", path.display()))?;
        writer.write_record(["ts_ms", "seq", "action_idx", "latency_ms"])?;
        for sample in samples {
            writer.write_record([
                sample.ts_ms.to_string(),
                sample.seq.to_string(),
                sample.action_idx.to_string(),
                fmt_num(sample.latency_ms),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}
