//! Per-run fills ledger writer.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;
use helix_core::{ActionSource, Liquidity, RejectReason, Side};

use crate::fmt_num;

/// Exact ledger column set, in output order.
const HEADER: [&str; 27] = [
    "order_id",
    "ts_ms",
    "seq",
    "status",
    "side",
    "liquidity",
    "src",
    "reason",
    "vwap",
    "filled_qty",
    "unfilled_qty",
    "fee",
    "fee_bps",
    "gross",
    "net",
    "exec_cost_ticks_signed",
    "mid",
    "best",
    "spread_paid_ticks",
    "slip_ticks",
    "target_notional",
    "filled_notional",
    "crossing",
    "levels_crossed",
    "adv_ticks",
    "queue_time_ms",
    "adv_selection_ticks",
];

/// One row of the fills ledger. Rows are buffered by the run aggregator and
/// written in one pass at end of run, after adverse-selection horizons have
/// had a chance to resolve.
#[derive(Clone, Debug)]
pub struct FillRow {
    pub order_id: u64,
    pub ts_ms: i64,
    pub seq: i64,
    pub filled: bool,
    pub side: Side,
    pub liquidity: Option<Liquidity>,
    pub src: ActionSource,
    pub reason: Option<RejectReason>,
    pub vwap: f64,
    pub filled_qty: f64,
    pub unfilled_qty: f64,
    pub fee: f64,
    pub fee_bps: f64,
    pub gross: f64,
    pub net: f64,
    pub exec_cost_ticks_signed: f64,
    pub mid: f64,
    pub best: f64,
    pub spread_paid_ticks: f64,
    pub slip_ticks: f64,
    pub target_notional: f64,
    pub filled_notional: f64,
    pub crossing: bool,
    pub levels_crossed: usize,
    pub adv_ticks: f64,
    pub queue_time_ms: i64,
    /// Resolved adverse-selection drift; empty in the ledger until the
    /// horizon passes.
    pub adv_selection_ticks: Option<f64>,
}

impl FillRow {
    fn record(&self) -> Vec<String> {
        vec![
            self.order_id.to_string(),
            self.ts_ms.to_string(),
            self.seq.to_string(),
            if self.filled { "filled" } else { "rejected" }.to_string(),
            self.side.as_str().to_string(),
            self.liquidity.map_or("NONE", Liquidity::as_str).to_string(),
            self.src.as_str().to_string(),
            self.reason.map_or("", RejectReason::as_str).to_string(),
            fmt_num(self.vwap),
            fmt_num(self.filled_qty),
            fmt_num(self.unfilled_qty),
            fmt_num(self.fee),
            fmt_num(self.fee_bps),
            fmt_num(self.gross),
            fmt_num(self.net),
            fmt_num(self.exec_cost_ticks_signed),
            fmt_num(self.mid),
            fmt_num(self.best),
            fmt_num(self.spread_paid_ticks),
            fmt_num(self.slip_ticks),
            fmt_num(self.target_notional),
            fmt_num(self.filled_notional),
            u8::from(self.crossing).to_string(),
            self.levels_crossed.to_string(),
            fmt_num(self.adv_ticks),
            self.queue_time_ms.to_string(),
            self.adv_selection_ticks.map(fmt_num).unwrap_or_default(),
        ]
    }
}

/// Writes the fills ledger in one deterministic pass.
pub struct FillsWriter;

impl FillsWriter {
    /// Write header plus all buffered rows to `path`.
    pub fn write_all(path: &Path, rows: &[FillRow]) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("failed to create fills ledger {}", path.display()))?;
        writer.write_record(HEADER)?;
        for row in rows {
            writer.write_record(row.record())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Render the ledger into any writer; used by tests and dry runs.
    pub fn render<W: Write>(out: W, rows: &[FillRow]) -> Result<()> {
        let mut writer = WriterBuilder::new().from_writer(out);
        writer.write_record(HEADER)?;
        for row in rows {
            writer.write_record(row.record())?;
        }
        writer.flush()?;
        Ok(())
    }
}
