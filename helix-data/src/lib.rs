//! Market-data ingestion and per-run output writers.
//!
//! The replay core consumes fully materialized delta and trade vectors; the
//! readers here normalize the recorder's CSV dialects (header or headerless,
//! case-insensitive column names) into [`helix_core`] types once, up front.

mod delta;
mod fills;
mod trades;
mod writers;

pub use delta::{load_deltas, synthetic_deltas, DeltaStream};
pub use fills::{FillRow, FillsWriter};
pub use trades::load_trades;
pub use writers::{BookcheckWriter, LatencySample, LatencySamplesWriter};

/// Format a numeric ledger field with ten decimal places.
///
/// Output width is fixed so re-runs are byte comparable.
#[must_use]
pub fn fmt_num(value: f64) -> String {
    format!("{value:.10}")
}
