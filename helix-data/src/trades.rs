//! Trade-print CSV loading.

use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use helix_core::{Side, TradePrint};
use tracing::{info, warn};

fn parse_side(raw: &str) -> Option<Side> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "buy" | "b" | "bid" => Some(Side::Buy),
        "sell" | "s" | "a" | "ask" => Some(Side::Sell),
        _ => None,
    }
}

/// Load the trade tape from `path`.
///
/// Columns: `ts_ms, side, price, size, trade_id`; extra recorder columns
/// (`seq`, `recv_ts`) are tolerated and ignored. Input order is preserved;
/// duplicate suppression is the recorder's responsibility.
pub fn load_trades(path: &Path) -> Result<Vec<TradePrint>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open trade csv {}", path.display()))?;

    let mut trades = Vec::new();
    let mut indices = (0usize, 1usize, 2usize, 3usize, 4usize);
    for (line_no, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad csv record at line {}", line_no + 1))?;
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        if fields.is_empty() {
            continue;
        }
        if line_no == 0 && fields.iter().any(|f| f.eq_ignore_ascii_case("ts_ms")) {
            let find = |name: &str, default: usize| {
                fields
                    .iter()
                    .position(|f| f.eq_ignore_ascii_case(name))
                    .unwrap_or(default)
            };
            indices = (
                find("ts_ms", 0),
                find("side", 1),
                find("price", 2),
                find("size", 3),
                find("trade_id", 4),
            );
            continue;
        }
        let get = |idx: usize| fields.get(idx).map(String::as_str).unwrap_or("");
        let Some(side) = parse_side(get(indices.1)) else {
            warn!(line_no = line_no + 1, "skipping trade row with unrecognized side");
            continue;
        };
        trades.push(TradePrint {
            ts_ms: get(indices.0).parse().unwrap_or(0),
            side,
            price: get(indices.2).parse().unwrap_or(0.0),
            size: get(indices.3).parse().unwrap_or(0.0),
            trade_id: get(indices.4).to_string(),
        });
    }
    info!(rows = trades.len(), path = %path.display(), "loaded trade tape");
    Ok(trades)
}
