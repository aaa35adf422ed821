//! L2 delta CSV loading with a synthetic fallback trajectory.

use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use helix_core::{BookDelta, Side};
use tracing::{info, warn};

/// A fully loaded delta stream plus its provenance.
pub struct DeltaStream {
    pub deltas: Vec<BookDelta>,
    /// True when the stream came from the built-in seed trajectory rather
    /// than a recorded file.
    pub synthetic: bool,
}

/// Column layout resolved from the header row, or positional when headerless.
#[derive(Clone, Copy)]
struct Columns {
    ts_ms: usize,
    seq: usize,
    prev_seq: usize,
    kind: usize,
    side: usize,
    price: usize,
    size: usize,
}

impl Columns {
    /// Positional order used by headerless recorder output.
    const POSITIONAL: Columns = Columns {
        ts_ms: 0,
        seq: 1,
        prev_seq: 2,
        kind: 3,
        side: 4,
        price: 5,
        size: 6,
    };

    fn from_header(fields: &[String]) -> Self {
        let find = |names: &[&str]| {
            fields
                .iter()
                .position(|f| names.contains(&f.trim().to_ascii_lowercase().as_str()))
        };
        Self {
            ts_ms: find(&["ts_ms"]).unwrap_or(Self::POSITIONAL.ts_ms),
            seq: find(&["seq"]).unwrap_or(Self::POSITIONAL.seq),
            prev_seq: find(&["prev_seq"]).unwrap_or(Self::POSITIONAL.prev_seq),
            kind: find(&["type"]).unwrap_or(Self::POSITIONAL.kind),
            side: find(&["book_side", "side"]).unwrap_or(Self::POSITIONAL.side),
            price: find(&["price"]).unwrap_or(Self::POSITIONAL.price),
            size: find(&["size"]).unwrap_or(Self::POSITIONAL.size),
        }
    }
}

fn contains_alpha(fields: &[String]) -> bool {
    fields.iter().any(|f| f.chars().any(|c| c.is_ascii_alphabetic()))
}

fn get<'a>(fields: &'a [String], idx: usize) -> &'a str {
    fields.get(idx).map(String::as_str).unwrap_or("").trim()
}

fn parse_side(raw: &str) -> Option<Side> {
    match raw.chars().next()?.to_ascii_lowercase() {
        'b' => Some(Side::Buy),
        'a' => Some(Side::Sell),
        _ => None,
    }
}

fn parse_row(fields: &[String], cols: Columns, line_no: usize) -> Option<BookDelta> {
    let side = match parse_side(get(fields, cols.side)) {
        Some(side) => side,
        None => {
            warn!(line_no, "skipping delta row with unrecognized side");
            return None;
        }
    };
    let kind = get(fields, cols.kind).to_ascii_lowercase();
    Some(BookDelta {
        ts_ms: get(fields, cols.ts_ms).parse().unwrap_or(0),
        seq: get(fields, cols.seq).parse().unwrap_or(-1),
        prev_seq: get(fields, cols.prev_seq).parse().unwrap_or(-1),
        is_snapshot: matches!(kind.as_str(), "snapshot" | "snap" | "full"),
        side,
        price: get(fields, cols.price).parse().unwrap_or(0.0),
        qty: get(fields, cols.size).parse().unwrap_or(0.0),
    })
}

/// Load the delta stream from `path`, falling back to the synthetic seed
/// trajectory when the file is missing or holds no parseable rows.
pub fn load_deltas(path: &Path) -> Result<DeltaStream> {
    if !path.exists() {
        warn!(path = %path.display(), "delta file not found; using synthetic seed");
        return Ok(DeltaStream {
            deltas: synthetic_deltas(),
            synthetic: true,
        });
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open delta csv {}", path.display()))?;

    let mut deltas = Vec::new();
    let mut cols = Columns::POSITIONAL;
    for (line_no, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad csv record at line {}", line_no + 1))?;
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        if fields.is_empty() {
            continue;
        }
        if line_no == 0 && contains_alpha(&fields) && fields.iter().any(|f| {
            matches!(
                f.trim().to_ascii_lowercase().as_str(),
                "seq" | "type" | "side" | "book_side"
            )
        }) {
            cols = Columns::from_header(&fields);
            continue;
        }
        if let Some(delta) = parse_row(&fields, cols, line_no + 1) {
            deltas.push(delta);
        }
    }

    if deltas.is_empty() {
        warn!(path = %path.display(), "delta file empty; using synthetic seed");
        return Ok(DeltaStream {
            deltas: synthetic_deltas(),
            synthetic: true,
        });
    }
    info!(rows = deltas.len(), path = %path.display(), "loaded delta stream");
    Ok(DeltaStream {
        deltas,
        synthetic: false,
    })
}

/// Basic synthetic book trajectory: five widening snapshots so downstream
/// tests can run without recorded data. Never used when real data is present.
#[must_use]
pub fn synthetic_deltas() -> Vec<BookDelta> {
    let mut deltas = Vec::with_capacity(10);
    for i in 0..5i64 {
        let step = i as f64;
        let ts_ms = 1000 + i * 100;
        let seq = 2 * i + 1;
        deltas.push(BookDelta {
            seq,
            prev_seq: seq - 1,
            is_snapshot: true,
            ts_ms,
            side: Side::Buy,
            price: 100.0 + step * 0.1,
            qty: 10.0 + step,
        });
        deltas.push(BookDelta {
            seq: seq + 1,
            prev_seq: seq,
            is_snapshot: false,
            ts_ms,
            side: Side::Sell,
            price: 100.5 + step * 0.1,
            qty: 12.0 - step * 0.5,
        });
    }
    deltas
}
