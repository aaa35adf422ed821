//! Fatal error conditions that terminate a replay run.

use thiserror::Error;

/// Run-terminating failures. Everything here maps to a non-zero exit code;
/// strategy-level refusals are ledger rows, not errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A non-snapshot delta whose `prev_seq` does not chain to the last
    /// applied sequence number.
    #[error("sequence gap at seq={seq}: prev_seq={prev_seq} does not follow last_seq={last_seq}")]
    SeqGap { seq: i64, prev_seq: i64, last_seq: i64 },

    /// A delta whose sequence number moves backwards.
    #[error("sequence rollback at seq={seq}: last applied seq={last_seq}")]
    SeqRollback { seq: i64, last_seq: i64 },

    /// Deltas must carry non-negative quantities; zero means delete.
    #[error("negative qty {qty} in delta at seq={seq}")]
    NegativeQty { seq: i64, qty: f64 },

    /// The book violated its top-of-book invariants outside a snapshot load.
    #[error("invalid top of book at seq={seq}: bid={best_bid}/{bid_size} ask={best_ask}/{ask_size}")]
    InvalidTopOfBook {
        seq: i64,
        best_bid: f64,
        best_ask: f64,
        bid_size: f64,
        ask_size: f64,
    },

    /// Overfill or other illegal order-status transition.
    #[error("illegal order transition: {0}")]
    IllegalTransition(String),

    /// The realized/unrealized/fees identity drifted past tolerance.
    #[error("pnl identity violation: |{lhs} - {rhs}| = {diff}")]
    PnlIdentity { lhs: f64, rhs: f64, diff: f64 },

    /// Maker fills whose adverse-selection horizon never resolved.
    #[error("{count} adverse-selection samples unresolved at end of run")]
    AdverseSelectionUnresolved { count: usize },

    /// A component was constructed without its required configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}
