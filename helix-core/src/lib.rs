//! Fundamental data types shared across the Helix workspace.

pub mod book;
pub mod error;
pub mod hash;
pub mod latency;
pub mod rng;
mod types;

pub use book::{BookReconstructor, BookcheckRow};
pub use error::EngineError;
pub use hash::fnv1a64;
pub use latency::{deterministic_latency_ms, LatencyConfig};
pub use rng::Mt64;
pub use types::{
    Action, ActionKind, ActionSource, BookDelta, Fill, FillStatus, Liquidity, Order, OrderStatus,
    OrderType, OrderbookSnapshot, Position, PriceLevel, RejectReason, Side, TradePrint, TradeTape,
};

/// Alias for price precision.
pub type Price = f64;
/// Alias for quantity precision.
pub type Qty = f64;
/// Alias used for human-readable market symbols (e.g., `BTCUSDT`).
pub type Symbol = String;

/// Unique identifier assigned to orders by the order manager.
pub type OrderId = u64;

/// Epsilon used for float equality and zero tests throughout the engine.
pub const EPS: f64 = 1e-9;

/// Looser epsilon used for the PnL identity and overfill checks.
pub const PNL_EPS: f64 = 1e-6;
