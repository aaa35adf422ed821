//! Strategy surface of the replay engine.
//!
//! The engine's only contract with a strategy is "produce an action from a
//! book snapshot"; everything else (rules, risk, routing, accounting) is the
//! engine's business.

mod demo;
mod features;

pub use demo::{DemoMaker, DemoTaker};
pub use features::BookFeatures;

use helix_core::{Action, ActionSource, OrderbookSnapshot, Side, TradeTape};

/// A decision source driven once per tick, after fills have been observed.
pub trait Strategy {
    /// Ledger attribution for everything this strategy issues.
    fn source(&self) -> ActionSource;

    /// Produce at most one action for the current book.
    fn on_book(
        &mut self,
        book: &OrderbookSnapshot,
        tape: &TradeTape,
        now_ts: i64,
    ) -> Option<Action>;
}

/// Feature-threshold strategy: trades one unit in the direction of the trend
/// when the book imbalance agrees.
pub struct ThresholdStrategy {
    threshold: f64,
}

impl ThresholdStrategy {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for ThresholdStrategy {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Strategy for ThresholdStrategy {
    fn source(&self) -> ActionSource {
        ActionSource::Strategy
    }

    fn on_book(
        &mut self,
        book: &OrderbookSnapshot,
        tape: &TradeTape,
        _now_ts: i64,
    ) -> Option<Action> {
        let features = BookFeatures::compute(book, tape);
        if features.trend_strength > self.threshold && features.imbalance > 0.0 {
            Some(Action::market(Side::Buy, 1.0))
        } else if features.trend_strength < -self.threshold && features.imbalance < 0.0 {
            Some(Action::market(Side::Sell, 1.0))
        } else {
            None
        }
    }
}
