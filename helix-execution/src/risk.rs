//! Pre-trade risk validation and position/PnL bookkeeping.

use helix_core::{Action, Fill, Position, EPS};

/// Projected-position limits plus the run's single position record.
///
/// The average entry price is held flat on pure reductions (the realized leg
/// books the difference), re-weighted when extending, and reset to the fill
/// price on a sign flip after realizing the fully-closed portion.
pub struct RiskEngine {
    position: Position,
    max_position: f64,
    max_notional: f64,
}

impl RiskEngine {
    #[must_use]
    pub fn new(max_position: f64, max_notional: f64) -> Self {
        Self {
            position: Position::default(),
            max_position,
            max_notional,
        }
    }

    #[must_use]
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Would `action` keep the projected position inside limits at
    /// `ref_price`?
    #[must_use]
    pub fn validate(&self, action: &Action, ref_price: f64) -> bool {
        let projected = self.position.qty + action.side.sign() * action.size;
        let projected_notional = projected.abs() * ref_price.abs();
        projected.abs() <= self.max_position && projected_notional <= self.max_notional
    }

    /// Fold a fill into the position.
    pub fn update(&mut self, fill: &Fill) {
        let signed = fill.side.sign() * fill.filled_qty;
        if signed == 0.0 {
            return;
        }
        let prev = self.position.qty;
        let new = prev + signed;

        if prev != 0.0 && signed.signum() != prev.signum() {
            let closed = prev.abs().min(signed.abs());
            self.position.realized_pnl +=
                closed * (fill.vwap_price - self.position.avg_price) * prev.signum();
        }

        if new.abs() < EPS {
            self.position.qty = 0.0;
            self.position.avg_price = 0.0;
            return;
        }
        if prev == 0.0 || (signed.signum() == prev.signum()) {
            // Extending (or opening): weighted average of contributions.
            self.position.avg_price =
                (self.position.avg_price * prev + fill.vwap_price * signed) / new;
        } else if new.signum() != prev.signum() {
            // Sign flip: the residual opens a fresh position at the fill.
            self.position.avg_price = fill.vwap_price;
        }
        // Pure reduction keeps avg_price.
        self.position.qty = new;
    }

    /// Mark-to-market PnL at `mid` over the average entry.
    #[must_use]
    pub fn unrealized(&self, mid: f64) -> f64 {
        self.position.qty * (mid - self.position.avg_price)
    }

    /// Realized plus unrealized at `mid`; the aggregator tracks this
    /// incrementally and checks the identity against it.
    #[must_use]
    pub fn marked_equity(&self, mid: f64) -> f64 {
        self.position.realized_pnl + self.unrealized(mid)
    }
}
