//! Taker matching: walk the book, report VWAP and slippage.

use helix_core::{
    Action, EngineError, Fill, FillStatus, Liquidity, OrderbookSnapshot, PriceLevel, RejectReason,
    Side,
};

/// Simulates aggressive executions against a book snapshot.
///
/// The engine is stateless; every call consumes the snapshot it is given, so
/// latency-delayed actions naturally fill on the post-latency book.
pub struct MatchingEngine {
    symbol: String,
    tick_size: f64,
    reject_on_insufficient_depth: bool,
}

impl MatchingEngine {
    /// `tick_size` must be positive; a missing tick would silently zero every
    /// slippage figure, so it is a construction error instead.
    pub fn new(
        symbol: impl Into<String>,
        tick_size: f64,
        reject_on_insufficient_depth: bool,
    ) -> Result<Self, EngineError> {
        if tick_size <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "matching engine requires a positive tick size".to_string(),
            ));
        }
        Ok(Self {
            symbol: symbol.into(),
            tick_size,
            reject_on_insufficient_depth,
        })
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    /// Simulate `action` against `book`, consuming levels in book order.
    #[must_use]
    pub fn simulate(&self, action: &Action, book: &OrderbookSnapshot) -> Fill {
        if !action.side.is_directional() {
            return Fill::rejected(action.side, RejectReason::BadSide);
        }
        if action.size <= 0.0 {
            return Fill::rejected(action.side, RejectReason::ZeroQty);
        }

        let levels = side_levels(book, action.side);
        if levels.is_empty() {
            let reason = match action.side {
                Side::Buy => RejectReason::NoAsk,
                _ => RejectReason::NoBid,
            };
            return Fill::rejected(action.side, reason);
        }

        let mut remaining = action.size;
        let mut filled = 0.0;
        let mut notional = 0.0;
        let mut levels_crossed = 0usize;
        for level in &levels {
            if remaining <= 0.0 {
                break;
            }
            if level.qty <= 0.0 {
                continue;
            }
            let traded = remaining.min(level.qty);
            remaining -= traded;
            filled += traded;
            notional += traded * level.price;
            levels_crossed += 1;
        }

        if filled <= 0.0 {
            return Fill::rejected(action.side, RejectReason::NoLiquidity);
        }
        if self.reject_on_insufficient_depth && remaining > 0.0 {
            return Fill::rejected(action.side, RejectReason::NoLiquidity);
        }

        let vwap = notional / filled;
        let best = levels[0].price;
        let slippage_ticks = match action.side {
            Side::Buy => (vwap - best) / self.tick_size,
            _ => (best - vwap) / self.tick_size,
        };

        Fill {
            order_id: 0,
            status: FillStatus::Filled,
            reason: None,
            side: action.side,
            liquidity: Liquidity::Taker,
            vwap_price: vwap,
            filled_qty: filled,
            unfilled_qty: remaining.max(0.0),
            partial: remaining > 0.0,
            levels_crossed,
            slippage_ticks,
        }
    }
}

/// Contra-side levels in consumption order, with a single synthetic
/// top-of-book level when the depth vectors are empty.
fn side_levels(book: &OrderbookSnapshot, side: Side) -> Vec<PriceLevel> {
    let levels = match side {
        Side::Buy => &book.asks,
        _ => &book.bids,
    };
    if !levels.is_empty() {
        return levels.clone();
    }
    match side {
        Side::Buy if book.best_ask > 0.0 && book.ask_size > 0.0 => vec![PriceLevel {
            price: book.best_ask,
            qty: book.ask_size,
        }],
        Side::Sell if book.best_bid > 0.0 && book.bid_size > 0.0 => vec![PriceLevel {
            price: book.best_bid,
            qty: book.bid_size,
        }],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder_book() -> OrderbookSnapshot {
        OrderbookSnapshot {
            ts_ms: 0,
            best_bid: 99.0,
            best_ask: 101.0,
            bid_size: 1.0,
            ask_size: 1.0,
            bids: vec![
                PriceLevel { price: 99.0, qty: 1.0 },
                PriceLevel { price: 98.0, qty: 1.0 },
                PriceLevel { price: 97.0, qty: 1.0 },
            ],
            asks: vec![
                PriceLevel { price: 101.0, qty: 1.0 },
                PriceLevel { price: 102.0, qty: 1.0 },
                PriceLevel { price: 103.0, qty: 1.0 },
            ],
        }
    }

    fn engine() -> MatchingEngine {
        MatchingEngine::new("SIM", 0.1, false).unwrap()
    }

    #[test]
    fn requires_positive_tick() {
        assert!(MatchingEngine::new("SIM", 0.0, false).is_err());
        assert!(MatchingEngine::new("SIM", -0.1, false).is_err());
    }

    #[test]
    fn walks_the_book_with_vwap_and_slippage() {
        let fill = engine().simulate(&Action::market(Side::Buy, 2.5), &ladder_book());
        assert!(fill.is_filled());
        assert_eq!(fill.filled_qty, 2.5);
        assert_eq!(fill.levels_crossed, 3);
        assert!(!fill.partial);
        let expected_vwap = (101.0 + 102.0 + 0.5 * 103.0) / 2.5;
        assert!((fill.vwap_price - expected_vwap).abs() < 1e-9);
        assert!((fill.vwap_price - 101.6).abs() < 1e-9);
        assert!((fill.slippage_ticks - 6.0).abs() < 1e-9);
    }

    #[test]
    fn sell_side_slippage_is_mirrored() {
        let fill = engine().simulate(&Action::market(Side::Sell, 2.0), &ladder_book());
        assert!(fill.is_filled());
        let expected_vwap = (99.0 + 98.0) / 2.0;
        assert!((fill.vwap_price - expected_vwap).abs() < 1e-9);
        assert!((fill.slippage_ticks - (99.0 - expected_vwap) / 0.1).abs() < 1e-9);
        assert_eq!(fill.levels_crossed, 2);
    }

    #[test]
    fn conservation_holds_for_partials() {
        let fill = engine().simulate(&Action::market(Side::Buy, 5.0), &ladder_book());
        assert!(fill.is_filled());
        assert!(fill.partial);
        assert!((fill.filled_qty - 3.0).abs() < 1e-9);
        assert!((fill.unfilled_qty - 2.0).abs() < 1e-9);
        assert!((fill.filled_qty + fill.unfilled_qty - 5.0).abs() < 1e-9);
    }

    #[test]
    fn fok_rejects_instead_of_partially_filling() {
        let fok = MatchingEngine::new("SIM", 0.1, true).unwrap();
        let fill = fok.simulate(&Action::market(Side::Buy, 5.0), &ladder_book());
        assert_eq!(fill.status, FillStatus::Rejected);
        assert_eq!(fill.reason, Some(RejectReason::NoLiquidity));
        assert_eq!(fill.filled_qty, 0.0);
    }

    #[test]
    fn empty_sides_reject_directionally() {
        let mut book = ladder_book();
        book.asks.clear();
        book.best_ask = 0.0;
        book.ask_size = 0.0;
        let fill = engine().simulate(&Action::market(Side::Buy, 1.0), &book);
        assert_eq!(fill.reason, Some(RejectReason::NoAsk));

        let mut book = ladder_book();
        book.bids.clear();
        book.best_bid = 0.0;
        book.bid_size = 0.0;
        let fill = engine().simulate(&Action::market(Side::Sell, 1.0), &book);
        assert_eq!(fill.reason, Some(RejectReason::NoBid));
    }

    #[test]
    fn bad_inputs_reject_first() {
        let fill = engine().simulate(&Action::market(Side::Hold, 1.0), &ladder_book());
        assert_eq!(fill.reason, Some(RejectReason::BadSide));
        let fill = engine().simulate(&Action::market(Side::Buy, 0.0), &ladder_book());
        assert_eq!(fill.reason, Some(RejectReason::ZeroQty));
    }

    #[test]
    fn falls_back_to_top_of_book_when_depth_missing() {
        let mut book = ladder_book();
        book.asks.clear();
        let fill = engine().simulate(&Action::market(Side::Buy, 0.5), &book);
        assert!(fill.is_filled());
        assert_eq!(fill.vwap_price, 101.0);
        assert_eq!(fill.levels_crossed, 1);
    }

    #[test]
    fn zero_qty_levels_are_skipped() {
        let mut book = ladder_book();
        book.asks[0].qty = 0.0;
        let fill = engine().simulate(&Action::market(Side::Buy, 1.0), &book);
        assert!(fill.is_filled());
        // Best for slippage purposes is still the first (empty) level's price.
        assert_eq!(fill.vwap_price, 102.0);
        assert_eq!(fill.levels_crossed, 1);
    }
}
