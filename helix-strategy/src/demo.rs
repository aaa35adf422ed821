//! Deterministic demo issuers used to exercise the execution path.

use helix_core::{Action, ActionSource, OrderbookSnapshot, Side, TradeTape};
use tracing::debug;

use crate::Strategy;

/// Shared pacing state: issue on the first opportunity, then once per
/// interval of book time, up to a cap, alternating Buy/Sell.
struct Pacer {
    interval_ms: i64,
    max_orders: u64,
    issued: u64,
    last_issue_ts: Option<i64>,
    next_side: Side,
}

impl Pacer {
    fn new(interval_ms: i64, max_orders: u64) -> Self {
        Self {
            interval_ms,
            max_orders,
            issued: 0,
            last_issue_ts: None,
            next_side: Side::Buy,
        }
    }

    /// Side the next order would take, if one is due at `now_ts`.
    fn due(&self, now_ts: i64) -> Option<Side> {
        if self.issued >= self.max_orders {
            return None;
        }
        if let Some(last) = self.last_issue_ts {
            if now_ts - last < self.interval_ms {
                return None;
            }
        }
        Some(self.next_side)
    }

    /// Consume one unit of budget once an order actually went out.
    fn commit(&mut self, now_ts: i64) {
        self.issued += 1;
        self.last_issue_ts = Some(now_ts);
        self.next_side = self.next_side.inverse();
    }
}

/// Issues market orders sized off a quote notional budget.
pub struct DemoTaker {
    notional: f64,
    pacer: Pacer,
}

impl DemoTaker {
    #[must_use]
    pub fn new(notional: f64, interval_ms: i64, max_orders: u64) -> Self {
        Self {
            notional,
            pacer: Pacer::new(interval_ms, max_orders),
        }
    }
}

impl Strategy for DemoTaker {
    fn source(&self) -> ActionSource {
        ActionSource::DemoTaker
    }

    fn on_book(
        &mut self,
        book: &OrderbookSnapshot,
        _tape: &TradeTape,
        now_ts: i64,
    ) -> Option<Action> {
        let side = self.pacer.due(now_ts)?;
        // Size off the decision-time opposite top.
        let reference = match side {
            Side::Buy => book.best_ask,
            _ => book.best_bid,
        };
        if reference <= 0.0 {
            debug!(now_ts, "demo taker skipped: no reference price");
            return None;
        }
        self.pacer.commit(now_ts);
        let mut action = Action::market(side, self.notional / reference);
        action.notional = Some(self.notional);
        Some(action)
    }
}

/// Issues passive maker orders resting at the same-side best.
pub struct DemoMaker {
    notional: f64,
    pacer: Pacer,
}

impl DemoMaker {
    #[must_use]
    pub fn new(notional: f64, interval_ms: i64, max_orders: u64) -> Self {
        Self {
            notional,
            pacer: Pacer::new(interval_ms, max_orders),
        }
    }
}

impl Strategy for DemoMaker {
    fn source(&self) -> ActionSource {
        ActionSource::DemoMaker
    }

    fn on_book(
        &mut self,
        book: &OrderbookSnapshot,
        _tape: &TradeTape,
        now_ts: i64,
    ) -> Option<Action> {
        let side = self.pacer.due(now_ts)?;
        let reference = match side {
            Side::Buy => book.best_bid,
            _ => book.best_ask,
        };
        if reference <= 0.0 {
            debug!(now_ts, "demo maker skipped: no reference price");
            return None;
        }
        self.pacer.commit(now_ts);
        let mut action = Action::maker(side, self.notional / reference, None);
        action.post_only = true;
        action.notional = Some(self.notional);
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::{OrderType, PriceLevel};

    fn book() -> OrderbookSnapshot {
        OrderbookSnapshot {
            ts_ms: 0,
            best_bid: 100.0,
            best_ask: 100.5,
            bid_size: 5.0,
            ask_size: 5.0,
            bids: vec![PriceLevel { price: 100.0, qty: 5.0 }],
            asks: vec![PriceLevel { price: 100.5, qty: 5.0 }],
        }
    }

    #[test]
    fn taker_paces_alternates_and_sizes_off_opposite_top() {
        let mut demo = DemoTaker::new(1005.0, 100, 3);
        let tape = TradeTape::default();
        let first = demo.on_book(&book(), &tape, 1000).expect("first order");
        assert_eq!(first.side, Side::Buy);
        assert_eq!(first.order_type, OrderType::Market);
        assert!((first.size - 10.0).abs() < 1e-9); // 1005 / 100.5
        assert_eq!(first.notional, Some(1005.0));

        // Too soon.
        assert!(demo.on_book(&book(), &tape, 1050).is_none());
        let second = demo.on_book(&book(), &tape, 1100).expect("second order");
        assert_eq!(second.side, Side::Sell);
        assert!((second.size - 10.05).abs() < 1e-9); // 1005 / 100

        let third = demo.on_book(&book(), &tape, 1200).expect("third order");
        assert_eq!(third.side, Side::Buy);
        // Cap reached.
        assert!(demo.on_book(&book(), &tape, 5000).is_none());
    }

    #[test]
    fn maker_rests_post_only_without_explicit_price() {
        let mut demo = DemoMaker::new(500.0, 100, 2);
        let tape = TradeTape::default();
        let first = demo.on_book(&book(), &tape, 0).expect("maker order");
        assert!(first.is_maker);
        assert!(first.post_only);
        assert_eq!(first.limit_price, None);
        assert_eq!(first.side, Side::Buy);
        assert!((first.size - 5.0).abs() < 1e-9); // 500 / 100
    }

    #[test]
    fn empty_book_defers_issuance_without_consuming_budget() {
        let mut demo = DemoTaker::new(100.0, 100, 1);
        let tape = TradeTape::default();
        let empty = OrderbookSnapshot::default();
        assert!(demo.on_book(&empty, &tape, 0).is_none());
        // No budget was consumed: the single allowed order goes out on the
        // first usable book.
        let action = demo.on_book(&book(), &tape, 50).expect("deferred order");
        assert_eq!(action.side, Side::Buy);
        assert!(demo.on_book(&book(), &tape, 500).is_none());
    }
}
