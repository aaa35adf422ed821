//! Exchange-rule normalization: quantization, minimums, reference pricing.

use helix_config::RulesConfig;
use helix_core::{Action, OrderbookSnapshot, Price, RejectReason, Side, EPS};

/// Quantize down to a step, snapping the product back onto a 1e-9 decimal
/// grid so quantized values compare cleanly against literals.
fn floor_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    let steps = (value / step + EPS).floor();
    round_decimal(steps * step)
}

fn ceil_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    let steps = (value / step - EPS).ceil();
    round_decimal(steps * step)
}

fn round_decimal(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

/// Applies venue rules to raw actions before they reach risk and matching.
pub struct RulesEngine {
    cfg: RulesConfig,
}

impl RulesEngine {
    #[must_use]
    pub fn new(cfg: RulesConfig) -> Self {
        Self { cfg }
    }

    #[must_use]
    pub fn config(&self) -> &RulesConfig {
        &self.cfg
    }

    /// Normalize `action` against the current book.
    ///
    /// Quantization is always *away* from the opposite top: buy limits floor
    /// and sell limits ceil, so rounding can never turn a passive order into
    /// a crossing one. Quantities floor to the step.
    pub fn apply(
        &self,
        action: &Action,
        book: &OrderbookSnapshot,
    ) -> Result<Action, RejectReason> {
        if !action.side.is_directional() {
            return Err(RejectReason::BadSide);
        }
        if action.size <= 0.0 {
            return Err(RejectReason::ZeroQty);
        }

        let mut normalized = action.clone();
        normalized.size = floor_to_step(action.size, self.cfg.qty_step);
        if normalized.size < self.cfg.min_qty - EPS {
            return Err(RejectReason::MinQty);
        }

        normalized.limit_price = match action.limit_price {
            Some(price) if price > 0.0 => Some(match action.side {
                Side::Buy => floor_to_step(price, self.cfg.tick_size),
                _ => ceil_to_step(price, self.cfg.tick_size),
            }),
            _ if action.is_maker => match action.side {
                Side::Buy if book.best_bid > 0.0 => Some(book.best_bid),
                Side::Sell if book.best_ask > 0.0 => Some(book.best_ask),
                _ => None,
            },
            _ => None,
        };

        let Some(ref_price) = self.reference_price(&normalized, book) else {
            return Err(RejectReason::PriceInvalid);
        };
        if self.cfg.min_notional > 0.0
            && normalized.size * ref_price < self.cfg.min_notional - EPS
        {
            return Err(RejectReason::MinNotional);
        }
        Ok(normalized)
    }

    /// Positive price an action would reasonably trade around: its limit,
    /// else the opposite best with a same-side fallback.
    fn reference_price(&self, action: &Action, book: &OrderbookSnapshot) -> Option<Price> {
        if let Some(price) = action.limit_price {
            if price > 0.0 {
                return Some(price);
            }
        }
        let candidate = match action.side {
            Side::Buy => {
                if book.best_ask > 0.0 {
                    book.best_ask
                } else {
                    book.best_bid
                }
            }
            Side::Sell => {
                if book.best_bid > 0.0 {
                    book.best_bid
                } else {
                    book.best_ask
                }
            }
            Side::Hold => 0.0,
        };
        (candidate > 0.0).then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::PriceLevel;

    fn cfg() -> RulesConfig {
        RulesConfig {
            tick_size: 0.1,
            qty_step: 0.01,
            min_qty: 0.001,
            min_notional: 0.0,
            price_band_bps: 0.0,
            source: "default".into(),
        }
    }

    fn book(bid: f64, ask: f64) -> OrderbookSnapshot {
        OrderbookSnapshot {
            ts_ms: 0,
            best_bid: bid,
            best_ask: ask,
            bid_size: 1.0,
            ask_size: 1.0,
            bids: vec![PriceLevel { price: bid, qty: 1.0 }],
            asks: vec![PriceLevel { price: ask, qty: 1.0 }],
        }
    }

    #[test]
    fn buy_limits_floor_away_from_the_ask() {
        let rules = RulesEngine::new(cfg());
        let action = Action::limit(Side::Buy, 1.019, 100.19);
        let normalized = rules.apply(&action, &book(100.0, 100.2)).unwrap();
        assert_eq!(normalized.limit_price, Some(100.1));
        assert_eq!(normalized.size, 1.01);
    }

    #[test]
    fn sell_limits_ceil_away_from_the_bid() {
        let rules = RulesEngine::new(cfg());
        let action = Action::limit(Side::Sell, 2.237, 100.01);
        let normalized = rules.apply(&action, &book(100.0, 100.2)).unwrap();
        assert_eq!(normalized.limit_price, Some(100.1));
        assert_eq!(normalized.size, 2.23);
    }

    #[test]
    fn exact_multiples_are_untouched() {
        let rules = RulesEngine::new(cfg());
        let action = Action::limit(Side::Buy, 0.30, 99.9);
        let normalized = rules.apply(&action, &book(100.0, 100.2)).unwrap();
        assert_eq!(normalized.limit_price, Some(99.9));
        assert_eq!(normalized.size, 0.3);
    }

    #[test]
    fn maker_without_price_snaps_to_same_side_best() {
        let rules = RulesEngine::new(cfg());
        let buy = rules
            .apply(&Action::maker(Side::Buy, 1.0, None), &book(100.0, 100.2))
            .unwrap();
        assert_eq!(buy.limit_price, Some(100.0));
        let sell = rules
            .apply(&Action::maker(Side::Sell, 1.0, None), &book(100.0, 100.2))
            .unwrap();
        assert_eq!(sell.limit_price, Some(100.2));
    }

    #[test]
    fn rejects_in_declared_order() {
        let rules = RulesEngine::new(cfg());
        let snapshot = book(100.0, 100.2);
        assert_eq!(
            rules.apply(&Action::market(Side::Hold, 1.0), &snapshot),
            Err(RejectReason::BadSide)
        );
        assert_eq!(
            rules.apply(&Action::market(Side::Buy, 0.0), &snapshot),
            Err(RejectReason::ZeroQty)
        );
        assert_eq!(
            rules.apply(&Action::market(Side::Buy, 0.005), &snapshot),
            Err(RejectReason::MinQty)
        );
    }

    #[test]
    fn min_qty_applies_post_quantization() {
        let mut config = cfg();
        config.min_qty = 0.01;
        let rules = RulesEngine::new(config);
        // 0.012 floors to 0.01 which passes; 0.009 floors to 0.00 which fails.
        assert!(rules
            .apply(&Action::market(Side::Buy, 0.012), &book(100.0, 100.2))
            .is_ok());
        assert_eq!(
            rules.apply(&Action::market(Side::Buy, 0.009), &book(100.0, 100.2)),
            Err(RejectReason::MinQty)
        );
    }

    #[test]
    fn min_notional_uses_reference_price() {
        let mut config = cfg();
        config.min_notional = 50.0;
        let rules = RulesEngine::new(config);
        // Market buy references the ask: 0.4 * 100.2 = 40.08 < 50.
        assert_eq!(
            rules.apply(&Action::market(Side::Buy, 0.4), &book(100.0, 100.2)),
            Err(RejectReason::MinNotional)
        );
        assert!(rules
            .apply(&Action::market(Side::Buy, 0.6), &book(100.0, 100.2))
            .is_ok());
    }

    #[test]
    fn empty_book_without_limit_is_price_invalid() {
        let rules = RulesEngine::new(cfg());
        let empty = OrderbookSnapshot::default();
        assert_eq!(
            rules.apply(&Action::market(Side::Buy, 1.0), &empty),
            Err(RejectReason::PriceInvalid)
        );
    }

    #[test]
    fn opposite_side_falls_back_to_same_side() {
        let rules = RulesEngine::new(cfg());
        let mut one_sided = book(100.0, 0.0);
        one_sided.asks.clear();
        one_sided.ask_size = 0.0;
        // Buy with no ask references the bid instead of rejecting.
        assert!(rules
            .apply(&Action::market(Side::Buy, 1.0), &one_sided)
            .is_ok());
    }
}
