//! Core market-data and execution types for the replay engine.

use serde::{Deserialize, Serialize};

use crate::{OrderId, Price, Qty, EPS};

/// The side of an order, trade print, or book delta.
///
/// `Hold` is the "no action" marker produced by strategies that decline to
/// trade; it is never a legal order side and rejects with `BadSide` if it
/// reaches the matching engine.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Hash, Serialize)]
pub enum Side {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl Side {
    /// Returns the opposite side (buy <-> sell); `Hold` maps to itself.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
            Self::Hold => Self::Hold,
        }
    }

    /// Signed direction used by position arithmetic (+1 buy, -1 sell).
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
            Self::Hold => 0.0,
        }
    }

    /// True for `Buy` and `Sell`, false for `Hold`.
    #[must_use]
    pub fn is_directional(self) -> bool {
        !matches!(self, Self::Hold)
    }

    /// Ledger representation (`BUY`/`SELL`/`HOLD`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

/// Liquidity role of a fill: resting (maker) or aggressing (taker).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Liquidity {
    Maker,
    Taker,
}

impl Liquidity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Maker => "MAKER",
            Self::Taker => "TAKER",
        }
    }
}

/// Order execution style.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

/// What an [`Action`] asks the engine to do.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ActionKind {
    #[default]
    Place,
    Cancel,
    Replace,
}

/// Which issuer produced an action; attributed on every ledger row.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ActionSource {
    Strategy,
    DemoTaker,
    DemoMaker,
}

impl ActionSource {
    /// Ledger representation (`STRAT`/`DEMO`/`MAKER`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strategy => "STRAT",
            Self::DemoTaker => "DEMO",
            Self::DemoMaker => "MAKER",
        }
    }
}

/// A single intent emitted by a strategy or demo issuer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub order_type: OrderType,
    pub side: Side,
    pub size: Qty,
    /// Explicit limit price; `None` lets the rules engine snap maker orders
    /// to the same-side best.
    pub limit_price: Option<Price>,
    pub is_maker: bool,
    pub post_only: bool,
    pub reduce_only: bool,
    /// Quote notional the issuer was targeting, when sized off a budget.
    pub notional: Option<f64>,
    /// Target of a cancel/replace, and provenance link for replacements.
    pub target_order_id: Option<OrderId>,
    pub replace_price: Option<Price>,
    pub replace_qty: Option<Qty>,
}

impl Action {
    /// Market taker order.
    #[must_use]
    pub fn market(side: Side, size: Qty) -> Self {
        Self {
            side,
            size,
            ..Self::default()
        }
    }

    /// Limit order at an explicit price.
    #[must_use]
    pub fn limit(side: Side, size: Qty, price: Price) -> Self {
        Self {
            order_type: OrderType::Limit,
            side,
            size,
            limit_price: Some(price),
            ..Self::default()
        }
    }

    /// Maker-flagged limit order; with `price == None` the rules engine snaps
    /// it to the same-side best.
    #[must_use]
    pub fn maker(side: Side, size: Qty, price: Option<Price>) -> Self {
        Self {
            order_type: OrderType::Limit,
            side,
            size,
            limit_price: price,
            is_maker: true,
            ..Self::default()
        }
    }

    /// Cancel request for an existing order.
    #[must_use]
    pub fn cancel(target: OrderId) -> Self {
        Self {
            kind: ActionKind::Cancel,
            target_order_id: Some(target),
            ..Self::default()
        }
    }

    /// Replace request for an existing order.
    #[must_use]
    pub fn replace(target: OrderId, price: Option<Price>, qty: Option<Qty>) -> Self {
        Self {
            kind: ActionKind::Replace,
            target_order_id: Some(target),
            replace_price: price,
            replace_qty: qty,
            ..Self::default()
        }
    }

    /// Whether a limit price sits at or through the opposite top of book.
    ///
    /// A crossing limit is economically a taker order and must be routed to
    /// the matching engine regardless of its maker flag.
    #[must_use]
    pub fn crosses_opposite_top(&self, book: &OrderbookSnapshot) -> bool {
        let Some(limit) = self.limit_price else {
            return false;
        };
        match self.side {
            Side::Buy => book.best_ask > 0.0 && limit >= book.best_ask,
            Side::Sell => book.best_bid > 0.0 && limit <= book.best_bid,
            Side::Hold => false,
        }
    }

    /// Taker classification: market-typed, or a limit that crosses.
    #[must_use]
    pub fn is_taker(&self, book: &OrderbookSnapshot) -> bool {
        self.order_type == OrderType::Market || self.crosses_opposite_top(book)
    }
}

/// Local reasons an action can be refused without terminating the run.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Hash, Serialize)]
pub enum RejectReason {
    BadSide,
    ZeroQty,
    NoBid,
    NoAsk,
    NoLiquidity,
    MinQty,
    MinNotional,
    PriceInvalid,
    RiskLimit,
}

impl RejectReason {
    /// Stable key used for ledger rows and `reject_counts`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadSide => "bad_side",
            Self::ZeroQty => "zero_qty",
            Self::NoBid => "no_bid",
            Self::NoAsk => "no_ask",
            Self::NoLiquidity => "no_liquidity",
            Self::MinQty => "min_qty",
            Self::MinNotional => "min_notional",
            Self::PriceInvalid => "price_invalid",
            Self::RiskLimit => "risk_limit",
        }
    }
}

/// Outcome of a simulated execution attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FillStatus {
    Filled,
    Rejected,
}

/// Execution report produced by the matching engine or maker simulator.
#[derive(Clone, Debug, PartialEq)]
pub struct Fill {
    pub order_id: OrderId,
    pub status: FillStatus,
    pub reason: Option<RejectReason>,
    pub side: Side,
    pub liquidity: Liquidity,
    pub vwap_price: Price,
    pub filled_qty: Qty,
    pub unfilled_qty: Qty,
    pub partial: bool,
    pub levels_crossed: usize,
    pub slippage_ticks: f64,
}

impl Fill {
    /// A successful execution at a single price.
    #[must_use]
    pub fn filled(side: Side, price: Price, qty: Qty, partial: bool, liquidity: Liquidity) -> Self {
        Self {
            order_id: 0,
            status: FillStatus::Filled,
            reason: None,
            side,
            liquidity,
            vwap_price: price,
            filled_qty: qty,
            unfilled_qty: 0.0,
            partial,
            levels_crossed: 1,
            slippage_ticks: 0.0,
        }
    }

    /// A refused execution carrying its reject reason.
    #[must_use]
    pub fn rejected(side: Side, reason: RejectReason) -> Self {
        Self {
            order_id: 0,
            status: FillStatus::Rejected,
            reason: Some(reason),
            side,
            liquidity: Liquidity::Taker,
            vwap_price: 0.0,
            filled_qty: 0.0,
            unfilled_qty: 0.0,
            partial: false,
            levels_crossed: 0,
            slippage_ticks: 0.0,
        }
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == FillStatus::Filled
    }
}

/// Lifecycle states of an order. All but `New` and `Partial` are terminal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum OrderStatus {
    New,
    Partial,
    Filled,
    Cancelled,
    Expired,
    Replaced,
    Rejected,
}

impl OrderStatus {
    /// Terminal orders never transition again and never accept fills.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::New | Self::Partial)
    }
}

/// An order owned by the order manager, keyed by its monotonic id.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub order_id: OrderId,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Price>,
    pub qty: Qty,
    pub filled_qty: Qty,
    pub avg_fill_price: Price,
    pub status: OrderStatus,
    pub created_ts: i64,
    pub last_update_ts: i64,
    /// Zero means no expiry.
    pub expire_ts: i64,
    pub post_only: bool,
    pub reduce_only: bool,
    pub replaced_by: Option<OrderId>,
    pub replaced_from: Option<OrderId>,
}

/// One price level of the book.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub qty: Qty,
}

/// Snapshot of the reconstructed book after a delta has been applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderbookSnapshot {
    pub ts_ms: i64,
    pub best_bid: Price,
    pub best_ask: Price,
    pub bid_size: Qty,
    pub ask_size: Qty,
    /// Bid levels in descending price order.
    pub bids: Vec<PriceLevel>,
    /// Ask levels in ascending price order.
    pub asks: Vec<PriceLevel>,
}

impl OrderbookSnapshot {
    /// Arithmetic mid of the top of book.
    #[must_use]
    pub fn mid(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }

    /// Quoted spread.
    #[must_use]
    pub fn spread(&self) -> f64 {
        self.best_ask - self.best_bid
    }

    /// Whether the snapshot satisfies the post-snapshot book invariants.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.best_bid > 0.0
            && self.best_ask > 0.0
            && self.best_bid < self.best_ask
            && self.bid_size > 0.0
            && self.ask_size > 0.0
            && self.mid().is_finite()
    }

    /// Visible quantity resting at `price` on `side`, with a top-of-book
    /// fallback when the depth vectors are empty.
    #[must_use]
    pub fn level_qty(&self, side: Side, price: Price) -> Qty {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
            Side::Hold => return 0.0,
        };
        for level in levels {
            if (level.price - price).abs() < EPS {
                return level.qty;
            }
        }
        if side == Side::Buy && (price - self.best_bid).abs() < EPS {
            return self.bid_size;
        }
        if side == Side::Sell && (price - self.best_ask).abs() < EPS {
            return self.ask_size;
        }
        0.0
    }
}

/// Incremental change to one price level of the book.
#[derive(Clone, Debug, PartialEq)]
pub struct BookDelta {
    pub seq: i64,
    pub prev_seq: i64,
    pub is_snapshot: bool,
    pub ts_ms: i64,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
}

/// A public trade print from the aggressor's perspective.
#[derive(Clone, Debug, PartialEq)]
pub struct TradePrint {
    pub ts_ms: i64,
    pub side: Side,
    pub price: Price,
    pub size: Qty,
    pub trade_id: String,
}

/// Rolling view of the last trade, consumed by the feature computation.
#[derive(Clone, Copy, Debug)]
pub struct TradeTape {
    pub last_price: Price,
    pub last_size: Qty,
}

impl Default for TradeTape {
    fn default() -> Self {
        Self {
            last_price: 100.0,
            last_size: 1.0,
        }
    }
}

/// Signed position with running average entry price and realized PnL.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub qty: Qty,
    pub avg_price: Price,
    pub realized_pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn side_sign_and_inverse() {
        assert_eq!(Side::Buy.sign(), 1.0);
        assert_eq!(Side::Sell.sign(), -1.0);
        assert_eq!(Side::Hold.sign(), 0.0);
        assert_eq!(Side::Buy.inverse(), Side::Sell);
        assert!(!Side::Hold.is_directional());
    }

    #[test]
    fn crossing_limit_is_taker() {
        let snapshot = book(99.0, 101.0);
        let crossing = Action::maker(Side::Buy, 1.0, Some(102.0));
        assert!(crossing.crosses_opposite_top(&snapshot));
        assert!(crossing.is_taker(&snapshot));

        let passive = Action::maker(Side::Buy, 1.0, Some(99.0));
        assert!(!passive.crosses_opposite_top(&snapshot));
        assert!(!passive.is_taker(&snapshot));

        let at_touch = Action::limit(Side::Sell, 1.0, 99.0);
        assert!(at_touch.crosses_opposite_top(&snapshot));
    }

    #[test]
    fn market_action_is_always_taker() {
        let snapshot = book(99.0, 101.0);
        assert!(Action::market(Side::Sell, 1.0).is_taker(&snapshot));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Partial.is_terminal());
        for status in [
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Expired,
            OrderStatus::Replaced,
            OrderStatus::Rejected,
        ] {
            assert!(status.is_terminal());
        }
    }

    #[test]
    fn snapshot_validity() {
        assert!(book(99.0, 101.0).is_valid());
        assert!(!book(101.0, 99.0).is_valid());
        assert!(!book(0.0, 101.0).is_valid());
        let mut empty_side = book(99.0, 101.0);
        empty_side.ask_size = 0.0;
        assert!(!empty_side.is_valid());
    }

    #[test]
    fn level_qty_falls_back_to_top() {
        let mut snapshot = book(99.0, 101.0);
        snapshot.bids.clear();
        snapshot.bid_size = 7.0;
        assert_eq!(snapshot.level_qty(Side::Buy, 99.0), 7.0);
        assert_eq!(snapshot.level_qty(Side::Buy, 98.0), 0.0);
        assert_eq!(snapshot.level_qty(Side::Sell, 101.0), 1.0);
    }
}
