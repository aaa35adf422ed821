//! Maker queue simulation: queue-ahead burn, trade- and depth-driven fills,
//! adverse-selection penalty, expiry.

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use helix_core::{Fill, Liquidity, OrderId, OrderbookSnapshot, Price, Qty, Side, TradePrint, EPS};

/// Queue model parameters.
///
/// `q_init` scales the visible level quantity into our initial queue
/// position; `alpha` is the share of a visible depth decrease attributed to
/// cancellations ahead of us rather than executions.
#[derive(Clone, Copy, Debug)]
pub struct MakerParams {
    pub q_init: f64,
    pub alpha: f64,
    pub expire_ms: i64,
    pub adv_ticks: f64,
}

impl Default for MakerParams {
    fn default() -> Self {
        Self {
            q_init: 0.8,
            alpha: 0.6,
            expire_ms: 200,
            adv_ticks: 2.0,
        }
    }
}

/// A resting maker order: a thin queue-model view onto an order owned by the
/// order manager, referenced by id.
#[derive(Clone, Debug)]
pub struct RestingOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub my_qty: Qty,
    pub queue_ahead: Qty,
    pub submit_ts: i64,
    pub expire_ts: i64,
}

type LevelMap = HashMap<OrderedFloat<f64>, Qty>;

/// Simulates passive executions for resting maker orders.
pub struct MakerQueueSim {
    params: MakerParams,
    tick_size: f64,
    orders: Vec<RestingOrder>,
    last_bids: LevelMap,
    last_asks: LevelMap,
    curr_bids: LevelMap,
    curr_asks: LevelMap,
}

impl MakerQueueSim {
    #[must_use]
    pub fn new(params: MakerParams, tick_size: f64) -> Self {
        Self {
            params,
            tick_size,
            orders: Vec::new(),
            last_bids: LevelMap::new(),
            last_asks: LevelMap::new(),
            curr_bids: LevelMap::new(),
            curr_asks: LevelMap::new(),
        }
    }

    #[must_use]
    pub fn params(&self) -> MakerParams {
        self.params
    }

    /// Currently resting orders (test and metrics access).
    #[must_use]
    pub fn resting(&self) -> &[RestingOrder] {
        &self.orders
    }

    /// Rest a new maker order. The queue ahead of us is seeded from the
    /// visible quantity at our level at submit time.
    pub fn submit(
        &mut self,
        order_id: OrderId,
        side: Side,
        limit_price: Option<Price>,
        size: Qty,
        book: &OrderbookSnapshot,
        now_ts: i64,
    ) {
        let price = match limit_price {
            Some(price) if price > 0.0 => price,
            _ => match side {
                Side::Buy => book.best_bid,
                _ => book.best_ask,
            },
        };
        let order = RestingOrder {
            order_id,
            side,
            price,
            my_qty: size,
            queue_ahead: book.level_qty(side, price) * self.params.q_init,
            submit_ts: now_ts,
            expire_ts: now_ts + self.params.expire_ms,
        };
        self.orders.push(order);
    }

    /// Remove all resting orders with `order_id`. Idempotent.
    pub fn cancel(&mut self, order_id: OrderId) -> bool {
        let before = self.orders.len();
        self.orders.retain(|o| o.order_id != order_id);
        before != self.orders.len()
    }

    /// Advance the model to the latest book: consume trade prints, then
    /// visible depth decreases, then expire. Emits at most one trade-phase
    /// fill per (order, print) and one depth-phase fill per order per tick.
    pub fn on_book(
        &mut self,
        book: &OrderbookSnapshot,
        now_ts: i64,
        trades: &[TradePrint],
    ) -> Vec<Fill> {
        let mut fills = Vec::new();
        self.update_level_maps(book);

        let mut remaining = Vec::with_capacity(self.orders.len());
        let mut orders = std::mem::take(&mut self.orders);
        for order in &mut orders {
            for print in trades {
                let hits = match (order.side, print.side) {
                    (Side::Buy, Side::Sell) => {
                        print.price <= order.price + self.tick_size + EPS
                    }
                    (Side::Sell, Side::Buy) => {
                        print.price >= order.price - self.tick_size - EPS
                    }
                    _ => false,
                };
                if !hits || order.my_qty <= 0.0 {
                    continue;
                }
                let burn = order.queue_ahead.min(print.size);
                order.queue_ahead -= burn;
                let through = print.size - burn;
                let fill_qty = order.my_qty.min(through);
                order.my_qty -= fill_qty;
                if fill_qty > 0.0 {
                    fills.push(self.maker_fill(order, fill_qty, book));
                }
            }

            let prev_qty = self.last_level_qty(order.price, order.side);
            let curr_qty = self.current_level_qty(order.price, order.side);
            let delta_down = (prev_qty - curr_qty).max(0.0);
            if delta_down > 0.0 && order.my_qty > 0.0 {
                let consume_ahead = order.queue_ahead.min(delta_down * self.params.alpha);
                order.queue_ahead -= consume_ahead;
                let fill_qty = order.my_qty.min(delta_down - consume_ahead);
                order.my_qty -= fill_qty;
                if fill_qty > 0.0 {
                    fills.push(self.maker_fill(order, fill_qty, book));
                }
            }

            if order.my_qty > 0.0 && now_ts >= order.expire_ts {
                // Expired: drop silently, no fill.
                continue;
            }
            if order.my_qty > 0.0 {
                remaining.push(order.clone());
            }
        }
        self.orders = remaining;
        self.last_bids = self.curr_bids.clone();
        self.last_asks = self.curr_asks.clone();
        fills
    }

    /// Maker fill at the resting price, shifted against us by the
    /// adverse-selection penalty.
    ///
    /// Slippage is signed off the same-side best so the exec-cost identity
    /// holds for maker rows too: the penalty shows up as slippage against
    /// the quote we were resting at.
    fn maker_fill(&self, order: &RestingOrder, fill_qty: Qty, book: &OrderbookSnapshot) -> Fill {
        let penalty = self.params.adv_ticks * self.tick_size;
        let price = match order.side {
            Side::Buy => order.price + penalty,
            _ => order.price - penalty,
        };
        let best = match order.side {
            Side::Buy => book.best_bid,
            _ => book.best_ask,
        };
        let mut fill = Fill::filled(order.side, price, fill_qty, order.my_qty > 0.0, Liquidity::Maker);
        fill.order_id = order.order_id;
        fill.unfilled_qty = order.my_qty;
        if best > 0.0 && self.tick_size > 0.0 {
            fill.slippage_ticks = match order.side {
                Side::Buy => (price - best) / self.tick_size,
                _ => (best - price) / self.tick_size,
            };
        }
        fill
    }

    fn update_level_maps(&mut self, book: &OrderbookSnapshot) {
        self.curr_bids.clear();
        self.curr_asks.clear();
        for level in &book.bids {
            self.curr_bids.insert(OrderedFloat(level.price), level.qty);
        }
        for level in &book.asks {
            self.curr_asks.insert(OrderedFloat(level.price), level.qty);
        }
    }

    fn current_level_qty(&self, price: Price, side: Side) -> Qty {
        let map = match side {
            Side::Buy => &self.curr_bids,
            _ => &self.curr_asks,
        };
        map.get(&OrderedFloat(price)).copied().unwrap_or(0.0)
    }

    fn last_level_qty(&self, price: Price, side: Side) -> Qty {
        let map = match side {
            Side::Buy => &self.last_bids,
            _ => &self.last_asks,
        };
        map.get(&OrderedFloat(price))
            .copied()
            .unwrap_or_else(|| self.current_level_qty(price, side))
    }
}
