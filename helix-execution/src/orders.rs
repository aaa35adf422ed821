//! Order lifecycle management with legal-transition enforcement.

use std::collections::HashMap;

use tracing::debug;
use helix_core::{
    Action, EngineError, Fill, Order, OrderId, OrderStatus, Price, Qty, EPS, PNL_EPS,
};

/// Lifecycle counters surfaced in the run metrics.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderMetrics {
    pub placed: u64,
    pub cancelled: u64,
    pub cancel_noop: u64,
    pub replaced: u64,
    pub replace_noop: u64,
    pub rejected: u64,
    pub expired: u64,
    pub illegal_transitions: u64,
    pub open_orders_peak: u64,
    pub total_lifetime_ms: f64,
    pub lifetime_samples: u64,
}

impl OrderMetrics {
    /// Mean order lifetime across every terminal transition observed.
    #[must_use]
    pub fn avg_lifetime_ms(&self) -> f64 {
        if self.lifetime_samples == 0 {
            0.0
        } else {
            self.total_lifetime_ms / self.lifetime_samples as f64
        }
    }
}

/// Result of a cancel request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelOutcome {
    Cancelled,
    /// Unknown or already-terminal order; deliberately not an error.
    Noop,
}

/// Result of a replace request.
#[derive(Clone, Debug)]
pub enum ReplaceOutcome {
    Replaced(Order),
    Noop,
}

/// Exclusive owner of all [`Order`] records, keyed by monotonic id.
///
/// Terminal orders never transition again: cancel/replace on them is a
/// counted noop, while a fill against them is an illegal transition that
/// terminates the run.
#[derive(Default)]
pub struct OrderManager {
    orders: HashMap<OrderId, Order>,
    next_order_id: OrderId,
    metrics: OrderMetrics,
}

impl OrderManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: HashMap::new(),
            next_order_id: 1,
            metrics: OrderMetrics::default(),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &OrderMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Number of orders currently open (`New` or `Partial`).
    #[must_use]
    pub fn open_orders(&self) -> usize {
        self.orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .count()
    }

    /// Create a new order from a normalized action.
    pub fn place(&mut self, action: &Action, now_ts: i64, expire_ts: i64) -> Order {
        let order = Order {
            order_id: self.next_order_id,
            side: action.side,
            order_type: action.order_type,
            price: action.limit_price,
            qty: action.size,
            filled_qty: 0.0,
            avg_fill_price: 0.0,
            status: OrderStatus::New,
            created_ts: now_ts,
            last_update_ts: now_ts,
            expire_ts,
            post_only: action.post_only,
            reduce_only: action.reduce_only,
            replaced_by: None,
            replaced_from: action.target_order_id,
        };
        self.next_order_id += 1;
        self.orders.insert(order.order_id, order.clone());
        self.metrics.placed += 1;
        self.update_peak();
        order
    }

    /// Cancel an open order; anything else is a counted noop.
    pub fn cancel(&mut self, order_id: OrderId, now_ts: i64) -> CancelOutcome {
        match self.orders.get_mut(&order_id) {
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Cancelled;
                order.last_update_ts = now_ts;
                self.metrics.cancelled += 1;
                self.metrics.total_lifetime_ms += (now_ts - order.created_ts) as f64;
                self.metrics.lifetime_samples += 1;
                CancelOutcome::Cancelled
            }
            _ => {
                debug!(order_id, "cancel noop");
                self.metrics.cancel_noop += 1;
                CancelOutcome::Noop
            }
        }
    }

    /// Close an open order at `Replaced` and create its successor, which
    /// inherits side/type/flags and cross-links both directions.
    pub fn replace(
        &mut self,
        order_id: OrderId,
        new_price: Option<Price>,
        new_qty: Option<Qty>,
        now_ts: i64,
        expire_ts: i64,
    ) -> ReplaceOutcome {
        let replacement = match self.orders.get_mut(&order_id) {
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Replaced;
                order.last_update_ts = now_ts;
                self.metrics.replaced += 1;
                self.metrics.total_lifetime_ms += (now_ts - order.created_ts) as f64;
                self.metrics.lifetime_samples += 1;
                Action {
                    order_type: order.order_type,
                    side: order.side,
                    size: new_qty.unwrap_or(order.qty - order.filled_qty),
                    limit_price: new_price.or(order.price),
                    post_only: order.post_only,
                    reduce_only: order.reduce_only,
                    target_order_id: Some(order.order_id),
                    ..Action::default()
                }
            }
            _ => {
                debug!(order_id, "replace noop");
                self.metrics.replace_noop += 1;
                return ReplaceOutcome::Noop;
            }
        };
        let new_order = self.place(&replacement, now_ts, expire_ts);
        if let Some(order) = self.orders.get_mut(&order_id) {
            order.replaced_by = Some(new_order.order_id);
        }
        ReplaceOutcome::Replaced(new_order)
    }

    /// Apply an execution to an open order.
    ///
    /// Fatal when the order is unknown, terminal, side-mismatched, or would
    /// be overfilled; those indicate a simulator bug, not strategy error.
    pub fn apply_fill(&mut self, fill: &Fill, now_ts: i64) -> Result<(), EngineError> {
        let order = match self.orders.get_mut(&fill.order_id) {
            Some(order) => order,
            None => {
                self.metrics.illegal_transitions += 1;
                return Err(EngineError::IllegalTransition(format!(
                    "fill for unknown order_id={}",
                    fill.order_id
                )));
            }
        };
        if order.status.is_terminal() {
            self.metrics.illegal_transitions += 1;
            return Err(EngineError::IllegalTransition(format!(
                "fill on terminal order_id={} status={:?}",
                order.order_id, order.status
            )));
        }
        if fill.side != order.side {
            self.metrics.illegal_transitions += 1;
            return Err(EngineError::IllegalTransition(format!(
                "fill side mismatch for order_id={}",
                order.order_id
            )));
        }
        let prev_filled = order.filled_qty;
        let new_filled = prev_filled + fill.filled_qty;
        if new_filled > order.qty + PNL_EPS {
            self.metrics.illegal_transitions += 1;
            return Err(EngineError::IllegalTransition(format!(
                "overfill detected for order_id={}: filled {} of {}",
                order.order_id, new_filled, order.qty
            )));
        }
        order.filled_qty = new_filled;
        if new_filled > 0.0 {
            let total_notional =
                order.avg_fill_price * prev_filled + fill.vwap_price * fill.filled_qty;
            order.avg_fill_price = total_notional / new_filled;
        }
        order.last_update_ts = now_ts;
        if new_filled + EPS >= order.qty {
            order.status = OrderStatus::Filled;
            self.metrics.total_lifetime_ms += (now_ts - order.created_ts) as f64;
            self.metrics.lifetime_samples += 1;
        } else {
            order.status = OrderStatus::Partial;
        }
        Ok(())
    }

    /// Transition an open order to `Rejected` (post-normalization refusal).
    pub fn mark_rejected(&mut self, order_id: OrderId, now_ts: i64) {
        if let Some(order) = self.orders.get_mut(&order_id) {
            if !order.status.is_terminal() {
                order.status = OrderStatus::Rejected;
                order.last_update_ts = now_ts;
                self.metrics.rejected += 1;
                self.metrics.total_lifetime_ms += (now_ts - order.created_ts) as f64;
                self.metrics.lifetime_samples += 1;
            }
        }
    }

    /// Sweep open orders whose deadline passed; returns the expired ids so
    /// the caller can evict their resting views.
    ///
    /// Transitions apply in id order so the lifetime accumulators are
    /// reproducible across runs.
    pub fn expire_orders(&mut self, now_ts: i64) -> Vec<OrderId> {
        let mut due: Vec<OrderId> = self
            .orders
            .values()
            .filter(|order| {
                !order.status.is_terminal() && order.expire_ts > 0 && now_ts >= order.expire_ts
            })
            .map(|order| order.order_id)
            .collect();
        due.sort_unstable();
        for order_id in &due {
            if let Some(order) = self.orders.get_mut(order_id) {
                order.status = OrderStatus::Expired;
                order.last_update_ts = now_ts;
                self.metrics.expired += 1;
                self.metrics.total_lifetime_ms += (now_ts - order.created_ts) as f64;
                self.metrics.lifetime_samples += 1;
            }
        }
        due
    }

    fn update_peak(&mut self) {
        let open = self.open_orders() as u64;
        if open > self.metrics.open_orders_peak {
            self.metrics.open_orders_peak = open;
        }
    }
}
