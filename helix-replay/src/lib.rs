//! The deterministic tick-driven replay loop.
//!
//! One replay = one symbol = one thread of logical time. Each applied delta
//! advances the clock and drives, in fixed order: trade draining, the expiry
//! sweep, maker-queue fills, pending (post-latency) taker fills, and finally
//! new strategy actions through rules, risk, and the order manager.

pub mod drainer;
pub mod metrics;

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, info};

use helix_config::{FeeConfig, RulesConfig};
use helix_core::{
    deterministic_latency_ms, Action, ActionKind, ActionSource, BookDelta, BookReconstructor,
    EngineError, Fill, LatencyConfig, Liquidity, OrderId, OrderbookSnapshot, RejectReason, Side,
    TradePrint, TradeTape,
};
use helix_data::{BookcheckWriter, FillRow, LatencySample};
use helix_execution::{
    FeeModel, MakerParams, MakerQueueSim, MatchingEngine, OrderManager, PendingAction,
    PendingQueue, ReplaceOutcome, RiskEngine, RulesEngine,
};
use helix_strategy::Strategy;

pub use drainer::TradeDrainer;
pub use metrics::{FillContext, MetricsReport, RunAggregator};

/// Everything a run needs beyond its input streams and strategies.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub symbol: String,
    pub venue: String,
    pub run_id: String,
    pub rules: RulesConfig,
    pub fees: FeeConfig,
    pub latency: LatencyConfig,
    pub maker: MakerParams,
    pub max_position: f64,
    pub max_notional: f64,
    pub adv_horizon_ms: i64,
    pub adv_fatal_missing: bool,
    /// Fill-or-kill mode for the taker matcher.
    pub reject_on_insufficient_depth: bool,
    pub bookcheck_every: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "SIM".to_string(),
            venue: "SIM".to_string(),
            run_id: "run".to_string(),
            rules: RulesConfig::default(),
            fees: FeeConfig::default(),
            latency: LatencyConfig::default(),
            maker: MakerParams::default(),
            max_position: 5.0,
            max_notional: 250_000.0,
            adv_horizon_ms: 1000,
            adv_fatal_missing: false,
            reject_on_insufficient_depth: false,
            bookcheck_every: 0,
        }
    }
}

/// Output of a completed run; file placement is the caller's concern.
pub struct RunResult {
    pub rows: Vec<FillRow>,
    pub metrics: MetricsReport,
    pub latency_samples: Vec<LatencySample>,
}

/// Per-order context the ledger needs but the order manager does not own.
#[derive(Clone, Copy)]
struct OrderMeta {
    src: ActionSource,
    target_notional: f64,
    crossing: bool,
}

/// The engine value owning all run state; constructed per run.
pub struct ReplayEngine {
    cfg: EngineConfig,
    book: BookReconstructor,
    drainer: TradeDrainer,
    matching: MatchingEngine,
    maker_sim: MakerQueueSim,
    orders: OrderManager,
    pending: PendingQueue,
    rules: RulesEngine,
    fee_model: FeeModel,
    risk: RiskEngine,
    agg: RunAggregator,
    strategies: Vec<Box<dyn Strategy>>,
    tape: TradeTape,
    meta: HashMap<OrderId, OrderMeta>,
    action_idx: u64,
}

impl ReplayEngine {
    pub fn new(
        cfg: EngineConfig,
        trades: Vec<TradePrint>,
        strategies: Vec<Box<dyn Strategy>>,
    ) -> Result<Self, EngineError> {
        let matching = MatchingEngine::new(
            cfg.symbol.clone(),
            cfg.rules.tick_size,
            cfg.reject_on_insufficient_depth,
        )?;
        let maker_sim = MakerQueueSim::new(cfg.maker, cfg.rules.tick_size);
        let book = BookReconstructor::new().with_bookcheck_every(cfg.bookcheck_every);
        let agg = RunAggregator::new(cfg.rules.tick_size, cfg.adv_horizon_ms);
        let rules = RulesEngine::new(cfg.rules.clone());
        let fee_model = FeeModel::new(cfg.fees.clone());
        let risk = RiskEngine::new(cfg.max_position, cfg.max_notional);
        Ok(Self {
            cfg,
            book,
            drainer: TradeDrainer::new(trades),
            matching,
            maker_sim,
            orders: OrderManager::new(),
            pending: PendingQueue::new(),
            rules,
            fee_model,
            risk,
            agg,
            strategies,
            tape: TradeTape::default(),
            meta: HashMap::new(),
            action_idx: 0,
        })
    }

    /// Replay the delta stream to completion.
    pub fn run(
        mut self,
        deltas: &[BookDelta],
        mut bookcheck: Option<&mut BookcheckWriter>,
    ) -> Result<RunResult> {
        info!(
            symbol = %self.cfg.symbol,
            run_id = %self.cfg.run_id,
            deltas = deltas.len(),
            strategies = self.strategies.len(),
            "starting replay"
        );

        for delta in deltas {
            if let Some(row) = self.book.apply(delta)? {
                if let Some(writer) = bookcheck.as_deref_mut() {
                    writer.write(&row)?;
                }
            }
            let snap = self.book.snapshot().clone();
            let now = snap.ts_ms;
            let seq = self.book.last_seq();
            let mid = snap.mid();

            // Carry PnL between fills accrues to the marked ledger; pending
            // adverse-selection horizons resolve against the fresh mid.
            self.agg.mark_equity(self.risk.marked_equity(mid));
            self.agg.resolve_adverse(now, mid);

            let trades: Vec<TradePrint> = self.drainer.drain_up_to(now).to_vec();
            for print in &trades {
                self.agg.record_trade_skew((now - print.ts_ms) as f64);
                self.tape = TradeTape {
                    last_price: print.price,
                    last_size: print.size,
                };
            }

            for order_id in self.orders.expire_orders(now) {
                self.maker_sim.cancel(order_id);
            }

            let maker_fills = self.maker_sim.on_book(&snap, now, &trades);
            for fill in &maker_fills {
                self.settle_fill(fill, now, seq, &snap)?;
            }

            for pending in self.pending.pop_due(now) {
                self.dispatch_pending(pending, now, seq, &snap)?;
            }

            for i in 0..self.strategies.len() {
                let Some(action) = self.strategies[i].on_book(&snap, &self.tape, now) else {
                    continue;
                };
                let src = self.strategies[i].source();
                self.process_action(action, src, now, seq, &snap)?;
            }
        }

        if !self.pending.is_empty() {
            // Filling these on the final book would violate latency
            // causality; they simply never reached the venue in time.
            info!(
                discarded = self.pending.len(),
                "delta stream exhausted with actions still in flight"
            );
        }

        let snap = self.book.snapshot().clone();
        let final_mid = if snap.is_valid() {
            snap.mid()
        } else {
            self.risk.position().avg_price
        };
        let realized = self.risk.position().realized_pnl;
        let unrealized = self.risk.unrealized(final_mid);
        let final_marked = self.risk.marked_equity(final_mid);
        let latency_samples = self.agg.latency_samples().to_vec();
        let agg = self.agg;
        let (rows, metrics) = agg.finalize(
            &self.cfg.run_id,
            realized,
            unrealized,
            final_marked,
            self.cfg.adv_fatal_missing,
            self.orders.metrics(),
            self.rules.config(),
            self.fee_model.config(),
            &self.cfg.latency,
        )?;
        info!(
            fills = metrics.fills_total,
            rejects = metrics.rejects_total,
            net_total = metrics.net_total,
            "replay complete"
        );
        Ok(RunResult {
            rows,
            metrics,
            latency_samples,
        })
    }

    /// Route one post-latency action against the current book.
    fn dispatch_pending(
        &mut self,
        pending: PendingAction,
        now: i64,
        seq: i64,
        snap: &OrderbookSnapshot,
    ) -> Result<(), EngineError> {
        match self.orders.get(pending.order_id) {
            None => return Ok(()),
            Some(order) if order.status.is_terminal() => {
                // Cancelled/expired/replaced while in flight: drop silently.
                debug!(order_id = pending.order_id, "discarding stale pending action");
                return Ok(());
            }
            Some(_) => {}
        }
        let mut fill = self.matching.simulate(&pending.action, snap);
        fill.order_id = pending.order_id;
        if fill.is_filled() {
            self.settle_fill(&fill, now, seq, snap)?;
        } else {
            self.orders.mark_rejected(pending.order_id, now);
            let meta = self.order_meta(pending.order_id);
            self.agg.record_reject(
                pending.order_id,
                now,
                seq,
                fill.side,
                fill.reason.unwrap_or(RejectReason::NoLiquidity),
                meta.src,
                snap.mid(),
                opposite_best(snap, fill.side),
                meta.target_notional,
            );
        }
        Ok(())
    }

    /// Rules → risk → order manager → maker-or-latency routing.
    fn process_action(
        &mut self,
        action: Action,
        src: ActionSource,
        now: i64,
        seq: i64,
        snap: &OrderbookSnapshot,
    ) -> Result<(), EngineError> {
        match action.kind {
            ActionKind::Cancel => {
                if let Some(target) = action.target_order_id {
                    self.orders.cancel(target, now);
                    self.maker_sim.cancel(target);
                }
                return Ok(());
            }
            ActionKind::Replace => {
                if let Some(target) = action.target_order_id {
                    let expire_ts = now + self.cfg.maker.expire_ms;
                    if let ReplaceOutcome::Replaced(new_order) = self.orders.replace(
                        target,
                        action.replace_price,
                        action.replace_qty,
                        now,
                        expire_ts,
                    ) {
                        self.maker_sim.cancel(target);
                        let meta = self.order_meta(target);
                        self.meta.insert(new_order.order_id, meta);
                        let mut successor = Action {
                            order_type: new_order.order_type,
                            side: new_order.side,
                            size: new_order.qty,
                            limit_price: new_order.price,
                            post_only: new_order.post_only,
                            reduce_only: new_order.reduce_only,
                            target_order_id: Some(target),
                            ..Action::default()
                        };
                        successor.is_maker = new_order.price.is_some();
                        self.route_order(new_order.order_id, &successor, meta.src, now, seq, snap);
                    }
                }
                return Ok(());
            }
            ActionKind::Place => {}
        }

        self.agg.note_attempt();
        let normalized = match self.rules.apply(&action, snap) {
            Ok(normalized) => normalized,
            Err(reason) => {
                self.agg.record_reject(
                    0,
                    now,
                    seq,
                    action.side,
                    reason,
                    src,
                    snap.mid(),
                    opposite_best(snap, action.side),
                    action.notional.unwrap_or(0.0),
                );
                return Ok(());
            }
        };

        let ref_price = reference_price(&normalized, snap);
        if !self.risk.validate(&normalized, ref_price) {
            self.agg.record_reject(
                0,
                now,
                seq,
                normalized.side,
                RejectReason::RiskLimit,
                src,
                snap.mid(),
                opposite_best(snap, normalized.side),
                normalized.notional.unwrap_or(normalized.size * ref_price),
            );
            return Ok(());
        }

        let is_taker = normalized.is_taker(snap);
        let expire_ts = if is_taker {
            0
        } else {
            now + self.cfg.maker.expire_ms
        };
        let order = self.orders.place(&normalized, now, expire_ts);
        self.meta.insert(
            order.order_id,
            OrderMeta {
                src,
                target_notional: normalized.notional.unwrap_or(normalized.size * ref_price),
                crossing: normalized.crosses_opposite_top(snap),
            },
        );
        self.route_order(order.order_id, &normalized, src, now, seq, snap);
        Ok(())
    }

    /// Send an already-placed order either through the latency scheduler
    /// (taker) or into the maker queue (passive).
    fn route_order(
        &mut self,
        order_id: OrderId,
        normalized: &Action,
        src: ActionSource,
        now: i64,
        seq: i64,
        snap: &OrderbookSnapshot,
    ) {
        if normalized.is_taker(snap) {
            let latency_ms = deterministic_latency_ms(
                &self.cfg.symbol,
                seq.max(0) as u64,
                self.action_idx,
                &self.cfg.latency,
            );
            let fill_ts = now + latency_ms.floor() as i64;
            self.agg.record_latency(LatencySample {
                ts_ms: now,
                seq,
                action_idx: self.action_idx,
                latency_ms,
            });
            self.pending.push(PendingAction {
                order_id,
                action: normalized.clone(),
                fill_ts,
                latency_ms,
                seq,
                action_idx: self.action_idx,
                src,
            });
            self.action_idx += 1;
        } else {
            self.maker_sim.submit(
                order_id,
                normalized.side,
                normalized.limit_price,
                normalized.size,
                snap,
                now,
            );
            self.agg.note_maker_submitted();
        }
    }

    /// Fee, order-manager transition, position update, ledger row.
    fn settle_fill(
        &mut self,
        fill: &Fill,
        now: i64,
        seq: i64,
        snap: &OrderbookSnapshot,
    ) -> Result<(), EngineError> {
        let fee = self.fee_model.compute(fill);
        self.orders.apply_fill(fill, now)?;
        let mid = snap.mid();
        let base = self.risk.marked_equity(mid);
        self.risk.update(fill);
        let gross_delta = self.risk.marked_equity(mid) - base;

        let meta = self.order_meta(fill.order_id);
        let is_maker = fill.liquidity == Liquidity::Maker;
        let queue_time_ms = if is_maker {
            self.orders
                .get(fill.order_id)
                .map_or(0, |order| now - order.created_ts)
        } else {
            0
        };
        let best = if is_maker {
            same_side_best(snap, fill.side)
        } else {
            opposite_best(snap, fill.side)
        };
        self.agg.record_fill(FillContext {
            fill,
            now_ts: now,
            seq,
            mid,
            best,
            src: meta.src,
            target_notional: meta.target_notional,
            crossing: meta.crossing,
            queue_time_ms,
            fee: &fee,
            gross_delta,
            adv_ticks: if is_maker { self.cfg.maker.adv_ticks } else { 0.0 },
        });
        Ok(())
    }

    fn order_meta(&self, order_id: OrderId) -> OrderMeta {
        self.meta.get(&order_id).copied().unwrap_or(OrderMeta {
            src: ActionSource::Strategy,
            target_notional: 0.0,
            crossing: false,
        })
    }
}

fn opposite_best(snap: &OrderbookSnapshot, side: Side) -> f64 {
    match side {
        Side::Buy => snap.best_ask,
        Side::Sell => snap.best_bid,
        Side::Hold => 0.0,
    }
}

fn same_side_best(snap: &OrderbookSnapshot, side: Side) -> f64 {
    match side {
        Side::Buy => snap.best_bid,
        Side::Sell => snap.best_ask,
        Side::Hold => 0.0,
    }
}

/// Positive price an action is expected to trade around, for risk checks.
fn reference_price(action: &Action, snap: &OrderbookSnapshot) -> f64 {
    if let Some(limit) = action.limit_price {
        if limit > 0.0 {
            return limit;
        }
    }
    let opposite = opposite_best(snap, action.side);
    if opposite > 0.0 {
        opposite
    } else {
        same_side_best(snap, action.side)
    }
}

/// Convenience wrapper: write `metrics` as pretty JSON.
pub fn metrics_to_json(metrics: &MetricsReport) -> Result<String> {
    serde_json::to_string_pretty(metrics).context("failed to serialize metrics")
}
