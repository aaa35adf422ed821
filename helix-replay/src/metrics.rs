//! Run aggregation: the fills ledger, PnL bookkeeping cross-checks, and the
//! metrics document written at end of run.

use std::collections::BTreeMap;

use helix_config::{FeeConfig, RulesConfig};
use helix_core::{
    ActionSource, EngineError, Fill, LatencyConfig, OrderId, RejectReason, Side, EPS, PNL_EPS,
};
use helix_data::{FillRow, LatencySample};
use helix_execution::{FeeResult, OrderMetrics};
use itertools::Itertools;
use serde::Serialize;

/// Everything the aggregator needs to turn one fill into a ledger row.
pub struct FillContext<'a> {
    pub fill: &'a Fill,
    pub now_ts: i64,
    pub seq: i64,
    pub mid: f64,
    /// Best price on the consumed side before the trade.
    pub best: f64,
    pub src: ActionSource,
    pub target_notional: f64,
    pub crossing: bool,
    pub queue_time_ms: i64,
    pub fee: &'a FeeResult,
    /// Mark-to-market equity delta produced by this fill.
    pub gross_delta: f64,
    /// Configured adverse-selection penalty (maker fills only).
    pub adv_ticks: f64,
}

struct AdvPending {
    row_idx: usize,
    mid_at_fill: f64,
    side: Side,
    target_ts: i64,
}

/// Accumulates per-fill rows and run statistics; one instance per run.
pub struct RunAggregator {
    tick_size: f64,
    adv_horizon_ms: i64,

    rows: Vec<FillRow>,
    fees: f64,
    gross_total: f64,
    last_marked_equity: f64,
    net_steps: Vec<f64>,
    net_by_1s: BTreeMap<i64, f64>,
    net_by_10s: BTreeMap<i64, f64>,
    turnover: f64,

    fills_total: u64,
    n_maker_fills: u64,
    n_taker_fills: u64,
    rejects_total: u64,
    actions_attempted: u64,
    maker_submitted: u64,
    reject_counts: BTreeMap<String, u64>,

    latency_samples: Vec<LatencySample>,
    trade_skew_ms: Vec<f64>,
    maker_queue_times: Vec<f64>,
    exec_cost: Vec<f64>,
    exec_cost_maker: Vec<f64>,
    exec_cost_taker: Vec<f64>,
    fee_bps_maker: Vec<f64>,
    fee_bps_taker: Vec<f64>,
    filled_to_target: Vec<f64>,

    adv_pending: Vec<AdvPending>,
    adv_resolved: Vec<f64>,
}

impl RunAggregator {
    #[must_use]
    pub fn new(tick_size: f64, adv_horizon_ms: i64) -> Self {
        Self {
            tick_size,
            adv_horizon_ms,
            rows: Vec::new(),
            fees: 0.0,
            gross_total: 0.0,
            last_marked_equity: 0.0,
            net_steps: Vec::new(),
            net_by_1s: BTreeMap::new(),
            net_by_10s: BTreeMap::new(),
            turnover: 0.0,
            fills_total: 0,
            n_maker_fills: 0,
            n_taker_fills: 0,
            rejects_total: 0,
            actions_attempted: 0,
            maker_submitted: 0,
            reject_counts: BTreeMap::new(),
            latency_samples: Vec::new(),
            trade_skew_ms: Vec::new(),
            maker_queue_times: Vec::new(),
            exec_cost: Vec::new(),
            exec_cost_maker: Vec::new(),
            exec_cost_taker: Vec::new(),
            fee_bps_maker: Vec::new(),
            fee_bps_taker: Vec::new(),
            filled_to_target: Vec::new(),
            adv_pending: Vec::new(),
            adv_resolved: Vec::new(),
        }
    }

    pub fn note_attempt(&mut self) {
        self.actions_attempted += 1;
    }

    pub fn note_maker_submitted(&mut self) {
        self.maker_submitted += 1;
    }

    pub fn record_trade_skew(&mut self, skew_ms: f64) {
        self.trade_skew_ms.push(skew_ms);
    }

    pub fn record_latency(&mut self, sample: LatencySample) {
        self.latency_samples.push(sample);
    }

    #[must_use]
    pub fn latency_samples(&self) -> &[LatencySample] {
        &self.latency_samples
    }

    /// Fold the current mark-to-market equity into the incremental gross
    /// ledger. Called once per tick and implicitly via [`Self::record_fill`].
    pub fn mark_equity(&mut self, marked_equity: f64) {
        self.gross_total += marked_equity - self.last_marked_equity;
        self.last_marked_equity = marked_equity;
    }

    /// Append a filled-row and update every dependent statistic.
    pub fn record_fill(&mut self, ctx: FillContext<'_>) {
        let fill = ctx.fill;
        let net_delta = ctx.gross_delta - ctx.fee.fee;
        self.fees += ctx.fee.fee;
        self.gross_total += ctx.gross_delta;
        self.last_marked_equity += ctx.gross_delta;
        self.net_steps.push(net_delta);
        *self.net_by_1s.entry(ctx.now_ts.div_euclid(1000)).or_insert(0.0) += net_delta;
        *self.net_by_10s.entry(ctx.now_ts.div_euclid(10_000)).or_insert(0.0) += net_delta;

        let filled_notional = fill.vwap_price * fill.filled_qty;
        self.turnover += filled_notional.abs();

        let exec_cost = signed_ticks(fill.side, fill.vwap_price, ctx.mid, self.tick_size);
        let spread_paid = (fill.vwap_price - ctx.mid).abs() / self.tick_size;
        self.exec_cost.push(exec_cost);
        self.fills_total += 1;
        let is_maker = matches!(fill.liquidity, helix_core::Liquidity::Maker);
        if is_maker {
            self.n_maker_fills += 1;
            self.exec_cost_maker.push(exec_cost);
            self.fee_bps_maker.push(ctx.fee.fee_bps);
            self.maker_queue_times.push(ctx.queue_time_ms as f64);
        } else {
            self.n_taker_fills += 1;
            self.exec_cost_taker.push(exec_cost);
            self.fee_bps_taker.push(ctx.fee.fee_bps);
        }
        if ctx.target_notional > 0.0 {
            self.filled_to_target.push(filled_notional / ctx.target_notional);
        }

        let row_idx = self.rows.len();
        self.rows.push(FillRow {
            order_id: fill.order_id,
            ts_ms: ctx.now_ts,
            seq: ctx.seq,
            filled: true,
            side: fill.side,
            liquidity: Some(fill.liquidity),
            src: ctx.src,
            reason: None,
            vwap: fill.vwap_price,
            filled_qty: fill.filled_qty,
            unfilled_qty: fill.unfilled_qty,
            fee: ctx.fee.fee,
            fee_bps: ctx.fee.fee_bps,
            gross: ctx.gross_delta,
            net: net_delta,
            exec_cost_ticks_signed: exec_cost,
            mid: ctx.mid,
            best: ctx.best,
            spread_paid_ticks: spread_paid,
            slip_ticks: fill.slippage_ticks,
            target_notional: ctx.target_notional,
            filled_notional,
            crossing: ctx.crossing,
            levels_crossed: fill.levels_crossed,
            adv_ticks: ctx.adv_ticks,
            queue_time_ms: ctx.queue_time_ms,
            adv_selection_ticks: None,
        });

        if is_maker {
            self.adv_pending.push(AdvPending {
                row_idx,
                mid_at_fill: ctx.mid,
                side: fill.side,
                target_ts: ctx.now_ts + self.adv_horizon_ms,
            });
        }
    }

    /// Append a reject row. `order_id` is zero when the action was refused
    /// before an order could be placed.
    #[allow(clippy::too_many_arguments)]
    pub fn record_reject(
        &mut self,
        order_id: OrderId,
        now_ts: i64,
        seq: i64,
        side: Side,
        reason: RejectReason,
        src: ActionSource,
        mid: f64,
        best: f64,
        target_notional: f64,
    ) {
        self.rejects_total += 1;
        *self
            .reject_counts
            .entry(reason.as_str().to_string())
            .or_insert(0) += 1;
        self.rows.push(FillRow {
            order_id,
            ts_ms: now_ts,
            seq,
            filled: false,
            side,
            liquidity: None,
            src,
            reason: Some(reason),
            vwap: 0.0,
            filled_qty: 0.0,
            unfilled_qty: 0.0,
            fee: 0.0,
            fee_bps: 0.0,
            gross: 0.0,
            net: 0.0,
            exec_cost_ticks_signed: 0.0,
            mid,
            best,
            spread_paid_ticks: 0.0,
            slip_ticks: 0.0,
            target_notional,
            filled_notional: 0.0,
            crossing: false,
            levels_crossed: 0,
            adv_ticks: 0.0,
            queue_time_ms: 0,
            adv_selection_ticks: None,
        });
    }

    /// Resolve adverse-selection horizons that the book clock has passed.
    pub fn resolve_adverse(&mut self, now_ts: i64, mid: f64) {
        if self.adv_pending.is_empty() || !(mid > 0.0) {
            return;
        }
        let mut remaining = Vec::with_capacity(self.adv_pending.len());
        for pending in self.adv_pending.drain(..) {
            if now_ts >= pending.target_ts {
                let delta = mid - pending.mid_at_fill;
                let adv = match pending.side {
                    Side::Buy => delta,
                    _ => -delta,
                } / self.tick_size;
                self.rows[pending.row_idx].adv_selection_ticks = Some(adv);
                self.adv_resolved.push(adv);
            } else {
                remaining.push(pending);
            }
        }
        self.adv_pending = remaining;
    }

    #[must_use]
    pub fn unresolved_adverse(&self) -> usize {
        self.adv_pending.len()
    }

    /// Verify the PnL identity and assemble the final document.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize(
        mut self,
        run_id: &str,
        realized: f64,
        unrealized: f64,
        final_marked_equity: f64,
        adv_fatal_missing: bool,
        orders: &OrderMetrics,
        rules: &RulesConfig,
        fee_model: &FeeConfig,
        latency: &LatencyConfig,
    ) -> Result<(Vec<FillRow>, MetricsReport), EngineError> {
        if adv_fatal_missing && !self.adv_pending.is_empty() {
            return Err(EngineError::AdverseSelectionUnresolved {
                count: self.adv_pending.len(),
            });
        }
        self.mark_equity(final_marked_equity);

        let net_total = realized + unrealized - self.fees;
        let identity_lhs = self.gross_total - self.fees;
        let diff = (identity_lhs - net_total).abs();
        if diff > PNL_EPS {
            return Err(EngineError::PnlIdentity {
                lhs: identity_lhs,
                rhs: net_total,
                diff,
            });
        }

        let filled_notional_total = self.turnover;
        let fee_bps_observed = if filled_notional_total > EPS {
            self.fees / filled_notional_total * 1e4
        } else {
            0.0
        };

        let latency_ms: Vec<f64> = self.latency_samples.iter().map(|s| s.latency_ms).collect();
        let report = MetricsReport {
            run_id: run_id.to_string(),
            fees: self.fees,
            gross: self.gross_total,
            realized,
            unrealized,
            net_total,
            identity_ok: diff <= PNL_EPS,
            sharpe_1s: SharpeStats::from_buckets(&self.net_by_1s),
            sharpe_10s: SharpeStats::from_buckets(&self.net_by_10s),
            max_drawdown: max_drawdown(&self.net_steps),
            turnover: self.turnover,
            fill_rate: ratio(self.fills_total, self.actions_attempted),
            maker_fill_rate: ratio(self.n_maker_fills, self.maker_submitted),
            maker_queue_time_ms: AvgP90Stats::from_samples(&self.maker_queue_times),
            maker_adv_selection_ticks: AdvStats::from_samples(&self.adv_resolved),
            trade_ts_skew_ms: SkewStats::from_samples(&self.trade_skew_ms),
            fee_bps: fee_bps_observed,
            fee_bps_maker: RateStats::from_samples(&self.fee_bps_maker),
            fee_bps_taker: RateStats::from_samples(&self.fee_bps_taker),
            exec_cost_ticks_signed: ExecCostStats::from_samples(&self.exec_cost),
            exec_cost_ticks_signed_maker: ExecCostStats::from_samples(&self.exec_cost_maker),
            exec_cost_ticks_signed_taker: ExecCostStats::from_samples(&self.exec_cost_taker),
            filled_to_target: P99Stats::from_samples(&self.filled_to_target),
            fills_total: self.fills_total,
            n_maker_fills: self.n_maker_fills,
            n_taker_fills: self.n_taker_fills,
            rejects_total: self.rejects_total,
            actions_attempted: self.actions_attempted,
            reject_counts: self.reject_counts,
            rules: RulesInfo {
                tick_size: rules.tick_size,
                qty_step: rules.qty_step,
                min_qty: rules.min_qty,
                min_notional: rules.min_notional,
                source: rules.source.clone(),
            },
            fee_model: FeeInfo {
                maker_bps: fee_model.maker_bps,
                taker_bps: fee_model.taker_bps,
                fee_ccy: fee_model.fee_ccy.clone(),
                rounding: fee_model.rounding.as_str().to_string(),
                source: fee_model.source.clone(),
            },
            orders: OrdersInfo {
                placed: orders.placed,
                cancelled: orders.cancelled,
                cancel_noop: orders.cancel_noop,
                replaced: orders.replaced,
                replace_noop: orders.replace_noop,
                rejected: orders.rejected,
                expired: orders.expired,
                illegal_transitions: orders.illegal_transitions,
                open_orders_peak: orders.open_orders_peak,
                avg_order_lifetime_ms: orders.avg_lifetime_ms(),
            },
            latency: LatencyInfo {
                base_ms: latency.base_ms,
                jitter_ms: latency.jitter_ms,
                tail_ms: latency.tail_ms,
                tail_prob: latency.tail_prob,
                source: latency.source.clone(),
                samples: SkewStats::from_samples(&latency_ms),
            },
        };
        Ok((self.rows, report))
    }
}

fn signed_ticks(side: Side, price: f64, reference: f64, tick: f64) -> f64 {
    match side {
        Side::Buy => (price - reference) / tick,
        _ => (reference - price) / tick,
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Nearest-rank percentile over a sorted copy of `samples`.
fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sorted: Vec<f64> = samples
        .iter()
        .copied()
        .sorted_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .collect();
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// Sample standard deviation (n - 1).
fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let m = mean(samples);
    let var = samples.iter().map(|s| (s - m).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    var.sqrt()
}

/// Peak-to-trough drawdown over the cumulative net-step curve.
fn max_drawdown(net_steps: &[f64]) -> f64 {
    let mut cumulative = 0.0;
    let mut peak = 0.0f64;
    let mut drawdown = 0.0f64;
    for step in net_steps {
        cumulative += step;
        peak = peak.max(cumulative);
        drawdown = drawdown.max(peak - cumulative);
    }
    drawdown
}

#[derive(Clone, Debug, Serialize)]
pub struct SharpeStats {
    pub sharpe: f64,
    pub n: u64,
    pub std: f64,
}

impl SharpeStats {
    fn from_buckets(buckets: &BTreeMap<i64, f64>) -> Self {
        let values: Vec<f64> = buckets.values().copied().collect();
        let std = std_dev(&values);
        let sharpe = if std > EPS {
            mean(&values) / std * (values.len() as f64).sqrt()
        } else {
            0.0
        };
        Self {
            sharpe,
            n: values.len() as u64,
            std,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AvgP90Stats {
    pub avg: f64,
    pub p90: f64,
}

impl AvgP90Stats {
    fn from_samples(samples: &[f64]) -> Self {
        Self {
            avg: mean(samples),
            p90: percentile(samples, 90.0),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AdvStats {
    pub mean: f64,
    pub p90: f64,
    pub count: u64,
}

impl AdvStats {
    fn from_samples(samples: &[f64]) -> Self {
        Self {
            mean: mean(samples),
            p90: percentile(samples, 90.0),
            count: samples.len() as u64,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SkewStats {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub n: u64,
}

impl SkewStats {
    fn from_samples(samples: &[f64]) -> Self {
        Self {
            p50: percentile(samples, 50.0),
            p90: percentile(samples, 90.0),
            p99: percentile(samples, 99.0),
            n: samples.len() as u64,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RateStats {
    pub p50: f64,
    pub p99: f64,
    pub n: u64,
}

impl RateStats {
    fn from_samples(samples: &[f64]) -> Self {
        Self {
            p50: percentile(samples, 50.0),
            p99: percentile(samples, 99.0),
            n: samples.len() as u64,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ExecCostStats {
    pub p50: f64,
    pub p99: f64,
    pub std: f64,
}

impl ExecCostStats {
    fn from_samples(samples: &[f64]) -> Self {
        Self {
            p50: percentile(samples, 50.0),
            p99: percentile(samples, 99.0),
            std: std_dev(samples),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct P99Stats {
    pub p99: f64,
}

impl P99Stats {
    fn from_samples(samples: &[f64]) -> Self {
        Self {
            p99: percentile(samples, 99.0),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RulesInfo {
    pub tick_size: f64,
    pub qty_step: f64,
    pub min_qty: f64,
    pub min_notional: f64,
    pub source: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct FeeInfo {
    pub maker_bps: f64,
    pub taker_bps: f64,
    pub fee_ccy: String,
    pub rounding: String,
    pub source: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrdersInfo {
    pub placed: u64,
    pub cancelled: u64,
    pub cancel_noop: u64,
    pub replaced: u64,
    pub replace_noop: u64,
    pub rejected: u64,
    pub expired: u64,
    pub illegal_transitions: u64,
    pub open_orders_peak: u64,
    pub avg_order_lifetime_ms: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LatencyInfo {
    pub base_ms: f64,
    pub jitter_ms: f64,
    pub tail_ms: f64,
    pub tail_prob: f64,
    pub source: String,
    pub samples: SkewStats,
}

/// The metrics.json document.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsReport {
    pub run_id: String,
    pub fees: f64,
    pub gross: f64,
    pub realized: f64,
    pub unrealized: f64,
    pub net_total: f64,
    pub identity_ok: bool,
    pub sharpe_1s: SharpeStats,
    pub sharpe_10s: SharpeStats,
    pub max_drawdown: f64,
    pub turnover: f64,
    pub fill_rate: f64,
    pub maker_fill_rate: f64,
    pub maker_queue_time_ms: AvgP90Stats,
    pub maker_adv_selection_ticks: AdvStats,
    pub trade_ts_skew_ms: SkewStats,
    pub fee_bps: f64,
    pub fee_bps_maker: RateStats,
    pub fee_bps_taker: RateStats,
    pub exec_cost_ticks_signed: ExecCostStats,
    pub exec_cost_ticks_signed_maker: ExecCostStats,
    pub exec_cost_ticks_signed_taker: ExecCostStats,
    pub filled_to_target: P99Stats,
    pub fills_total: u64,
    pub n_maker_fills: u64,
    pub n_taker_fills: u64,
    pub rejects_total: u64,
    pub actions_attempted: u64,
    pub reject_counts: BTreeMap<String, u64>,
    pub rules: RulesInfo,
    pub fee_model: FeeInfo,
    pub orders: OrdersInfo,
    pub latency: LatencyInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::Liquidity;

    #[test]
    fn percentile_nearest_rank() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&samples, 50.0), 3.0);
        assert_eq!(percentile(&samples, 0.0), 1.0);
        assert_eq!(percentile(&samples, 100.0), 5.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn std_dev_uses_n_minus_one() {
        let samples = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // Sample variance of this classic set is 32/7.
        assert!((std_dev(&samples) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(std_dev(&[1.0]), 0.0);
    }

    #[test]
    fn drawdown_tracks_peak_to_trough() {
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
        assert!((max_drawdown(&[5.0, -2.0, -4.0, 3.0]) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn sharpe_is_guarded_against_zero_std() {
        let mut buckets = BTreeMap::new();
        buckets.insert(0, 1.0);
        buckets.insert(1, 1.0);
        let stats = SharpeStats::from_buckets(&buckets);
        assert_eq!(stats.sharpe, 0.0);
        assert_eq!(stats.n, 2);
    }

    fn default_configs() -> (RulesConfig, FeeConfig, LatencyConfig) {
        (
            RulesConfig::default(),
            FeeConfig::default(),
            LatencyConfig::default(),
        )
    }

    fn taker_fee(fee: f64, bps: f64) -> FeeResult {
        FeeResult {
            fee,
            fee_bps: bps,
            fee_ccy: "USDT".into(),
        }
    }

    fn taker_fill(order_id: OrderId, price: f64, qty: f64) -> Fill {
        let mut fill = Fill::filled(Side::Buy, price, qty, false, Liquidity::Taker);
        fill.order_id = order_id;
        fill
    }

    #[test]
    fn fill_rows_and_identity_flow_through_finalize() {
        let mut agg = RunAggregator::new(0.1, 1000);
        agg.note_attempt();
        let fill = taker_fill(1, 101.0, 1.0);
        let fee = taker_fee(0.07, 6.93);
        // Buy 1 @ 101 with mid 100: marked equity goes to -1.
        agg.record_fill(FillContext {
            fill: &fill,
            now_ts: 1000,
            seq: 5,
            mid: 100.0,
            best: 101.0,
            src: ActionSource::DemoTaker,
            target_notional: 101.0,
            crossing: false,
            queue_time_ms: 0,
            fee: &fee,
            gross_delta: -1.0,
            adv_ticks: 0.0,
        });
        let (rows, report) = agg
            .finalize(
                "test-run",
                0.0,
                -1.0,
                -1.0,
                false,
                &OrderMetrics::default(),
                &default_configs().0,
                &default_configs().1,
                &default_configs().2,
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].filled);
        assert_eq!(report.fills_total, 1);
        assert_eq!(report.n_taker_fills, 1);
        assert!(report.identity_ok);
        assert!((report.net_total - (-1.07)).abs() < 1e-9);
        assert!((report.turnover - 101.0).abs() < 1e-9);
        assert!((report.fill_rate - 1.0).abs() < 1e-9);
        assert!((rows[0].exec_cost_ticks_signed - 10.0).abs() < 1e-9);
    }

    #[test]
    fn identity_violation_is_fatal() {
        let mut agg = RunAggregator::new(0.1, 1000);
        let fill = taker_fill(1, 101.0, 1.0);
        let fee = taker_fee(0.0, 0.0);
        agg.record_fill(FillContext {
            fill: &fill,
            now_ts: 0,
            seq: 0,
            mid: 100.0,
            best: 101.0,
            src: ActionSource::Strategy,
            target_notional: 0.0,
            crossing: false,
            queue_time_ms: 0,
            fee: &fee,
            gross_delta: -1.0,
            adv_ticks: 0.0,
        });
        // Claim realized+unrealized far from the marked ledger.
        let err = agg
            .finalize(
                "bad",
                5.0,
                5.0,
                -1.0,
                false,
                &OrderMetrics::default(),
                &default_configs().0,
                &default_configs().1,
                &default_configs().2,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::PnlIdentity { .. }));
    }

    #[test]
    fn adverse_selection_resolves_against_later_mid() {
        let mut agg = RunAggregator::new(0.1, 100);
        let mut fill = Fill::filled(Side::Buy, 100.0, 1.0, false, Liquidity::Maker);
        fill.order_id = 3;
        let fee = taker_fee(0.02, 2.0);
        agg.record_fill(FillContext {
            fill: &fill,
            now_ts: 0,
            seq: 1,
            mid: 100.0,
            best: 100.0,
            src: ActionSource::DemoMaker,
            target_notional: 0.0,
            crossing: false,
            queue_time_ms: 50,
            fee: &fee,
            gross_delta: 0.0,
            adv_ticks: 2.0,
        });
        // Before the horizon: unresolved.
        agg.resolve_adverse(50, 101.0);
        assert_eq!(agg.unresolved_adverse(), 1);
        // Mid dropped 1.0 against the buy: -10 ticks.
        agg.resolve_adverse(100, 99.0);
        assert_eq!(agg.unresolved_adverse(), 0);
        let (rows, report) = agg
            .finalize(
                "adv",
                0.0,
                -1.02 + 0.02,
                -1.0,
                true,
                &OrderMetrics::default(),
                &default_configs().0,
                &default_configs().1,
                &default_configs().2,
            )
            .unwrap();
        assert_eq!(rows[0].adv_selection_ticks, Some(-10.0));
        assert_eq!(report.maker_adv_selection_ticks.count, 1);
        assert!((report.maker_adv_selection_ticks.mean + 10.0).abs() < 1e-9);
        assert_eq!(report.n_maker_fills, 1);
        assert!((report.maker_queue_time_ms.avg - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unresolved_adverse_is_fatal_when_required() {
        let mut agg = RunAggregator::new(0.1, 1_000_000);
        let mut fill = Fill::filled(Side::Sell, 100.0, 1.0, false, Liquidity::Maker);
        fill.order_id = 1;
        let fee = taker_fee(0.0, 0.0);
        agg.record_fill(FillContext {
            fill: &fill,
            now_ts: 0,
            seq: 0,
            mid: 100.0,
            best: 100.0,
            src: ActionSource::DemoMaker,
            target_notional: 0.0,
            crossing: false,
            queue_time_ms: 0,
            fee: &fee,
            gross_delta: 0.0,
            adv_ticks: 2.0,
        });
        let err = agg
            .finalize(
                "adv-missing",
                0.0,
                0.0,
                0.0,
                true,
                &OrderMetrics::default(),
                &default_configs().0,
                &default_configs().1,
                &default_configs().2,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::AdverseSelectionUnresolved { .. }));
    }

    #[test]
    fn reject_rows_accumulate_reason_counts() {
        let mut agg = RunAggregator::new(0.1, 0);
        agg.note_attempt();
        agg.note_attempt();
        agg.record_reject(
            0,
            10,
            1,
            Side::Buy,
            RejectReason::MinQty,
            ActionSource::Strategy,
            100.0,
            100.1,
            0.0,
        );
        agg.record_reject(
            4,
            20,
            2,
            Side::Sell,
            RejectReason::NoLiquidity,
            ActionSource::DemoTaker,
            100.0,
            99.9,
            50.0,
        );
        let (rows, report) = agg
            .finalize(
                "rejects",
                0.0,
                0.0,
                0.0,
                false,
                &OrderMetrics::default(),
                &default_configs().0,
                &default_configs().1,
                &default_configs().2,
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].filled);
        assert_eq!(report.rejects_total, 2);
        assert_eq!(report.reject_counts.get("min_qty"), Some(&1));
        assert_eq!(report.reject_counts.get("no_liquidity"), Some(&1));
        assert_eq!(report.fill_rate, 0.0);
    }
}
