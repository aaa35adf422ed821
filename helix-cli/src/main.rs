//! Helix CLI: replay an L2 delta stream through the simulator and write the
//! per-run fills ledger and metrics document.

mod telemetry;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;

use helix_config::{load_latency_fit, load_symbol_config};
use helix_core::LatencyConfig;
use helix_data::{load_deltas, load_trades, BookcheckWriter, FillsWriter, LatencySamplesWriter};
use helix_execution::MakerParams;
use helix_replay::{metrics_to_json, EngineConfig, ReplayEngine};
use helix_strategy::{DemoMaker, DemoTaker, Strategy, ThresholdStrategy};

#[derive(Parser)]
#[command(author, version, about = "Helix deterministic market-replay simulator")]
struct Cli {
    /// L2 delta CSV to replay.
    delta_file: PathBuf,

    /// Disable all issuers; replay the book only.
    #[arg(long = "no_actions")]
    no_actions: bool,

    /// Quote notional per demo taker order.
    #[arg(long = "demo_notional", default_value_t = 1000.0)]
    demo_notional: f64,

    /// Book-time pacing between demo taker orders.
    #[arg(long = "demo_interval_ms", default_value_t = 250)]
    demo_interval_ms: i64,

    /// Cap on demo taker orders.
    #[arg(long = "demo_max", default_value_t = 20)]
    demo_max: u64,

    /// Run the demo issuers instead of the threshold strategy.
    #[arg(long = "demo_only")]
    demo_only: bool,

    /// Also run the passive maker demo issuer.
    #[arg(long = "maker_demo")]
    maker_demo: bool,

    /// Quote notional per maker demo order.
    #[arg(long = "maker_notional", default_value_t = 500.0)]
    maker_notional: f64,

    /// Book-time pacing between maker demo orders.
    #[arg(long = "maker_interval_ms", default_value_t = 500)]
    maker_interval_ms: i64,

    /// Cap on maker demo orders.
    #[arg(long = "maker_max", default_value_t = 10)]
    maker_max: u64,

    /// Resting lifetime of maker orders.
    #[arg(long = "maker_ttl_ms", default_value_t = 200)]
    maker_ttl_ms: i64,

    /// Horizon for maker adverse-selection measurement.
    #[arg(long = "adv_horizon_ms", default_value_t = 1000)]
    adv_horizon_ms: i64,

    /// Fail the run when adverse-selection horizons stay unresolved (0|1).
    #[arg(long = "adv_fatal_missing", default_value_t = 0)]
    adv_fatal_missing: u8,

    /// Periodic top-of-book output for recorder comparison.
    #[arg(long = "bookcheck")]
    bookcheck: Option<PathBuf>,

    /// Emit a bookcheck row every N applied deltas.
    #[arg(long = "bookcheck_every", default_value_t = 100)]
    bookcheck_every: u64,

    /// Pin the run id (otherwise derived from wall clock).
    #[arg(long = "run_id")]
    run_id: Option<String>,

    /// Venue rules / fee schedule file.
    #[arg(long = "rules_config")]
    rules_config: Option<PathBuf>,

    #[arg(long = "venue", default_value = "SIM")]
    venue: String,

    #[arg(long = "symbol", default_value = "SIM")]
    symbol: String,

    /// Trade-print CSV aligned with the delta stream.
    #[arg(long = "trades")]
    trades: Option<PathBuf>,

    /// Latency-fit JSON produced by the offline fitter.
    #[arg(long = "latency_fit")]
    latency_fit: Option<PathBuf>,

    /// Increases logging verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.verbose)?;

    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| Utc::now().format("run_%Y%m%dT%H%M%S%3fZ").to_string());

    let symbol_cfg = load_symbol_config(cli.rules_config.as_deref(), &cli.venue, &cli.symbol)?;
    let latency = match cli.latency_fit.as_deref() {
        Some(path) => load_latency_fit(path)?,
        None => LatencyConfig::default(),
    };

    let deltas = load_deltas(&cli.delta_file)?;
    let trades = match cli.trades.as_deref() {
        Some(path) => load_trades(path)?,
        None => Vec::new(),
    };

    let cfg = EngineConfig {
        symbol: cli.symbol.clone(),
        venue: cli.venue.clone(),
        run_id: run_id.clone(),
        rules: symbol_cfg.rules,
        fees: symbol_cfg.fees,
        latency,
        maker: MakerParams {
            expire_ms: cli.maker_ttl_ms,
            ..MakerParams::default()
        },
        adv_horizon_ms: cli.adv_horizon_ms,
        adv_fatal_missing: cli.adv_fatal_missing != 0,
        bookcheck_every: cli.bookcheck_every,
        ..EngineConfig::default()
    };

    let strategies = build_strategies(&cli);
    let engine = ReplayEngine::new(cfg, trades, strategies)?;

    let mut bookcheck = match cli.bookcheck.as_deref() {
        Some(path) => Some(BookcheckWriter::create(path)?),
        None => None,
    };
    let result = engine.run(&deltas.deltas, bookcheck.as_mut())?;
    if let Some(writer) = bookcheck.as_mut() {
        writer.flush()?;
    }

    let run_dir = PathBuf::from("runs").join(&run_id);
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create run directory {}", run_dir.display()))?;
    FillsWriter::write_all(&run_dir.join("fills.csv"), &result.rows)?;
    fs::write(run_dir.join("metrics.json"), metrics_to_json(&result.metrics)?)
        .context("failed to write metrics.json")?;
    if !result.latency_samples.is_empty() {
        LatencySamplesWriter::write_all(
            &run_dir.join("latency_samples.csv"),
            &result.latency_samples,
        )?;
    }

    info!(
        run_id = %run_id,
        fills = result.metrics.fills_total,
        rejects = result.metrics.rejects_total,
        net_total = result.metrics.net_total,
        out = %run_dir.display(),
        "run written"
    );
    Ok(())
}

fn build_strategies(cli: &Cli) -> Vec<Box<dyn Strategy>> {
    let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
    if cli.no_actions {
        return strategies;
    }
    if cli.demo_only {
        strategies.push(Box::new(DemoTaker::new(
            cli.demo_notional,
            cli.demo_interval_ms,
            cli.demo_max,
        )));
    } else {
        strategies.push(Box::new(ThresholdStrategy::default()));
    }
    if cli.maker_demo {
        strategies.push(Box::new(DemoMaker::new(
            cli.maker_notional,
            cli.maker_interval_ms,
            cli.maker_max,
        )));
    }
    strategies
}
