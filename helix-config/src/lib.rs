//! Layered configuration loading for venue rules, fees, and latency fits.

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, File};
use helix_core::LatencyConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Exchange rules applied when normalizing actions for one symbol.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RulesConfig {
    pub tick_size: f64,
    pub qty_step: f64,
    pub min_qty: f64,
    pub min_notional: f64,
    /// Optional price band in basis points around mid; 0 disables the check.
    #[serde(default)]
    pub price_band_bps: f64,
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.1,
            qty_step: 0.001,
            min_qty: 0.001,
            min_notional: 5.0,
            price_band_bps: 0.0,
            source: default_source(),
        }
    }
}

/// How computed fees are rounded before being charged.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRounding {
    None,
    #[default]
    CeilToCent,
}

impl FeeRounding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CeilToCent => "ceil_to_cent",
        }
    }
}

/// Maker/taker fee schedule for one symbol.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FeeConfig {
    pub maker_bps: f64,
    pub taker_bps: f64,
    pub fee_ccy: String,
    #[serde(default)]
    pub rounding: FeeRounding,
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            maker_bps: 2.0,
            taker_bps: 6.0,
            fee_ccy: "USDT".to_string(),
            rounding: FeeRounding::CeilToCent,
            source: default_source(),
        }
    }
}

fn default_source() -> String {
    "default".to_string()
}

/// Rules and fees resolved for one `(venue, symbol)` pair.
#[derive(Clone, Debug, Default)]
pub struct SymbolConfig {
    pub rules: RulesConfig,
    pub fees: FeeConfig,
}

/// Raw per-symbol block as it appears in the rules file.
#[derive(Debug, Deserialize)]
struct SymbolBlock {
    tick_size: Option<f64>,
    qty_step: Option<f64>,
    min_qty: Option<f64>,
    min_notional: Option<f64>,
    price_band_bps: Option<f64>,
    maker_bps: Option<f64>,
    taker_bps: Option<f64>,
    fee_ccy: Option<String>,
    rounding: Option<FeeRounding>,
}

/// Resolve rules and fees for `venue`/`symbol`.
///
/// The file holds one block per `venue.symbol` pair (TOML or JSON, decided by
/// extension). A missing file or missing block falls back to the built-in
/// defaults with `source = "default"`; a present block overrides field by
/// field and stamps the path as `source`.
pub fn load_symbol_config(
    path: Option<&Path>,
    venue: &str,
    symbol: &str,
) -> Result<SymbolConfig> {
    let mut resolved = SymbolConfig::default();
    let Some(path) = path else {
        return Ok(resolved);
    };
    if !path.exists() {
        warn!(path = %path.display(), "rules config not found; using defaults");
        return Ok(resolved);
    }

    let cfg = Config::builder()
        .add_source(File::from(path))
        .build()
        .with_context(|| format!("failed to load rules config {}", path.display()))?;

    let key = format!("{venue}.{symbol}");
    let block: SymbolBlock = match cfg.get(&key) {
        Ok(block) => block,
        Err(config::ConfigError::NotFound(_)) => {
            warn!(%key, path = %path.display(), "no rules block for symbol; using defaults");
            return Ok(resolved);
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("malformed rules block {key} in {}", path.display()))
        }
    };

    let source = path.display().to_string();
    if let Some(v) = block.tick_size {
        resolved.rules.tick_size = v;
    }
    if let Some(v) = block.qty_step {
        resolved.rules.qty_step = v;
    }
    if let Some(v) = block.min_qty {
        resolved.rules.min_qty = v;
    }
    if let Some(v) = block.min_notional {
        resolved.rules.min_notional = v;
    }
    if let Some(v) = block.price_band_bps {
        resolved.rules.price_band_bps = v;
    }
    if let Some(v) = block.maker_bps {
        resolved.fees.maker_bps = v;
    }
    if let Some(v) = block.taker_bps {
        resolved.fees.taker_bps = v;
    }
    if let Some(v) = block.fee_ccy {
        resolved.fees.fee_ccy = v;
    }
    if let Some(v) = block.rounding {
        resolved.fees.rounding = v;
    }
    resolved.rules.source = source.clone();
    resolved.fees.source = source;
    info!(%key, source = %resolved.rules.source, "resolved venue rules");
    Ok(resolved)
}

/// Shape of the JSON emitted by the latency fitter.
#[derive(Debug, Deserialize)]
struct LatencyFit {
    base_ms: f64,
    jitter_ms: f64,
    tail_ms: f64,
    tail_prob: f64,
    #[allow(dead_code)]
    #[serde(default)]
    n: u64,
}

/// Load a latency fit produced by the offline fitter and stamp its path as
/// the config source.
pub fn load_latency_fit(path: &Path) -> Result<LatencyConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read latency fit {}", path.display()))?;
    let fit: LatencyFit = serde_json::from_str(&raw)
        .with_context(|| format!("malformed latency fit {}", path.display()))?;
    Ok(LatencyConfig {
        base_ms: fit.base_ms,
        jitter_ms: fit.jitter_ms,
        tail_ms: fit.tail_ms,
        tail_prob: fit.tail_prob,
        source: path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn defaults_when_no_file() {
        let cfg = load_symbol_config(None, "BYBIT", "BTCUSDT").unwrap();
        assert_eq!(cfg.rules.tick_size, 0.1);
        assert_eq!(cfg.rules.qty_step, 0.001);
        assert_eq!(cfg.rules.min_qty, 0.001);
        assert_eq!(cfg.rules.min_notional, 5.0);
        assert_eq!(cfg.fees.maker_bps, 2.0);
        assert_eq!(cfg.fees.taker_bps, 6.0);
        assert_eq!(cfg.fees.rounding, FeeRounding::CeilToCent);
        assert_eq!(cfg.rules.source, "default");
    }

    #[test]
    fn defaults_when_block_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "[BYBIT.ETHUSDT]\ntick_size = 0.05\n").unwrap();
        let cfg = load_symbol_config(Some(&path), "BYBIT", "BTCUSDT").unwrap();
        assert_eq!(cfg.rules.source, "default");
        assert_eq!(cfg.rules.tick_size, 0.1);
    }

    #[test]
    fn block_overrides_field_by_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[BYBIT.BTCUSDT]\ntick_size = 0.5\nmin_notional = 10.0\nmaker_bps = 1.0\nrounding = \"none\""
        )
        .unwrap();
        let cfg = load_symbol_config(Some(&path), "BYBIT", "BTCUSDT").unwrap();
        assert_eq!(cfg.rules.tick_size, 0.5);
        assert_eq!(cfg.rules.min_notional, 10.0);
        // Untouched fields keep defaults.
        assert_eq!(cfg.rules.qty_step, 0.001);
        assert_eq!(cfg.fees.maker_bps, 1.0);
        assert_eq!(cfg.fees.taker_bps, 6.0);
        assert_eq!(cfg.fees.rounding, FeeRounding::None);
        assert_eq!(cfg.rules.source, path.display().to_string());
    }

    #[test]
    fn latency_fit_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latency_fit.json");
        std::fs::write(
            &path,
            r#"{"base_ms": 6.5, "jitter_ms": 3.0, "tail_ms": 20.0, "tail_prob": 0.05, "n": 1000}"#,
        )
        .unwrap();
        let cfg = load_latency_fit(&path).unwrap();
        assert_eq!(cfg.base_ms, 6.5);
        assert_eq!(cfg.jitter_ms, 3.0);
        assert_eq!(cfg.tail_ms, 20.0);
        assert_eq!(cfg.tail_prob, 0.05);
        assert_eq!(cfg.source, path.display().to_string());
    }

    #[test]
    fn malformed_latency_fit_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latency_fit.json");
        std::fs::write(&path, "{\"base_ms\": \"oops\"}").unwrap();
        assert!(load_latency_fit(&path).is_err());
    }
}
