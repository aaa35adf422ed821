//! Deterministic per-action latency model.

use serde::{Deserialize, Serialize};

use crate::{fnv1a64, Mt64};

/// Parameters of the base + jitter + tail latency distribution.
///
/// `source` records where the parameters came from (`default`, or the path of
/// a latency-fit file) and is surfaced verbatim in the run metrics.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LatencyConfig {
    pub base_ms: f64,
    pub jitter_ms: f64,
    pub tail_ms: f64,
    pub tail_prob: f64,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "default".to_string()
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            base_ms: 8.0,
            jitter_ms: 4.0,
            tail_ms: 12.0,
            tail_prob: 0.02,
            source: default_source(),
        }
    }
}

/// Latency in milliseconds for one action, fully determined by
/// `(symbol, seq, action_idx)` and the config.
///
/// Two uniform draws are consumed per action: one for the jitter, one for the
/// tail coin flip. Independent of wall clock and of any prior draws.
#[must_use]
pub fn deterministic_latency_ms(
    symbol: &str,
    seq: u64,
    action_idx: u64,
    cfg: &LatencyConfig,
) -> f64 {
    let seed = fnv1a64(&format!("{symbol}#{seq}#{action_idx}"));
    let mut rng = Mt64::new(seed);
    let mut latency = cfg.base_ms + rng.next_f64() * cfg.jitter_ms;
    if rng.next_f64() < cfg.tail_prob {
        latency += cfg.tail_ms;
    }
    latency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LatencyConfig {
        LatencyConfig {
            base_ms: 8.0,
            jitter_ms: 4.0,
            tail_ms: 12.0,
            tail_prob: 0.02,
            source: "default".into(),
        }
    }

    #[test]
    fn known_sample_is_reproduced_exactly() {
        let lat = deterministic_latency_ms("SIM", 1, 42, &cfg());
        assert!((lat - 8.471_027_861_442_069).abs() < 1e-12);
    }

    #[test]
    fn further_pinned_samples() {
        let lat = deterministic_latency_ms("SIM", 7, 0, &cfg());
        assert!((lat - 9.974_863_892_543_821).abs() < 1e-12);
        let lat = deterministic_latency_ms("BTCUSDT", 100, 3, &cfg());
        assert!((lat - 9.477_968_970_056_393).abs() < 1e-12);
    }

    #[test]
    fn latency_is_pure_in_its_inputs() {
        let a = deterministic_latency_ms("SIM", 5, 5, &cfg());
        let b = deterministic_latency_ms("SIM", 5, 5, &cfg());
        assert_eq!(a, b);
        assert_ne!(a, deterministic_latency_ms("SIM", 5, 6, &cfg()));
    }

    #[test]
    fn bounds_without_tail() {
        let mut base_only = cfg();
        base_only.tail_prob = 0.0;
        for idx in 0..200 {
            let lat = deterministic_latency_ms("SIM", 1, idx, &base_only);
            assert!(lat >= 8.0 && lat < 12.0, "latency {lat} out of range");
        }
    }

    #[test]
    fn tail_always_applied_when_certain() {
        let mut tail_always = cfg();
        tail_always.tail_prob = 1.0;
        let lat = deterministic_latency_ms("SIM", 1, 42, &tail_always);
        assert!((lat - (8.471_027_861_442_069 + 12.0)).abs() < 1e-12);
    }
}
