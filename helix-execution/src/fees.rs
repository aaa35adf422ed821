//! Maker/taker fee computation.

use helix_config::{FeeConfig, FeeRounding};
use helix_core::{Fill, Liquidity};

/// Fee charged for one fill, plus the observed (post-rounding) rate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeeResult {
    pub fee: f64,
    /// Observed fee over notional in basis points; differs from the
    /// configured rate when rounding bites.
    pub fee_bps: f64,
    pub fee_ccy: String,
}

/// Computes fees from the venue schedule.
pub struct FeeModel {
    cfg: FeeConfig,
}

impl FeeModel {
    #[must_use]
    pub fn new(cfg: FeeConfig) -> Self {
        Self { cfg }
    }

    #[must_use]
    pub fn config(&self) -> &FeeConfig {
        &self.cfg
    }

    /// Fee for `fill`; rejected or empty fills cost nothing.
    #[must_use]
    pub fn compute(&self, fill: &Fill) -> FeeResult {
        let mut result = FeeResult {
            fee_ccy: self.cfg.fee_ccy.clone(),
            ..FeeResult::default()
        };
        if !fill.is_filled() || fill.filled_qty <= 0.0 || fill.vwap_price <= 0.0 {
            return result;
        }
        let notional = fill.vwap_price * fill.filled_qty;
        let bps = match fill.liquidity {
            Liquidity::Maker => self.cfg.maker_bps,
            Liquidity::Taker => self.cfg.taker_bps,
        };
        let fee = self.round(notional * bps * 1e-4);
        result.fee = fee;
        result.fee_bps = fee / notional * 1e4;
        result
    }

    fn round(&self, fee: f64) -> f64 {
        match self.cfg.rounding {
            FeeRounding::CeilToCent => (fee * 100.0).ceil() / 100.0,
            FeeRounding::None => fee,
        }
    }
}
