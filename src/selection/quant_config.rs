// =============================================================================
// Selector/sizer configuration (C8/C9)
// =============================================================================
//
// The source's `QuantConfig` is a thread-safe lazy singleton
// (`get_quant_config()`/`reset_quant_config()`) built at first import —
// exactly the pattern spec.md §9 calls out for re-architecture. Here it's
// an explicit, cheaply-`Clone`-able struct built with `Default` and passed
// down to the selector and sizer rather than reached for through a global.
// =============================================================================

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
    HighVol,
}

impl MarketRegime {
    pub fn key(self) -> &'static str {
        match self {
            MarketRegime::Bull => "bull",
            MarketRegime::Bear => "bear",
            MarketRegime::Sideways => "sideways",
            MarketRegime::HighVol => "high_vol",
        }
    }

    /// Classify a 20-day market return into a regime (spec.md §4.8 stage 1).
    pub fn from_market_return(return_20d: f64) -> Self {
        if return_20d > 0.05 {
            MarketRegime::Bull
        } else if return_20d < -0.05 {
            MarketRegime::Bear
        } else {
            MarketRegime::Sideways
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LiquidityFilter {
    pub min_trading_value: f64,
    pub min_market_cap: f64,
    pub min_price: f64,
    pub min_volume: u64,
}

impl Default for LiquidityFilter {
    fn default() -> Self {
        Self {
            min_trading_value: 500_000_000.0,
            min_market_cap: 50_000_000_000.0,
            min_price: 1000.0,
            min_volume: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MomentumConfig {
    pub return_period: usize,
    pub volume_short_period: usize,
    pub volume_long_period: usize,
    pub relative_return_weight: f64,
    pub volume_surge_weight: f64,
    pub price_strength_weight: f64,
    pub top_percentile: f64,
    pub max_stocks: usize,
    pub sector_limit: usize,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            return_period: 20,
            volume_short_period: 5,
            volume_long_period: 20,
            relative_return_weight: 0.50,
            volume_surge_weight: 0.30,
            price_strength_weight: 0.20,
            top_percentile: 0.10,
            max_stocks: 15,
            sector_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PositionSizingConfig {
    pub target_daily_vol: f64,
    pub max_portfolio_vol: f64,
    pub max_position_pct: f64,
    pub min_position_pct: f64,
    pub atr_period: usize,
    pub stop_loss_atr: f64,
    pub take_profit_atr: f64,
    pub use_trailing_stop: bool,
    pub trailing_activation_pct: f64,
    pub trailing_atr: f64,
}

impl Default for PositionSizingConfig {
    fn default() -> Self {
        Self {
            target_daily_vol: 0.02,
            max_portfolio_vol: 0.15,
            max_position_pct: 0.10,
            min_position_pct: 0.03,
            atr_period: 14,
            stop_loss_atr: 2.0,
            take_profit_atr: 3.0,
            use_trailing_stop: true,
            trailing_activation_pct: 0.03,
            trailing_atr: 1.5,
        }
    }
}

/// Per-regime overrides applied on top of [`MomentumConfig`]/[`PositionSizingConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RegimeAdjustment {
    pub max_stocks: usize,
    pub max_position_pct: f64,
    pub stop_loss_atr: f64,
}

#[derive(Debug, Clone)]
pub struct RegimeConfig {
    pub bull_threshold: f64,
    pub bear_threshold: f64,
    pub adjustments: HashMap<&'static str, RegimeAdjustment>,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        let mut adjustments = HashMap::new();
        adjustments.insert("bull", RegimeAdjustment { max_stocks: 20, max_position_pct: 0.12, stop_loss_atr: 2.5 });
        adjustments.insert("bear", RegimeAdjustment { max_stocks: 8, max_position_pct: 0.06, stop_loss_atr: 1.5 });
        adjustments.insert("sideways", RegimeAdjustment { max_stocks: 15, max_position_pct: 0.10, stop_loss_atr: 2.0 });
        adjustments.insert("high_vol", RegimeAdjustment { max_stocks: 10, max_position_pct: 0.05, stop_loss_atr: 3.0 });

        Self {
            bull_threshold: 0.05,
            bear_threshold: -0.05,
            adjustments,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuantConfig {
    pub liquidity: LiquidityFilter,
    pub momentum: MomentumConfig,
    pub position_sizing: PositionSizingConfig,
    pub regime: RegimeConfig,
}

impl QuantConfig {
    /// Regime-adjusted `(max_stocks, max_position_pct, stop_loss_atr)` for
    /// the given regime, falling back to the base config when no override
    /// is registered for it.
    pub fn adjusted_for(&self, regime: MarketRegime) -> RegimeAdjustment {
        self.regime
            .adjustments
            .get(regime.key())
            .copied()
            .unwrap_or(RegimeAdjustment {
                max_stocks: self.momentum.max_stocks,
                max_position_pct: self.position_sizing.max_position_pct,
                stop_loss_atr: self.position_sizing.stop_loss_atr,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_classification_matches_thresholds() {
        assert_eq!(MarketRegime::from_market_return(0.06), MarketRegime::Bull);
        assert_eq!(MarketRegime::from_market_return(-0.06), MarketRegime::Bear);
        assert_eq!(MarketRegime::from_market_return(0.0), MarketRegime::Sideways);
    }

    #[test]
    fn bull_regime_loosens_position_cap_and_sharpens_stop() {
        let config = QuantConfig::default();
        let adj = config.adjusted_for(MarketRegime::Bull);
        assert_eq!(adj.max_stocks, 20);
        assert!((adj.max_position_pct - 0.12).abs() < 1e-9);
        assert!((adj.stop_loss_atr - 2.5).abs() < 1e-9);
    }

    #[test]
    fn bear_regime_tightens_everything() {
        let config = QuantConfig::default();
        let adj = config.adjusted_for(MarketRegime::Bear);
        assert_eq!(adj.max_stocks, 8);
        assert!(adj.max_position_pct < config.position_sizing.max_position_pct);
    }
}
