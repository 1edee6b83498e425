// =============================================================================
// Position Sizer (C9)
// =============================================================================
//
// ATR-based risk-equalization sizing: every name gets the same target daily
// volatility contribution, so the volatile ones get smaller weights and the
// quiet ones get larger ones. Grounded on the original `PositionSizer`
// (`calculate_position`/`calculate_portfolio_positions`/
// `calculate_trailing_stop`), restructured as plain functions over
// `QuantConfig` rather than a class holding a lazily-loaded API client.
// =============================================================================

use crate::indicators::atr::calculate_atr;
use crate::selection::quant_config::{MarketRegime, QuantConfig};
use crate::types::OhlcvBar;

#[derive(Debug, Clone, Copy)]
pub struct PositionSize {
    pub weight: f64,
    pub amount: f64,
    pub shares: u64,
    pub stop_loss: f64,
    pub target_price: f64,
    pub expected_return: f64,
    pub atr_value: f64,
    pub daily_volatility: f64,
    pub risk_amount: f64,
    pub risk_reward_ratio: f64,
}

/// Size a single position from its ATR(14) daily bars. Falls back to a
/// conservative default (5% weight, -3%/+5% stop/target) when fewer than
/// `atr_period` bars are available — spec.md §4.9 step 1.
pub fn size_position(
    config: &QuantConfig,
    current_price: f64,
    total_capital: f64,
    bars: Option<&[OhlcvBar]>,
    regime: MarketRegime,
) -> PositionSize {
    let ps = &config.position_sizing;

    let atr = bars.and_then(|b| calculate_atr(b, ps.atr_period));
    let Some(atr) = atr.filter(|a| *a > 0.0) else {
        return default_position(current_price, total_capital);
    };

    let daily_vol = atr / current_price;
    let raw_weight = if daily_vol > 0.0 { ps.target_daily_vol / daily_vol } else { 0.05 };

    let adjusted = config.adjusted_for(regime);
    let weight = raw_weight.clamp(ps.min_position_pct, ps.max_position_pct).min(adjusted.max_position_pct);

    let amount = total_capital * weight;
    let shares = if current_price > 0.0 { (amount / current_price).floor() as u64 } else { 0 };
    let actual_amount = shares as f64 * current_price;
    let actual_weight = if total_capital > 0.0 { actual_amount / total_capital } else { 0.0 };

    let stop_loss_atr = adjusted.stop_loss_atr;
    let stop_loss = current_price - atr * stop_loss_atr;
    let target_price = current_price + atr * ps.take_profit_atr;

    let expected_return = (target_price / current_price - 1.0) * 100.0;
    let risk_amount = (current_price - stop_loss) * shares as f64;
    let risk_reward_ratio = ps.take_profit_atr / stop_loss_atr;

    PositionSize {
        weight: actual_weight,
        amount: actual_amount,
        shares,
        stop_loss,
        target_price,
        expected_return,
        atr_value: atr,
        daily_volatility: daily_vol * 100.0,
        risk_amount,
        risk_reward_ratio,
    }
}

fn default_position(current_price: f64, total_capital: f64) -> PositionSize {
    let weight = 0.05;
    let amount = total_capital * weight;
    let shares = if current_price > 0.0 { (amount / current_price).floor() as u64 } else { 0 };
    let stop_loss = current_price * 0.97;
    let target_price = current_price * 1.05;
    let actual_amount = shares as f64 * current_price;

    PositionSize {
        weight,
        amount: actual_amount,
        shares,
        stop_loss,
        target_price,
        expected_return: 5.0,
        atr_value: 0.0,
        daily_volatility: 2.0,
        risk_amount: (current_price - stop_loss) * shares as f64,
        risk_reward_ratio: 1.67,
    }
}

/// Trailing stop price once unrealized return clears `trailing_activation_pct`;
/// `None` while the position hasn't earned activation yet.
pub fn trailing_stop(config: &QuantConfig, entry_price: f64, current_price: f64, highest_price: f64, atr: f64) -> Option<f64> {
    let ps = &config.position_sizing;
    if !ps.use_trailing_stop {
        return None;
    }
    let current_return = current_price / entry_price - 1.0;
    if current_return < ps.trailing_activation_pct {
        return None;
    }
    Some(highest_price - atr * ps.trailing_atr)
}

/// Tighten a stop as unrealized profit climbs through fixed tiers, an
/// independent ratchet alongside [`trailing_stop`] — grounded on the
/// original sizer's `adjust_stop_loss`. Below the 3% tier the current stop
/// is returned unchanged; callers still route the result through
/// `Position::ratchet_stop` so the stop never actually moves down.
pub fn adjust_stop_loss(current_stop: f64, current_price: f64, atr: f64, profit_pct: f64) -> f64 {
    if profit_pct >= 0.08 {
        current_price - atr
    } else if profit_pct >= 0.05 {
        current_price - atr * 1.5
    } else if profit_pct >= 0.03 {
        current_price - atr * 2.0
    } else {
        current_stop
    }
}

/// Scale every weight down by `0.95 / Σweights` (keeping a 5% cash buffer)
/// when the unscaled total exceeds 1.0, re-quantizing shares at each name's
/// implied per-share price. Leaves the slice untouched when already ≤ 1.0.
pub fn normalize_portfolio_weights(positions: &mut [PositionSize], total_capital: f64) {
    let total_weight: f64 = positions.iter().map(|p| p.weight).sum();
    if total_weight <= 1.0 {
        return;
    }

    let scale = 0.95 / total_weight;
    for p in positions.iter_mut() {
        let share_price = if p.shares > 0 { p.amount / p.shares as f64 } else { p.stop_loss };
        let new_weight = p.weight * scale;
        let new_amount = total_capital * new_weight;
        let new_shares = if share_price > 0.0 { (new_amount / share_price).floor() as u64 } else { p.shares };

        p.weight = new_weight;
        p.amount = new_amount;
        p.shares = new_shares;
        p.risk_amount *= scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars_with_atr(n: usize, spread: f64) -> Vec<OhlcvBar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.05;
                OhlcvBar {
                    date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                    open: base,
                    high: base + spread,
                    low: base - spread,
                    close: base,
                    volume: 1000,
                }
            })
            .collect()
    }

    #[test]
    fn falls_back_to_default_position_without_enough_bars() {
        let config = QuantConfig::default();
        let size = size_position(&config, 10_000.0, 1_000_000.0, Some(&bars_with_atr(5, 1.0)), MarketRegime::Sideways);
        assert!((size.weight - 0.05).abs() < 1e-9);
        assert!((size.expected_return - 5.0).abs() < 1e-9);
    }

    #[test]
    fn weight_is_clamped_between_min_and_max() {
        let config = QuantConfig::default();
        // Huge ATR spread -> tiny raw_weight, clamped up to min_position_pct.
        let size = size_position(&config, 10_000.0, 1_000_000.0, Some(&bars_with_atr(20, 500.0)), MarketRegime::Sideways);
        assert!(size.weight >= config.position_sizing.min_position_pct - 1e-9);
        assert!(size.weight <= config.position_sizing.max_position_pct + 1e-9);
    }

    #[test]
    fn trailing_stop_inactive_below_activation_threshold() {
        let config = QuantConfig::default();
        assert_eq!(trailing_stop(&config, 10_000.0, 10_100.0, 10_100.0, 200.0), None);
    }

    #[test]
    fn trailing_stop_activates_past_threshold() {
        let config = QuantConfig::default();
        let stop = trailing_stop(&config, 10_000.0, 10_500.0, 10_500.0, 200.0);
        assert_eq!(stop, Some(10_500.0 - 200.0 * config.position_sizing.trailing_atr));
    }

    #[test]
    fn normalization_scales_down_to_a_ninety_five_percent_total() {
        let mut positions = vec![
            PositionSize { weight: 0.40, amount: 4_000_000.0, shares: 400, stop_loss: 9_700.0, target_price: 11_000.0, expected_return: 10.0, atr_value: 200.0, daily_volatility: 2.0, risk_amount: 120_000.0, risk_reward_ratio: 1.5 },
            PositionSize { weight: 0.35, amount: 3_500_000.0, shares: 350, stop_loss: 9_700.0, target_price: 11_000.0, expected_return: 10.0, atr_value: 200.0, daily_volatility: 2.0, risk_amount: 105_000.0, risk_reward_ratio: 1.5 },
            PositionSize { weight: 0.30, amount: 3_000_000.0, shares: 300, stop_loss: 9_700.0, target_price: 11_000.0, expected_return: 10.0, atr_value: 200.0, daily_volatility: 2.0, risk_amount: 90_000.0, risk_reward_ratio: 1.5 },
        ];
        normalize_portfolio_weights(&mut positions, 10_000_000.0);
        let total: f64 = positions.iter().map(|p| p.weight).sum();
        assert!(total <= 0.95 + 1e-6, "expected total <= 0.95, got {total}");
        assert!((positions[0].weight - 0.40 * 0.95 / 1.05).abs() < 1e-6);
    }

    #[test]
    fn adjust_stop_loss_is_unchanged_below_the_three_percent_tier() {
        assert_eq!(adjust_stop_loss(9_700.0, 10_200.0, 200.0, 0.02), 9_700.0);
    }

    #[test]
    fn adjust_stop_loss_tightens_through_each_profit_tier() {
        assert_eq!(adjust_stop_loss(9_700.0, 10_300.0, 200.0, 0.03), 10_300.0 - 400.0);
        assert_eq!(adjust_stop_loss(9_700.0, 10_500.0, 200.0, 0.05), 10_500.0 - 300.0);
        assert_eq!(adjust_stop_loss(9_700.0, 10_800.0, 200.0, 0.08), 10_800.0 - 200.0);
    }

    #[test]
    fn normalization_is_a_noop_under_full_allocation() {
        let mut positions = vec![PositionSize { weight: 0.5, amount: 1.0, shares: 1, stop_loss: 1.0, target_price: 1.0, expected_return: 1.0, atr_value: 1.0, daily_volatility: 1.0, risk_amount: 1.0, risk_reward_ratio: 1.0 }];
        normalize_portfolio_weights(&mut positions, 1_000_000.0);
        assert!((positions[0].weight - 0.5).abs() < 1e-9);
    }
}
