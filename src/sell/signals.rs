// =============================================================================
// Sell signal evaluation (C10)
// =============================================================================
//
// Pure per-position signal checks, grounded on the original `SellEngine`'s
// `_check_*` strategy methods. Each check takes a `Position` snapshot plus
// whatever indicator inputs it needs and returns `Some(SellSignal)` when
// triggered. The engine in `sell::engine` runs the full set and ranks the
// results; nothing here mutates state.
// =============================================================================

use crate::types::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellSignalType {
    StopLoss,
    TrailingStop,
    TakeProfit,
    RsiOverbought,
    BollingerReversal,
    MacdBearish,
    TimeBased,
    MarketCondition,
}

#[derive(Debug, Clone)]
pub struct SellSignal {
    pub signal_type: SellSignalType,
    pub signal_strength: f64,
    pub confidence: f64,
    pub current_price: f64,
    pub current_return: f64,
    pub target_price: Option<f64>,
    pub suggested_ratio: f64,
    pub reason: String,
}

impl SellSignal {
    /// Urgent signals bypass the strength/confidence gate and execute at full
    /// quantity regardless of strength — spec.md §4.10's action-selection policy.
    pub fn is_urgent(&self) -> bool {
        matches!(self.signal_type, SellSignalType::StopLoss | SellSignalType::TrailingStop)
    }

    /// Whether a non-urgent, non-take-profit signal clears the execution gate.
    pub fn passes_execution_gate(&self) -> bool {
        self.is_urgent() || matches!(self.signal_type, SellSignalType::TakeProfit) || (self.signal_strength >= 0.3 && self.confidence >= 0.6)
    }
}

#[derive(Debug, Clone)]
pub struct TakeProfitLevels {
    pub returns: Vec<f64>,
    pub ratios: Vec<f64>,
}

impl Default for TakeProfitLevels {
    fn default() -> Self {
        Self { returns: vec![0.10, 0.15, 0.20], ratios: vec![0.3, 0.3, 0.4] }
    }
}

#[derive(Debug, Clone)]
pub struct SellSignalConfig {
    pub take_profit: TakeProfitLevels,
    pub rsi_overbought_threshold: f64,
    pub max_hold_days: i64,
}

impl Default for SellSignalConfig {
    fn default() -> Self {
        Self { take_profit: TakeProfitLevels::default(), rsi_overbought_threshold: 70.0, max_hold_days: 10 }
    }
}

/// Extra indicator/market inputs checked alongside position state. A field
/// left `None` means that signal is skipped this tick (no data, no trigger).
#[derive(Debug, Clone, Default)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub bollinger_position: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub hold_days: Option<i64>,
    pub orderbook_imbalance: Option<f64>,
    pub foreign_net_selling: Option<bool>,
}

fn check_stop_loss(position: &Position) -> Option<SellSignal> {
    if position.current_price <= position.stop_loss_price {
        Some(SellSignal {
            signal_type: SellSignalType::StopLoss,
            signal_strength: 1.0,
            confidence: 0.95,
            current_price: position.current_price,
            current_return: position.current_return(),
            target_price: Some(position.stop_loss_price),
            suggested_ratio: 1.0,
            reason: format!("stop loss: {:.1}% loss", position.current_return() * 100.0),
        })
    } else {
        None
    }
}

fn check_trailing_stop(position: &Position) -> Option<SellSignal> {
    let current_return = position.current_return();
    if position.current_price <= position.trailing_stop_price && current_return > 0.0 {
        Some(SellSignal {
            signal_type: SellSignalType::TrailingStop,
            signal_strength: 0.9,
            confidence: 0.9,
            current_price: position.current_price,
            current_return,
            target_price: Some(position.trailing_stop_price),
            suggested_ratio: 1.0,
            reason: format!("trailing stop: protecting {:.1}% gain", current_return * 100.0),
        })
    } else {
        None
    }
}

fn check_take_profit(position: &Position, config: &SellSignalConfig) -> Option<SellSignal> {
    let current_return = position.current_return();
    for (i, &target_return) in config.take_profit.returns.iter().enumerate() {
        if current_return >= target_return {
            let ratio = config.take_profit.ratios.get(i).copied().unwrap_or(1.0);
            return Some(SellSignal {
                signal_type: SellSignalType::TakeProfit,
                signal_strength: 0.8,
                confidence: 0.85,
                current_price: position.current_price,
                current_return,
                target_price: Some(position.entry_price * (1.0 + target_return)),
                suggested_ratio: ratio,
                reason: format!("take profit: {:.1}% (partial {:.0}%)", current_return * 100.0, ratio * 100.0),
            });
        }
    }
    None
}

fn check_rsi_overbought(position: &Position, rsi: f64, config: &SellSignalConfig) -> Option<SellSignal> {
    if rsi >= config.rsi_overbought_threshold {
        let strength = (0.6 * ((rsi - 70.0) / 30.0).min(1.0)).max(0.0);
        Some(SellSignal {
            signal_type: SellSignalType::RsiOverbought,
            signal_strength: strength,
            confidence: 0.7,
            current_price: position.current_price,
            current_return: position.current_return(),
            target_price: None,
            suggested_ratio: strength.clamp(0.3, 0.8),
            reason: format!("RSI overbought: {rsi:.1}"),
        })
    } else {
        None
    }
}

fn check_bollinger_reversal(position: &Position, bb_position: f64, bb_upper: f64) -> Option<SellSignal> {
    if bb_position >= 0.8 && position.current_price < bb_upper {
        let strength = bb_position * 0.7;
        Some(SellSignal {
            signal_type: SellSignalType::BollingerReversal,
            signal_strength: strength,
            confidence: 0.6,
            current_price: position.current_price,
            current_return: position.current_return(),
            target_price: None,
            suggested_ratio: strength.clamp(0.3, 0.8),
            reason: "bollinger reversal: upper band touch then fade".to_string(),
        })
    } else {
        None
    }
}

fn check_macd_bearish(position: &Position, macd: f64, macd_signal: f64, histogram: f64) -> Option<SellSignal> {
    if macd < macd_signal && histogram < 0.0 {
        let strength = (0.6 * histogram.abs()).min(0.8);
        Some(SellSignal {
            signal_type: SellSignalType::MacdBearish,
            signal_strength: strength,
            confidence: 0.65,
            current_price: position.current_price,
            current_return: position.current_return(),
            target_price: None,
            suggested_ratio: strength.clamp(0.3, 0.8),
            reason: format!("MACD bearish cross: histogram {histogram:.3}"),
        })
    } else {
        None
    }
}

fn check_time_based(position: &Position, hold_days: i64, config: &SellSignalConfig) -> Option<SellSignal> {
    if hold_days >= config.max_hold_days {
        let strength = 0.5 * (hold_days as f64 / config.max_hold_days as f64).min(1.0);
        Some(SellSignal {
            signal_type: SellSignalType::TimeBased,
            signal_strength: strength,
            confidence: 0.5,
            current_price: position.current_price,
            current_return: position.current_return(),
            target_price: None,
            suggested_ratio: 0.25,
            reason: format!("holding period exceeded: {hold_days}d (max {}d)", config.max_hold_days),
        })
    } else {
        None
    }
}

fn check_market_condition(position: &Position, imbalance: Option<f64>, foreign_net_selling: Option<bool>) -> Option<SellSignal> {
    let imbalance_trigger = imbalance.is_some_and(|v| v > 0.2);
    let foreign_trigger = foreign_net_selling.unwrap_or(false);
    if !imbalance_trigger && !foreign_trigger {
        return None;
    }

    let mut reasons = Vec::new();
    if imbalance_trigger {
        reasons.push(format!("orderbook imbalance {:.2}", imbalance.unwrap()));
    }
    if foreign_trigger {
        reasons.push("foreign net selling".to_string());
    }

    Some(SellSignal {
        signal_type: SellSignalType::MarketCondition,
        signal_strength: 0.6,
        confidence: 0.6,
        current_price: position.current_price,
        current_return: position.current_return(),
        target_price: None,
        suggested_ratio: 0.5,
        reason: reasons.join(", "),
    })
}

/// Evaluate every signal type against `position`, sorted by `signal_strength`
/// descending (spec.md §4.10). All eight checks always run; a missing
/// indicator input just skips that one check rather than failing the batch.
pub fn evaluate(position: &Position, indicators: &IndicatorSnapshot, config: &SellSignalConfig) -> Vec<SellSignal> {
    let mut signals = Vec::new();

    signals.extend(check_stop_loss(position));
    signals.extend(check_trailing_stop(position));
    signals.extend(check_take_profit(position, config));
    if let Some(rsi) = indicators.rsi {
        signals.extend(check_rsi_overbought(position, rsi, config));
    }
    if let (Some(bb_pos), Some(bb_upper)) = (indicators.bollinger_position, indicators.bollinger_upper) {
        signals.extend(check_bollinger_reversal(position, bb_pos, bb_upper));
    }
    if let (Some(macd), Some(macd_signal), Some(hist)) = (indicators.macd, indicators.macd_signal, indicators.macd_histogram) {
        signals.extend(check_macd_bearish(position, macd, macd_signal, hist));
    }
    if let Some(hold_days) = indicators.hold_days {
        signals.extend(check_time_based(position, hold_days, config));
    }
    signals.extend(check_market_condition(position, indicators.orderbook_imbalance, indicators.foreign_net_selling));

    signals.sort_by(|a, b| b.signal_strength.partial_cmp(&a.signal_strength).unwrap_or(std::cmp::Ordering::Equal));
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(entry: f64, price: f64, stop: f64, trailing: f64) -> Position {
        let mut p = Position::new("005930", "Samsung", entry, Utc::now(), 10, stop, entry * 1.10);
        p.trailing_stop_price = trailing;
        p.current_price = price;
        p
    }

    #[test]
    fn stop_loss_triggers_at_or_below_threshold() {
        let p = position(10_000.0, 9_700.0, 9_700.0, 9_700.0);
        let signals = evaluate(&p, &IndicatorSnapshot::default(), &SellSignalConfig::default());
        assert!(signals.iter().any(|s| s.signal_type == SellSignalType::StopLoss));
        assert_eq!(signals[0].signal_type, SellSignalType::StopLoss, "strongest signal sorts first");
    }

    #[test]
    fn trailing_stop_requires_positive_return() {
        let mut p = position(10_000.0, 9_000.0, 8_500.0, 9_500.0);
        p.current_price = 9_400.0;
        // current_return negative here, trailing stop must not fire.
        let signals = evaluate(&p, &IndicatorSnapshot::default(), &SellSignalConfig::default());
        assert!(!signals.iter().any(|s| s.signal_type == SellSignalType::TrailingStop));
    }

    #[test]
    fn take_profit_picks_smallest_matching_level() {
        let p = position(10_000.0, 11_600.0, 9_500.0, 9_500.0);
        let signals = evaluate(&p, &IndicatorSnapshot::default(), &SellSignalConfig::default());
        let tp = signals.iter().find(|s| s.signal_type == SellSignalType::TakeProfit).unwrap();
        assert!((tp.suggested_ratio - 0.3).abs() < 1e-9, "first level (10%) should match before 15%/20%");
    }

    #[test]
    fn rsi_overbought_scales_with_extension_past_70() {
        let p = position(10_000.0, 10_200.0, 9_500.0, 9_500.0);
        let mut indicators = IndicatorSnapshot::default();
        indicators.rsi = Some(100.0);
        let signals = evaluate(&p, &indicators, &SellSignalConfig::default());
        let rsi_signal = signals.iter().find(|s| s.signal_type == SellSignalType::RsiOverbought).unwrap();
        assert!((rsi_signal.signal_strength - 0.6).abs() < 1e-9);
    }

    #[test]
    fn urgent_signals_bypass_the_gate() {
        let stop = SellSignal {
            signal_type: SellSignalType::StopLoss,
            signal_strength: 1.0,
            confidence: 0.95,
            current_price: 1.0,
            current_return: -0.03,
            target_price: None,
            suggested_ratio: 1.0,
            reason: String::new(),
        };
        assert!(stop.is_urgent());
        assert!(stop.passes_execution_gate());
    }

    #[test]
    fn weak_non_urgent_signal_fails_the_gate() {
        let weak = SellSignal {
            signal_type: SellSignalType::MacdBearish,
            signal_strength: 0.1,
            confidence: 0.65,
            current_price: 1.0,
            current_return: 0.0,
            target_price: None,
            suggested_ratio: 0.3,
            reason: String::new(),
        };
        assert!(!weak.passes_execution_gate());
    }

    #[test]
    fn no_signals_fire_on_a_flat_quiet_position() {
        let p = position(10_000.0, 10_050.0, 9_500.0, 9_500.0);
        let signals = evaluate(&p, &IndicatorSnapshot::default(), &SellSignalConfig::default());
        assert!(signals.is_empty());
    }
}
