// =============================================================================
// Stochastic Oscillator
// =============================================================================
//
// fast_k[i] = 100 * (close[i] - min(low, k_period)) / (max(high, k_period) - min(low, k_period))
// slow_k    = SMA(fast_k, smooth_k)
// slow_d    = SMA(slow_k, d_period)
// =============================================================================

use crate::indicators::ma::calculate_sma;
use crate::types::OhlcvBar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticPoint {
    pub slow_k: f64,
    pub slow_d: f64,
}

pub fn calculate_stochastic(bars: &[OhlcvBar]) -> Vec<StochasticPoint> {
    calculate_stochastic_with(bars, 14, 3, 3)
}

pub fn calculate_stochastic_with(
    bars: &[OhlcvBar],
    k_period: usize,
    d_period: usize,
    smooth_k: usize,
) -> Vec<StochasticPoint> {
    if k_period == 0 || d_period == 0 || smooth_k == 0 || bars.len() < k_period {
        return Vec::new();
    }

    let fast_k: Vec<f64> = bars
        .windows(k_period)
        .map(|w| {
            let lowest = w.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let highest = w.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let range = highest - lowest;
            let close = w.last().unwrap().close;
            if range == 0.0 {
                50.0
            } else {
                100.0 * (close - lowest) / range
            }
        })
        .collect();

    let slow_k = calculate_sma(&fast_k, smooth_k);
    let slow_d = calculate_sma(&slow_k, d_period);
    if slow_d.is_empty() {
        return Vec::new();
    }

    let k_offset = slow_k.len() - slow_d.len();
    slow_k[k_offset..]
        .iter()
        .zip(slow_d.iter())
        .map(|(&k, &d)| StochasticPoint { slow_k: k, slow_d: d })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, high: f64, low: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn insufficient_bars_returns_empty() {
        let bars = vec![bar(1, 105.0, 95.0, 100.0); 5];
        assert!(calculate_stochastic(&bars).is_empty());
    }

    #[test]
    fn close_at_high_pushes_k_toward_100() {
        let bars: Vec<OhlcvBar> = (1..=20)
            .map(|d| bar(d, 110.0, 90.0, 110.0))
            .collect();
        let series = calculate_stochastic(&bars);
        assert!(!series.is_empty());
        for p in &series {
            assert!(p.slow_k > 95.0, "expected slow_k near 100, got {}", p.slow_k);
        }
    }

    #[test]
    fn close_at_low_pushes_k_toward_zero() {
        let bars: Vec<OhlcvBar> = (1..=20)
            .map(|d| bar(d, 110.0, 90.0, 90.0))
            .collect();
        let series = calculate_stochastic(&bars);
        assert!(!series.is_empty());
        for p in &series {
            assert!(p.slow_k < 5.0, "expected slow_k near 0, got {}", p.slow_k);
        }
    }

    #[test]
    fn values_stay_within_bounds() {
        let bars: Vec<OhlcvBar> = (1..=30)
            .map(|d| bar(d, 100.0 + (d as f64 * 1.3).sin() * 10.0 + 5.0, 100.0 - (d as f64 * 1.3).sin().abs() * 10.0, 100.0 + (d as f64).cos()))
            .collect();
        let series = calculate_stochastic(&bars);
        for p in &series {
            assert!((0.0..=100.0).contains(&p.slow_k));
            assert!((0.0..=100.0).contains(&p.slow_d));
        }
    }
}
