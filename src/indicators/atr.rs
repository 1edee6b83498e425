// =============================================================================
// Average True Range (ATR)
// =============================================================================
//
// ATR measures market volatility by decomposing the entire range of a bar.
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the EMA of TR with span = period (seeded by the SMA of the first
// `period` TR values, then the standard EMA recursion with
// multiplier = 2 / (period + 1) — same convention as [`crate::indicators::ema`]).
//
// Default period: 14
// =============================================================================

use crate::types::OhlcvBar;

/// Compute the most recent ATR value from a slice of daily bars.
///
/// Returns `None` when:
/// - `period` is zero.
/// - There are fewer than `period + 1` bars (we need `period` TR values,
///   each requiring a previous bar for the True Range calculation).
/// - Any intermediate value is non-finite.
pub fn calculate_atr(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    let series = calculate_atr_series(bars, period);
    series.last().copied()
}

/// Compute the full ATR series, one value per bar starting at index `period`.
pub fn calculate_atr_series(bars: &[OhlcvBar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return Vec::new();
    }

    let mut tr_values: Vec<f64> = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let high = bars[i].high;
        let low = bars[i].low;
        let prev_close = bars[i - 1].close;

        let hl = high - low;
        let hc = (high - prev_close).abs();
        let lc = (low - prev_close).abs();

        tr_values.push(hl.max(hc).max(lc));
    }

    if tr_values.len() < period {
        return Vec::new();
    }

    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(tr_values.len() - period + 1);
    result.push(seed);

    let mut prev_atr = seed;
    for &tr in &tr_values[period..] {
        let atr = tr * multiplier + prev_atr * (1.0 - multiplier);
        if !atr.is_finite() {
            break;
        }
        result.push(atr);
        prev_atr = atr;
    }

    result
}

/// ATR expressed as a percentage of the latest close.
pub fn calculate_atr_pct(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    let atr = calculate_atr(bars, period)?;
    let last_close = bars.last()?.close;
    if last_close == 0.0 {
        return None;
    }
    Some((atr / last_close) * 100.0)
}

/// Convenience function: ATR with the standard 14-period default.
pub fn calculate(bars: &[OhlcvBar]) -> Option<f64> {
    calculate_atr(bars, 14)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, open: f64, high: f64, low: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn atr_period_zero() {
        let bars = vec![bar(1, 100.0, 105.0, 95.0, 102.0); 20];
        assert!(calculate_atr(&bars, 0).is_none());
    }

    #[test]
    fn atr_insufficient_data() {
        let bars = vec![bar(1, 100.0, 105.0, 95.0, 102.0); 10];
        assert!(calculate_atr(&bars, 14).is_none());
    }

    #[test]
    fn atr_exact_minimum_data() {
        let bars = vec![
            bar(1, 100.0, 102.0, 98.0, 101.0),
            bar(2, 101.0, 104.0, 99.0, 103.0),
            bar(3, 103.0, 106.0, 100.0, 105.0),
            bar(4, 105.0, 108.0, 102.0, 107.0),
        ];
        let atr = calculate_atr(&bars, 3);
        assert!(atr.is_some());
        assert!(atr.unwrap() > 0.0);
    }

    #[test]
    fn atr_constant_range_converges_near_the_range() {
        let bars: Vec<OhlcvBar> = (1..=30)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                bar(i, base, base + 5.0, base - 5.0, base)
            })
            .collect();
        let atr = calculate_atr(&bars, 14).unwrap();
        assert!((atr - 10.0).abs() < 1.0, "expected ATR near 10.0, got {atr}");
    }

    #[test]
    fn atr_true_range_uses_prev_close_on_gaps() {
        let bars = vec![
            bar(1, 100.0, 105.0, 95.0, 95.0),
            bar(2, 110.0, 115.0, 108.0, 112.0),
            bar(3, 112.0, 118.0, 110.0, 115.0),
            bar(4, 115.0, 120.0, 113.0, 118.0),
        ];
        let atr = calculate_atr(&bars, 3).unwrap();
        assert!(atr > 7.0, "ATR should reflect the gap, got {atr}");
    }

    #[test]
    fn atr_pct_is_positive_and_finite() {
        let bars: Vec<OhlcvBar> = (1..=30)
            .map(|i| {
                let base = 100.0 + i as f64;
                bar(i, base, base + 3.0, base - 3.0, base + 1.0)
            })
            .collect();
        let pct = calculate_atr_pct(&bars, 14).unwrap();
        assert!(pct > 0.0 && pct.is_finite());
    }

    #[test]
    fn atr_convenience_matches_explicit_period() {
        let bars: Vec<OhlcvBar> = (1..=30)
            .map(|i| {
                let base = 100.0 + i as f64;
                bar(i, base, base + 3.0, base - 3.0, base + 1.0)
            })
            .collect();
        assert_eq!(calculate_atr(&bars, 14), calculate(&bars));
    }

    #[test]
    fn atr_nan_input_returns_none() {
        // Both high and low NaN so every max() comparison in the true-range
        // computation has no finite fallback to return.
        let bars = vec![
            bar(1, 100.0, 105.0, 95.0, 100.0),
            bar(2, 100.0, f64::NAN, f64::NAN, 100.0),
            bar(3, 100.0, 105.0, 95.0, 100.0),
            bar(4, 100.0, 105.0, 95.0, 100.0),
        ];
        assert!(calculate_atr(&bars, 3).is_none());
    }
}
