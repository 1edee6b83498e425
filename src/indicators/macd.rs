// =============================================================================
// MACD (Moving Average Convergence Divergence)
// =============================================================================
//
// macd   = EMA(12) - EMA(26)
// signal = EMA(9) of the macd series
// hist   = macd - signal
//
// Built on [`crate::indicators::ema::calculate_ema`]; the two EMA series
// start at different offsets (26-period needs 26 closes, 12-period needs
// only 12), so they're aligned to the tail before subtracting.
// =============================================================================

use crate::indicators::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the MACD series with the standard (12, 26, 9) parameters.
/// Returns an empty vec when there aren't enough closes to seed both EMAs
/// plus the 9-period signal smoothing.
pub fn calculate_macd(closes: &[f64]) -> Vec<MacdPoint> {
    calculate_macd_with(closes, 12, 26, 9)
}

pub fn calculate_macd_with(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Vec<MacdPoint> {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || fast_period >= slow_period {
        return Vec::new();
    }

    let ema_fast = calculate_ema(closes, fast_period);
    let ema_slow = calculate_ema(closes, slow_period);
    if ema_fast.is_empty() || ema_slow.is_empty() {
        return Vec::new();
    }

    // ema_fast starts at index (fast_period - 1) of `closes`, ema_slow at
    // (slow_period - 1); align both to the slow series' start.
    let offset = slow_period - fast_period;
    let macd_line: Vec<f64> = ema_fast[offset..]
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = calculate_ema(&macd_line, signal_period);
    if signal_line.is_empty() {
        return Vec::new();
    }

    let macd_offset = signal_period - 1;
    macd_line[macd_offset..]
        .iter()
        .zip(signal_line.iter())
        .map(|(&macd, &signal)| MacdPoint {
            macd,
            signal,
            histogram: macd - signal,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_returns_empty() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes).is_empty());
    }

    #[test]
    fn flat_series_has_zero_histogram() {
        let closes = vec![100.0; 60];
        let series = calculate_macd(&closes);
        assert!(!series.is_empty());
        for point in &series {
            assert!(point.macd.abs() < 1e-9);
            assert!(point.histogram.abs() < 1e-9);
        }
    }

    #[test]
    fn steady_uptrend_has_positive_macd() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        let series = calculate_macd(&closes);
        assert!(!series.is_empty());
        assert!(series.last().unwrap().macd > 0.0);
    }

    #[test]
    fn rejects_fast_period_not_less_than_slow() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        assert!(calculate_macd_with(&closes, 26, 12, 9).is_empty());
    }
}
