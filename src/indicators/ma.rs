// =============================================================================
// Moving Average — SMA, EMA, WMA under one entry point
// =============================================================================
//
// The engine's consumers (momentum selector, Bollinger, MACD) all want "a
// moving average of some kind" parameterized by a [`MaKind`] rather than
// three unrelated functions; this module is that dispatch point, built on
// top of the standalone [`crate::indicators::ema::calculate_ema`].
// =============================================================================

use crate::indicators::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaKind {
    Sma,
    Ema,
    Wma,
}

/// Dispatch to the moving average series matching `kind`. Returns an empty
/// vec under the same conditions each underlying calculator would: `period
/// == 0` or too few input values.
pub fn calculate_ma(values: &[f64], period: usize, kind: MaKind) -> Vec<f64> {
    match kind {
        MaKind::Sma => calculate_sma(values, period),
        MaKind::Ema => calculate_ema(values, period),
        MaKind::Wma => calculate_wma(values, period),
    }
}

/// Simple moving average: arithmetic mean of each trailing window.
pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Weighted moving average: linear weights `1..=period`, heaviest on the
/// most recent value in each window.
pub fn calculate_wma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let weight_sum = (period * (period + 1)) as f64 / 2.0;

    values
        .windows(period)
        .map(|w| {
            let numerator: f64 = w
                .iter()
                .enumerate()
                .map(|(i, &v)| v * (i + 1) as f64)
                .sum();
            numerator / weight_sum
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_flat_series_equals_the_constant() {
        let values = vec![100.0; 10];
        let series = calculate_sma(&values, 5);
        assert!(series.iter().all(|&v| (v - 100.0).abs() < 1e-9));
    }

    #[test]
    fn sma_too_short_is_empty() {
        assert!(calculate_sma(&[1.0, 2.0], 5).is_empty());
    }

    #[test]
    fn wma_weights_recent_values_more_heavily_than_sma() {
        let values = vec![1.0, 1.0, 1.0, 1.0, 10.0];
        let sma = calculate_sma(&values, 5);
        let wma = calculate_wma(&values, 5);
        assert_eq!(sma.len(), 1);
        assert_eq!(wma.len(), 1);
        assert!(wma[0] > sma[0], "WMA should weight the recent spike more than SMA");
    }

    #[test]
    fn wma_matches_hand_computed_value() {
        // weights 1,2,3 over [10, 20, 30] -> (10*1 + 20*2 + 30*3) / 6 = 140/6
        let values = vec![10.0, 20.0, 30.0];
        let wma = calculate_wma(&values, 3);
        assert_eq!(wma.len(), 1);
        assert!((wma[0] - 140.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn dispatch_matches_direct_call() {
        let values: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        assert_eq!(calculate_ma(&values, 5, MaKind::Sma), calculate_sma(&values, 5));
        assert_eq!(calculate_ma(&values, 5, MaKind::Wma), calculate_wma(&values, 5));
        assert_eq!(calculate_ma(&values, 5, MaKind::Ema), calculate_ema(&values, 5));
    }
}
