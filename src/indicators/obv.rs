// =============================================================================
// On-Balance Volume (OBV) and divergence classification
// =============================================================================
//
// OBV is a cumulative sum: +volume on an up close, -volume on a down close,
// unchanged on a flat close. Divergence compares the direction OBV moved
// over a lookback window against the direction price moved over the same
// window — a classic confirmation/divergence signal.
// =============================================================================

use crate::types::OhlcvBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    BullishDivergence,
    BearishDivergence,
    Confirming,
    Neutral,
}

/// Cumulative OBV series, one value per bar (the first bar contributes 0).
pub fn calculate_obv(bars: &[OhlcvBar]) -> Vec<f64> {
    if bars.is_empty() {
        return Vec::new();
    }

    let mut obv = Vec::with_capacity(bars.len());
    obv.push(0.0);

    for i in 1..bars.len() {
        let prev = obv[i - 1];
        let delta = match bars[i].close.partial_cmp(&bars[i - 1].close) {
            Some(std::cmp::Ordering::Greater) => bars[i].volume as f64,
            Some(std::cmp::Ordering::Less) => -(bars[i].volume as f64),
            _ => 0.0,
        };
        obv.push(prev + delta);
    }

    obv
}

/// Classify OBV/price divergence over a lookback window of `lookback` bars.
///
/// Returns `None` when fewer than `lookback + 1` bars are available.
pub fn classify_divergence(bars: &[OhlcvBar], lookback: usize) -> Option<Divergence> {
    if lookback == 0 || bars.len() < lookback + 1 {
        return None;
    }

    let obv = calculate_obv(bars);
    let last = bars.len() - 1;
    let start = last - lookback;

    let delta_price = bars[last].close - bars[start].close;
    let delta_obv = obv[last] - obv[start];

    Some(if delta_price > 0.0 && delta_obv < 0.0 {
        Divergence::BearishDivergence
    } else if delta_price < 0.0 && delta_obv > 0.0 {
        Divergence::BullishDivergence
    } else if delta_price != 0.0 && delta_obv != 0.0 {
        Divergence::Confirming
    } else {
        Divergence::Neutral
    })
}
