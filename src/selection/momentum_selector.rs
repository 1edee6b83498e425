// =============================================================================
// Momentum Selector (C8)
// =============================================================================
//
// Five-stage pipeline grounded on the original `MomentumSelector.select_stocks`:
// regime detection -> hard liquidity filter -> momentum scoring -> top-N with
// a per-sector cap -> position sizing. The whole thing is a pure function of
// its inputs; the only hidden state in the original (cached daily charts) is
// pushed up to the caller, which hands in each candidate's bars already
// fetched.
// =============================================================================

use crate::selection::position_sizer::{normalize_portfolio_weights, size_position};
use crate::selection::quant_config::{MarketRegime, QuantConfig};
use crate::types::{OhlcvBar, SelectionResult};

/// A watchlist entry with everything the pipeline needs already resolved:
/// no network or cache access happens inside [`select`].
#[derive(Debug, Clone)]
pub struct Candidate {
    pub code: String,
    pub name: String,
    pub sector: String,
    pub market_cap: f64,
    pub avg_trading_value: f64,
    pub avg_volume: u64,
    pub last_price: f64,
    /// Daily bars, ascending by date, ending at the most recent session.
    pub bars: Vec<OhlcvBar>,
}

#[derive(Debug, Clone, Copy)]
struct Score {
    return_20d: f64,
    relative_return: f64,
    volume_surge: f64,
    price_strength: f64,
    momentum_score: f64,
}

/// Stage 2. `None` fields can't be passed here since [`Candidate`] requires
/// them resolved by the caller (spec.md's "imputed conservatively" step is
/// the caller's job when assembling the candidate from raw broker data).
fn passes_liquidity_filter(candidate: &Candidate, config: &QuantConfig) -> bool {
    let f = &config.liquidity;
    candidate.avg_trading_value >= f.min_trading_value
        && candidate.market_cap >= f.min_market_cap
        && candidate.last_price >= f.min_price
        && candidate.avg_volume >= f.min_volume
}

/// Stage 3. Requires at least 21 bars (20-day lookback plus the prior close
/// for `return_20d`); returns `None` when the candidate's chart is too short.
fn score_candidate(bars: &[OhlcvBar], market_return_20d: f64, config: &QuantConfig) -> Option<Score> {
    let m = &config.momentum;
    let n = bars.len();
    if n < m.return_period + 1 {
        return None;
    }

    let last_close = bars[n - 1].close;
    let close_20_ago = bars[n - 1 - m.return_period].close;
    if close_20_ago == 0.0 {
        return None;
    }
    let return_20d = (last_close / close_20_ago - 1.0) * 100.0;
    let relative_return = return_20d - market_return_20d;

    let window5 = &bars[n - m.volume_short_period..];
    let window20 = &bars[n - m.volume_long_period..];
    let mean5: f64 = window5.iter().map(|b| b.volume as f64).sum::<f64>() / m.volume_short_period as f64;
    let mean20: f64 = window20.iter().map(|b| b.volume as f64).sum::<f64>() / m.volume_long_period as f64;
    let volume_surge = if mean20 > 0.0 { mean5 / mean20 } else { 0.0 };

    let max_high_20 = window20.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let min_low_20 = window20.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let range = max_high_20 - min_low_20;
    let price_strength = if range > 0.0 { (last_close - min_low_20) / range } else { 0.5 };

    let momentum_score = m.relative_return_weight * relative_return
        + m.volume_surge_weight * (20.0 * volume_surge).min(40.0)
        + m.price_strength_weight * 100.0 * price_strength;

    Some(Score { return_20d, relative_return, volume_surge, price_strength, momentum_score })
}

/// Percentile rank of `score` within `all`, ascending, ties counted inclusively.
fn percentile_rank(score: f64, all: &[f64]) -> f64 {
    if all.is_empty() {
        return 0.0;
    }
    let count = all.iter().filter(|&&v| v <= score).count();
    count as f64 / all.len() as f64 * 100.0
}

fn ceil_div(numerator: f64, total: usize) -> usize {
    (numerator * total as f64).ceil().max(1.0) as usize
}

/// Run the full selection pipeline. `market_return_20d` is the 20-day market
/// benchmark return (percent) — spec.md treats this as an external input the
/// caller resolves (possibly from a cached session-level fetch), not
/// something this pure function goes and fetches itself.
pub fn select(
    candidates: &[Candidate],
    total_capital: f64,
    market_return_20d: f64,
    config: &QuantConfig,
) -> Vec<SelectionResult> {
    let regime = MarketRegime::from_market_return(market_return_20d / 100.0);
    let adjusted = config.adjusted_for(regime);

    let mut scored: Vec<(&Candidate, Score)> = candidates
        .iter()
        .filter(|c| passes_liquidity_filter(c, config))
        .filter_map(|c| score_candidate(&c.bars, market_return_20d, config).map(|s| (c, s)))
        .collect();

    if scored.is_empty() {
        return Vec::new();
    }

    let all_scores: Vec<f64> = scored.iter().map(|(_, s)| s.momentum_score).collect();

    scored.sort_by(|(ca, sa), (cb, sb)| {
        sb.momentum_score
            .partial_cmp(&sa.momentum_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ca.code.cmp(&cb.code))
    });

    let pool_size = ceil_div(config.momentum.top_percentile, scored.len()).min(scored.len());
    let pool = &scored[..pool_size];

    let mut sector_counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    let mut accepted: Vec<(&Candidate, Score)> = Vec::new();

    for (candidate, score) in pool {
        if accepted.len() >= adjusted.max_stocks {
            break;
        }
        let count = sector_counts.entry(candidate.sector.as_str()).or_insert(0);
        if *count >= config.momentum.sector_limit {
            continue;
        }
        *count += 1;
        accepted.push((candidate, *score));
    }

    let selection_date = candidates
        .iter()
        .flat_map(|c| c.bars.last().map(|b| b.date))
        .max()
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let mut sizes: Vec<_> = accepted
        .iter()
        .map(|(candidate, _)| size_position(config, candidate.last_price, total_capital, Some(&candidate.bars), regime))
        .collect();

    // Portfolio-level normalization (spec.md §4.9 / Testable Property 7):
    // rescale everyone down together if the accepted set's weights sum past 1.0.
    normalize_portfolio_weights(&mut sizes, total_capital);

    accepted
        .into_iter()
        .zip(sizes)
        .enumerate()
        .map(|(idx, ((candidate, score), size))| {
            let rank = percentile_rank(score.momentum_score, &all_scores);
            let top_pct = (100.0 - rank).max(0.0);

            SelectionResult {
                code: candidate.code.clone(),
                name: candidate.name.clone(),
                selection_date,
                selection_reason: format!(
                    "relative {:+.1}%, volume x{:.1}, top {:.0}%",
                    score.relative_return, score.volume_surge, top_pct
                ),
                momentum_score: score.momentum_score,
                percentile_rank: rank,
                entry_price: candidate.last_price,
                target_price: size.target_price,
                stop_loss: size.stop_loss,
                expected_return: size.expected_return,
                position_weight: size.weight,
                position_amount: size.amount,
                sector: candidate.sector.clone(),
                market_cap: candidate.market_cap,
                priority: idx as u32 + 1,
                signals: signal_tags(&score),
                atr_value: size.atr_value,
                daily_volatility: size.daily_volatility,
            }
        })
        .collect()
}

fn signal_tags(score: &Score) -> Vec<String> {
    let mut tags = Vec::new();
    if score.relative_return > 0.0 {
        tags.push("outperforming_market".to_string());
    }
    if score.volume_surge > 1.5 {
        tags.push("volume_surge".to_string());
    }
    if score.price_strength > 0.8 {
        tags.push("near_52w_high".to_string());
    }
    tags
}
