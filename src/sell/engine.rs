// =============================================================================
// Sell Engine (C10)
// =============================================================================
//
// Owns the set of open positions and turns [`super::signals::evaluate`]
// output into state transitions plus a structured exit event. Grounded on
// the original `SellEngine.add_position`/`update_position_price`/
// `check_sell_signals`/`execute_sell_order`, restructured so the position
// map lives behind a single mutex (spec.md §5: "Position set — a
// single-writer discipline") instead of being a bare dict any caller can
// mutate.
// =============================================================================

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use crate::sell::signals::{self, IndicatorSnapshot, SellSignal, SellSignalConfig, SellSignalType};
use crate::types::{Position, PositionStatus};

/// Emitted once per executed exit, urgent or gated.
#[derive(Debug, Clone)]
pub struct ExitEvent {
    pub code: String,
    pub signal_type: SellSignalType,
    pub quantity: u64,
    pub ratio: f64,
    pub price: f64,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// One position's contribution to [`PositionsSummary`].
#[derive(Debug, Clone)]
pub struct PositionPnl {
    pub code: String,
    pub name: String,
    pub quantity: u64,
    pub entry_price: f64,
    pub current_price: f64,
    pub return_rate: f64,
    pub investment: f64,
    pub current_value: f64,
    pub profit_loss: f64,
}

/// Aggregate view across every open position, grounded on the original
/// engine's `get_positions_summary`.
#[derive(Debug, Clone)]
pub struct PositionsSummary {
    pub total_positions: usize,
    pub total_investment: f64,
    pub total_current_value: f64,
    pub total_profit_loss: f64,
    pub total_return_rate: f64,
    pub positions: Vec<PositionPnl>,
}

pub struct SellEngine {
    config: SellSignalConfig,
    positions: Mutex<HashMap<String, Position>>,
}

impl SellEngine {
    pub fn new(config: SellSignalConfig) -> Self {
        Self { config, positions: Mutex::new(HashMap::new()) }
    }

    pub fn add_position(&self, position: Position) {
        self.positions.lock().insert(position.code.clone(), position);
    }

    pub fn remove_position(&self, code: &str) -> Option<Position> {
        self.positions.lock().remove(code)
    }

    pub fn position(&self, code: &str) -> Option<Position> {
        self.positions.lock().get(code).cloned()
    }

    pub fn position_count(&self) -> usize {
        self.positions.lock().len()
    }

    /// Portfolio-level P&L across every open position. `total_return_rate`
    /// is `0.0` when nothing is invested (vacuous, not a division panic).
    pub fn positions_summary(&self) -> PositionsSummary {
        let positions = self.positions.lock();

        let mut total_investment = 0.0;
        let mut total_current_value = 0.0;
        let mut rows = Vec::with_capacity(positions.len());

        for position in positions.values() {
            let investment = position.entry_price * position.quantity as f64;
            let current_value = position.current_price * position.quantity as f64;
            total_investment += investment;
            total_current_value += current_value;

            rows.push(PositionPnl {
                code: position.code.clone(),
                name: position.name.clone(),
                quantity: position.quantity,
                entry_price: position.entry_price,
                current_price: position.current_price,
                return_rate: position.current_return() * 100.0,
                investment,
                current_value,
                profit_loss: current_value - investment,
            });
        }

        let total_profit_loss = total_current_value - total_investment;
        let total_return_rate = if total_investment > 0.0 {
            total_profit_loss / total_investment * 100.0
        } else {
            0.0
        };

        PositionsSummary {
            total_positions: positions.len(),
            total_investment,
            total_current_value,
            total_profit_loss,
            total_return_rate,
            positions: rows,
        }
    }

    /// Update a position's current price, watermark, and trailing stop floor
    /// without evaluating signals — the caller drives that separately via
    /// [`Self::check_and_execute`] once all of this tick's inputs are ready.
    pub fn update_price(&self, code: &str, price: f64, trailing_stop: Option<f64>) -> bool {
        let mut positions = self.positions.lock();
        let Some(position) = positions.get_mut(code) else { return false };
        position.update_price(price);
        if let Some(stop) = trailing_stop {
            position.ratchet_stop(stop);
        }
        true
    }

    /// Evaluate the full signal set for `code` and execute whatever the
    /// action-selection policy admits: urgent signals always, `TAKE_PROFIT`
    /// at its suggested ratio, everything else only past the strength/
    /// confidence gate. Returns the signals considered and any exit events
    /// actually executed.
    #[instrument(skip(self, indicators), fields(code = %code))]
    pub fn check_and_execute(&self, code: &str, indicators: &IndicatorSnapshot) -> (Vec<SellSignal>, Vec<ExitEvent>) {
        let Some(position) = self.position(code) else { return (Vec::new(), Vec::new()) };
        if position.status != PositionStatus::Active {
            return (Vec::new(), Vec::new());
        }

        let signals = signals::evaluate(&position, indicators, &self.config);
        let mut events = Vec::new();

        for signal in &signals {
            if !signal.passes_execution_gate() {
                continue;
            }
            if let Some(event) = self.execute(code, signal) {
                events.push(event);
            }
            // Urgent and take-profit signals fully resolve the tick; a closed
            // or partially-closed position shouldn't also eat a weaker signal.
            if signal.is_urgent() || signal.signal_type == SellSignalType::TakeProfit {
                break;
            }
        }

        (signals, events)
    }

    fn execute(&self, code: &str, signal: &SellSignal) -> Option<ExitEvent> {
        let mut positions = self.positions.lock();
        let position = positions.get_mut(code)?;

        let ratio = signal.suggested_ratio.clamp(0.0, 1.0);
        let sell_quantity = ((position.quantity as f64) * ratio).floor() as u64;
        if sell_quantity == 0 {
            warn!(code, "sell signal produced zero quantity, skipping");
            return None;
        }

        let terminal_status = match signal.signal_type {
            SellSignalType::StopLoss | SellSignalType::TrailingStop => PositionStatus::StopTriggered,
            SellSignalType::TakeProfit => PositionStatus::TpTriggered,
            _ => PositionStatus::Closed,
        };

        if sell_quantity >= position.quantity {
            position.quantity = 0;
            position.transition_to(terminal_status);
            position.transition_to(PositionStatus::Closed);
            info!(code, signal = ?signal.signal_type, "position closed in full");
            positions.remove(code);
        } else {
            position.quantity -= sell_quantity;
            position.transition_to(terminal_status);
            info!(code, signal = ?signal.signal_type, remaining = position.quantity, "position partially closed");
        }

        Some(ExitEvent {
            code: code.to_string(),
            signal_type: signal.signal_type,
            quantity: sell_quantity,
            ratio,
            price: signal.current_price,
            reason: signal.reason.clone(),
            at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_position() -> Position {
        Position::new("005930", "Samsung", 10_000.0, Utc::now(), 10, 9_700.0, 11_000.0)
    }

    #[test]
    fn stop_loss_closes_the_full_position() {
        let engine = SellEngine::new(SellSignalConfig::default());
        engine.add_position(sample_position());
        engine.update_price("005930", 9_600.0, None);

        let (signals, events) = engine.check_and_execute("005930", &IndicatorSnapshot::default());
        assert!(!signals.is_empty());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].signal_type, SellSignalType::StopLoss);
        assert_eq!(events[0].quantity, 10);
        assert!(engine.position("005930").is_none());
    }

    #[test]
    fn take_profit_only_sells_the_partial_ratio() {
        let engine = SellEngine::new(SellSignalConfig::default());
        engine.add_position(sample_position());
        engine.update_price("005930", 11_500.0, None);

        let (_, events) = engine.check_and_execute("005930", &IndicatorSnapshot::default());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].quantity, 3);
        let remaining = engine.position("005930").unwrap();
        assert_eq!(remaining.quantity, 7);
        assert_eq!(remaining.status, PositionStatus::TpTriggered);
    }

    #[test]
    fn dropped_positions_do_not_resurrect_on_ticks() {
        let engine = SellEngine::new(SellSignalConfig::default());
        engine.add_position(sample_position());
        engine.update_price("005930", 9_000.0, None);
        engine.check_and_execute("005930", &IndicatorSnapshot::default());
        assert!(!engine.update_price("005930", 9_500.0, None));
    }

    #[test]
    fn unknown_code_is_a_silent_no_op() {
        let engine = SellEngine::new(SellSignalConfig::default());
        let (signals, events) = engine.check_and_execute("999999", &IndicatorSnapshot::default());
        assert!(signals.is_empty() && events.is_empty());
    }

    #[test]
    fn positions_summary_aggregates_pnl_across_open_positions() {
        let engine = SellEngine::new(SellSignalConfig::default());
        engine.add_position(sample_position());
        engine.add_position(Position::new("000660", "SK Hynix", 20_000.0, Utc::now(), 5, 19_000.0, 22_000.0));
        engine.update_price("005930", 10_500.0, None);
        engine.update_price("000660", 19_500.0, None);

        let summary = engine.positions_summary();
        assert_eq!(summary.total_positions, 2);
        assert_eq!(summary.positions.len(), 2);

        let expected_investment = 10_000.0 * 10.0 + 20_000.0 * 5.0;
        let expected_current = 10_500.0 * 10.0 + 19_500.0 * 5.0;
        assert!((summary.total_investment - expected_investment).abs() < 1e-9);
        assert!((summary.total_current_value - expected_current).abs() < 1e-9);
        assert!((summary.total_profit_loss - (expected_current - expected_investment)).abs() < 1e-9);
    }

    #[test]
    fn positions_summary_is_vacuous_when_empty() {
        let engine = SellEngine::new(SellSignalConfig::default());
        let summary = engine.positions_summary();
        assert_eq!(summary.total_positions, 0);
        assert_eq!(summary.total_return_rate, 0.0);
        assert!(summary.positions.is_empty());
    }

    #[test]
    fn inactive_position_is_skipped() {
        let engine = SellEngine::new(SellSignalConfig::default());
        let mut p = sample_position();
        p.transition_to(PositionStatus::StopTriggered);
        engine.add_position(p);
        let (signals, events) = engine.check_and_execute("005930", &IndicatorSnapshot::default());
        assert!(signals.is_empty() && events.is_empty());
    }
}
