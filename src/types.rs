// =============================================================================
// Shared domain types used across the core engine
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single current-price quote returned by the REST client's
/// `get_current_price` or refreshed on every WebSocket trade tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    pub code: String,
    pub current_price: f64,
    pub change_rate: f64,
    pub volume: u64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub prev_close: f64,
    pub fetched_at: DateTime<Utc>,
}

/// One bar of daily or intraday OHLCV data. An ordered sequence of these,
/// ascending by date, is the unit of analysis for every indicator in
/// [`crate::indicators`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Outcome of a concurrent batch price fetch: partial failure is normal,
/// not exceptional — a caller inspects `failed` rather than the fetch
/// raising for a handful of bad symbols.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub successful: std::collections::HashMap<String, PriceData>,
    pub failed: Vec<(String, String)>,
    pub total_time_ms: u64,
}

impl BatchResult {
    pub fn success_count(&self) -> usize {
        self.successful.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Fraction of requested symbols that succeeded, in `[0, 1]`. `1.0` when
    /// nothing was requested (vacuously fully successful).
    pub fn success_rate(&self) -> f64 {
        let total = self.successful.len() + self.failed.len();
        if total == 0 {
            1.0
        } else {
            self.successful.len() as f64 / total as f64
        }
    }
}

/// Lifecycle state of a held [`Position`]. Transitions are one-way:
/// `Active -> {StopTriggered, TpTriggered} -> Closed`. Nothing ever moves
/// back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Active,
    StopTriggered,
    TpTriggered,
    Closed,
}

impl PositionStatus {
    /// `true` if `self -> next` is an allowed transition under the one-way
    /// state machine spec.md §3 describes.
    pub fn can_transition_to(self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        matches!(
            (self, next),
            (Active, StopTriggered)
                | (Active, TpTriggered)
                | (Active, Closed)
                | (StopTriggered, Closed)
                | (TpTriggered, Closed)
        )
    }
}

/// A held position tracked by the sell engine and the realtime monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub code: String,
    pub name: String,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub quantity: u64,
    pub current_price: f64,
    pub stop_loss_price: f64,
    pub trailing_stop_price: f64,
    pub take_profit_price: f64,
    pub highest_price_since_entry: f64,
    pub status: PositionStatus,
}

impl Position {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        entry_price: f64,
        entry_time: DateTime<Utc>,
        quantity: u64,
        stop_loss_price: f64,
        take_profit_price: f64,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            entry_price,
            entry_time,
            quantity,
            current_price: entry_price,
            stop_loss_price,
            trailing_stop_price: stop_loss_price,
            take_profit_price,
            highest_price_since_entry: entry_price,
            status: PositionStatus::Active,
        }
    }

    /// Unrealized return since entry, as a fraction (0.05 == +5%).
    pub fn current_return(&self) -> f64 {
        (self.current_price - self.entry_price) / self.entry_price
    }

    /// Feed a new tick price. Updates the running high and widens the
    /// trailing stop if the caller passes one via [`Self::ratchet_stop`]; this
    /// method alone never moves the stop, only the watermark.
    pub fn update_price(&mut self, price: f64) {
        self.current_price = price;
        if price > self.highest_price_since_entry {
            self.highest_price_since_entry = price;
        }
    }

    /// Move `trailing_stop_price` up to `new_stop`, never down, and never
    /// below `stop_loss_price`. Maintains the
    /// `trailing_stop_price >= stop_loss_price` invariant.
    pub fn ratchet_stop(&mut self, new_stop: f64) {
        let floor = self.stop_loss_price;
        let candidate = new_stop.max(floor);
        if candidate > self.trailing_stop_price {
            self.trailing_stop_price = candidate;
        }
    }

    /// Attempt a status transition, rejecting any move the one-way state
    /// machine forbids. Returns `false` (and leaves `status` unchanged) on a
    /// disallowed transition.
    pub fn transition_to(&mut self, next: PositionStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Output of the momentum selector for one candidate symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub code: String,
    pub name: String,
    pub selection_date: NaiveDate,
    pub selection_reason: String,
    pub momentum_score: f64,
    pub percentile_rank: f64,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub expected_return: f64,
    pub position_weight: f64,
    pub position_amount: f64,
    pub sector: String,
    pub market_cap: f64,
    pub priority: u32,
    pub signals: Vec<String>,
    pub atr_value: f64,
    pub daily_volatility: f64,
}
