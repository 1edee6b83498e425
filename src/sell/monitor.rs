// =============================================================================
// Position Monitor (C11)
// =============================================================================
//
// Consumes price ticks (WebSocket trade frames or REST polling fallback) and
// drives the sell engine per spec.md §4.11. Grounded on the teacher's
// `exit::monitor` background-loop shape, but event-driven per tick rather
// than on a fixed interval, matching what the original `update_position_price`
// + `check_sell_signals` pairing actually does on every quote.
// =============================================================================

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::Receiver;
use tracing::{error, instrument, warn};

use crate::broker::ws_frames::TradeFrame;
use crate::sell::engine::{ExitEvent, SellEngine};
use crate::sell::signals::{IndicatorSnapshot, SellSignalType};
use crate::selection::position_sizer::trailing_stop as compute_trailing_stop;
use crate::selection::quant_config::QuantConfig;
use crate::types::PositionStatus;

pub type EventCallback = Box<dyn Fn(&ExitEvent) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    stop_loss: Vec<EventCallback>,
    take_profit: Vec<EventCallback>,
    alert: Vec<EventCallback>,
}

/// One price update to evaluate. `atr` drives the optional ATR-based
/// trailing stop recalculation (spec.md §4.9 step 7); `indicators` carries
/// whatever technical inputs are fresh this tick.
#[derive(Debug, Clone)]
pub struct PriceTick {
    pub code: String,
    pub price: f64,
    pub atr: Option<f64>,
    pub indicators: IndicatorSnapshot,
}

impl PriceTick {
    pub fn from_trade_frame(frame: &TradeFrame) -> Self {
        Self { code: frame.code.clone(), price: frame.price, atr: None, indicators: IndicatorSnapshot::default() }
    }
}

pub struct PositionMonitor {
    engine: Arc<SellEngine>,
    sizer_config: QuantConfig,
    callbacks: Mutex<Callbacks>,
}

impl PositionMonitor {
    pub fn new(engine: Arc<SellEngine>, sizer_config: QuantConfig) -> Arc<Self> {
        Arc::new(Self { engine, sizer_config, callbacks: Mutex::new(Callbacks::default()) })
    }

    pub fn on_stop_loss(&self, callback: EventCallback) {
        self.callbacks.lock().stop_loss.push(callback);
    }

    pub fn on_take_profit(&self, callback: EventCallback) {
        self.callbacks.lock().take_profit.push(callback);
    }

    pub fn on_alert(&self, callback: EventCallback) {
        self.callbacks.lock().alert.push(callback);
    }

    /// Steps 1-5 of spec.md §4.11 for a single tick.
    #[instrument(skip(self), fields(code = %tick.code))]
    pub fn handle_tick(&self, tick: &PriceTick) {
        let Some(position) = self.engine.position(&tick.code) else { return };
        if position.status != PositionStatus::Active {
            return;
        }

        let trailing = tick.atr.and_then(|atr| {
            let highest = tick.price.max(position.highest_price_since_entry);
            compute_trailing_stop(&self.sizer_config, position.entry_price, tick.price, highest, atr)
        });

        self.engine.update_price(&tick.code, tick.price, trailing);
        let (_, events) = self.engine.check_and_execute(&tick.code, &tick.indicators);
        for event in &events {
            self.dispatch(event);
        }
    }

    fn dispatch(&self, event: &ExitEvent) {
        let callbacks = self.callbacks.lock();
        let list: &[EventCallback] = match event.signal_type {
            SellSignalType::StopLoss | SellSignalType::TrailingStop => &callbacks.stop_loss,
            SellSignalType::TakeProfit => &callbacks.take_profit,
            _ => &callbacks.alert,
        };

        for callback in list {
            // One misbehaving callback must not stop the rest from running.
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(code = %event.code, "sell event callback panicked");
            }
        }
    }

    /// Drain a channel of ticks forever. Spawn this as a background task
    /// alongside the WebSocket/fetcher loops.
    pub async fn run(self: Arc<Self>, mut ticks: Receiver<PriceTick>) {
        while let Some(tick) = ticks.recv().await {
            self.handle_tick(&tick);
        }
        warn!("position monitor tick channel closed, loop exiting");
    }
}
