pub mod engine;
pub mod monitor;
pub mod signals;

pub use engine::{ExitEvent, PositionPnl, PositionsSummary, SellEngine};
pub use monitor::{EventCallback, PositionMonitor, PriceTick};
pub use signals::{evaluate, IndicatorSnapshot, SellSignal, SellSignalConfig, SellSignalType};
