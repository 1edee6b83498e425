pub mod momentum_selector;
pub mod position_sizer;
pub mod quant_config;

pub use momentum_selector::{select, Candidate};
pub use position_sizer::{adjust_stop_loss, normalize_portfolio_weights, size_position, trailing_stop, PositionSize};
pub use quant_config::{MarketRegime, QuantConfig};
