// Technical indicators module
// Implements EMA/rolling windows, ATR and the YingYang volatility indicator

pub mod atr;
pub mod moving_average;
pub mod yingyang;

pub use atr::{calculate_atr, calculate_atr_series, true_range_series, DEFAULT_ATR_PERIOD};
pub use moving_average::{ema_series, rolling_max, rolling_mean, rolling_min};
pub use yingyang::{validate_candles, IndicatorPoint, YingYangIndicator, YingYangParams};
