//! Average True Range (ATR) indicator
//!
//! Measures market volatility by averaging true ranges over a period.
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! The first candle has no previous close, so its true range is High - Low.
//! The average is a simple rolling mean (no Wilder smoothing).

use crate::indicators::moving_average::rolling_mean;
use crate::models::Candle;

pub const DEFAULT_ATR_PERIOD: usize = 14;

/// True range per candle, aligned with the input
pub fn true_range_series(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let high_low = candle.high - candle.low;
            if i == 0 {
                return high_low;
            }
            let prev_close = candles[i - 1].close;
            high_low
                .max((candle.high - prev_close).abs())
                .max((candle.low - prev_close).abs())
        })
        .collect()
}

/// ATR per candle, `None` until `period` true ranges are available
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let true_ranges: Vec<Option<f64>> = true_range_series(candles).into_iter().map(Some).collect();
    rolling_mean(&true_ranges, period)
}

/// ATR at the latest candle, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    calculate_atr_series(candles, period).last().copied().flatten()
}
