use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::indicators::{IndicatorPoint, DEFAULT_ATR_PERIOD};
use crate::models::{Candle, Entry};
use crate::Result;

/// Fewest candles a decision is ever made on: the ATR window plus one
pub const MIN_DECISION_CANDLES: usize = DEFAULT_ATR_PERIOD + 1;

/// Configuration for signal generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// YYL at or below this on a bullish flip opens a long
    pub long_threshold: f64,
    /// YYL at or above this on a bearish flip closes a long
    pub short_threshold: f64,
    pub atr_period: usize,
    pub stop_loss_atr_multiplier: f64,
    pub take_profit_atr_multiplier: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            long_threshold: -75.0,
            short_threshold: 75.0,
            atr_period: DEFAULT_ATR_PERIOD,
            stop_loss_atr_multiplier: 2.0,
            take_profit_atr_multiplier: 3.0,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.atr_period == 0 {
            return Err(EngineError::InvalidParameter(
                "atr_period must be at least 1".to_string(),
            ));
        }
        if self.long_threshold >= self.short_threshold {
            return Err(EngineError::InvalidParameter(format!(
                "long threshold {} must be below short threshold {}",
                self.long_threshold, self.short_threshold
            )));
        }
        for (name, value) in [
            ("stop_loss_atr_multiplier", self.stop_loss_atr_multiplier),
            ("take_profit_atr_multiplier", self.take_profit_atr_multiplier),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidParameter(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Candles needed before a decision can be attempted
    pub fn min_candles(&self) -> usize {
        MIN_DECISION_CANDLES.max(self.atr_period + 1).max(2)
    }
}

/// Outcome of evaluating the last two indicator points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub status_prev: i8,
    pub status_current: i8,
    pub diff: i8,
    pub entry: Entry,
    pub yyl: f64,
    pub atr: f64,
    pub prev_close: f64,
    pub close: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// +1 when YYL is above its slow average, -1 below, 0 on a tie
pub fn classify_status(yyl: f64, yyl_slow: f64) -> i8 {
    if yyl > yyl_slow {
        1
    } else if yyl < yyl_slow {
        -1
    } else {
        0
    }
}

/// Entry rule: a status flip confirmed by an extreme oscillator reading
pub fn entry_for(diff: i8, yyl: f64, config: &SignalConfig) -> Entry {
    if (diff == 1 || diff == 2) && yyl <= config.long_threshold {
        Entry::Long
    } else if (diff == -1 || diff == -2) && yyl >= config.short_threshold {
        Entry::Short
    } else {
        Entry::Neutral
    }
}

/// Decide on the current candle from the previous and current points
///
/// Stop and take levels anchor to the previous candle's close.
pub fn decide(
    prev: &IndicatorPoint,
    current: &IndicatorPoint,
    atr: f64,
    config: &SignalConfig,
) -> Result<DecisionRecord> {
    let (Some(prev_yyl), Some(prev_slow)) = (prev.yyl, prev.yyl_slow) else {
        return Err(EngineError::InsufficientData { have: 1, need: 2 });
    };
    let (Some(yyl), Some(yyl_slow)) = (current.yyl, current.yyl_slow) else {
        return Err(EngineError::InsufficientData { have: 0, need: 2 });
    };

    let status_prev = classify_status(prev_yyl, prev_slow);
    let status_current = classify_status(yyl, yyl_slow);
    let diff = status_current - status_prev;
    let entry = entry_for(diff, yyl, config);

    let prev_close = prev.close;
    let record = DecisionRecord {
        timestamp: current.timestamp,
        status_prev,
        status_current,
        diff,
        entry,
        yyl,
        atr,
        prev_close,
        close: current.close,
        stop_loss: prev_close - atr * config.stop_loss_atr_multiplier,
        take_profit: prev_close + atr * config.take_profit_atr_multiplier,
    };

    match entry {
        Entry::Long => tracing::info!(
            "Buy signal at {}, price {:.2} (YYL={:.1}, diff={})",
            record.timestamp,
            record.close,
            yyl,
            diff
        ),
        Entry::Short => tracing::info!(
            "Sell signal at {}, price {:.2} (YYL={:.1}, diff={})",
            record.timestamp,
            record.close,
            yyl,
            diff
        ),
        Entry::Neutral => tracing::debug!(
            "No signal at {} (YYL={:.1}, slow={:.1}, diff={})",
            record.timestamp,
            yyl,
            yyl_slow,
            diff
        ),
    }

    Ok(record)
}

/// Validate that candles are uniformly spaced in time
///
/// # Arguments
/// * `candles` - The candles to validate
/// * `expected_interval_secs` - Expected time between candles in seconds
///
/// # Returns
/// * `Ok(())` if candles are uniformly spaced (within tolerance)
/// * `Err` if there are gaps in the data or the order is wrong
///
/// # Tolerance
/// Allows up to 1.5x the expected interval
pub fn validate_candle_uniformity(candles: &[Candle], expected_interval_secs: u64) -> Result<()> {
    if candles.len() < 2 {
        return Ok(());
    }

    let max_gap_secs = expected_interval_secs + (expected_interval_secs / 2);

    for window in candles.windows(2) {
        let time_diff = (window[1].timestamp - window[0].timestamp).num_seconds();

        if time_diff <= 0 {
            return Err(EngineError::InvalidInput(
                "Candles are not sorted by timestamp".to_string(),
            ));
        }

        let time_diff = time_diff as u64;
        if time_diff > max_gap_secs {
            return Err(EngineError::InvalidInput(format!(
                "Data gap detected: {}s between candles (expected ~{}s, max allowed {}s). Gap from {} to {}",
                time_diff,
                expected_interval_secs,
                max_gap_secs,
                window[0].timestamp.format("%Y-%m-%d %H:%M:%S"),
                window[1].timestamp.format("%Y-%m-%d %H:%M:%S")
            )));
        }
    }

    Ok(())
}
