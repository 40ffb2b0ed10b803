use super::{
    signals::{decide, DecisionRecord, SignalConfig},
    Strategy,
};
use crate::error::EngineError;
use crate::indicators::{
    calculate_atr_series, validate_candles, IndicatorPoint, YingYangIndicator, YingYangParams,
};
use crate::models::Candle;
use crate::Result;

/// YingYang volatility strategy
///
/// Looks only at the last two candles: a long is signalled when YYL crosses
/// above its slow average while deeply negative, a short when it crosses below
/// while strongly positive. Both a crossing and an extreme reading are
/// required.
#[derive(Debug, Clone)]
pub struct YingYangStrategy {
    indicator: YingYangIndicator,
    config: SignalConfig,
}

impl YingYangStrategy {
    pub fn new(params: YingYangParams, config: SignalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            indicator: YingYangIndicator::new(params)?,
            config,
        })
    }

    pub fn indicator(&self) -> &YingYangIndicator {
        &self.indicator
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Indicator points plus the decision on the latest candle
    pub fn analyze(&self, candles: &[Candle]) -> Result<(Vec<IndicatorPoint>, DecisionRecord)> {
        // Malformed data is an error even when the history is too short to decide on
        validate_candles(candles)?;

        let need = self.min_candles_required();
        if candles.len() < need {
            return Err(EngineError::InsufficientData {
                have: candles.len(),
                need,
            });
        }

        let points = self.indicator.calculate(candles)?;
        let atr = calculate_atr_series(candles, self.config.atr_period)
            .last()
            .copied()
            .flatten()
            .ok_or(EngineError::InsufficientData {
                have: candles.len(),
                need: self.config.atr_period,
            })?;

        let current = &points[points.len() - 1];
        let prev = &points[points.len() - 2];
        if !prev.is_ready() || !current.is_ready() {
            let warmup = self.indicator.params().window + self.indicator.params().span;
            return Err(EngineError::InsufficientData {
                have: candles.len(),
                need: warmup,
            });
        }

        let record = decide(prev, current, atr, &self.config)?;
        Ok((points, record))
    }
}

impl Default for YingYangStrategy {
    fn default() -> Self {
        Self {
            indicator: YingYangIndicator::default(),
            config: SignalConfig::default(),
        }
    }
}

impl Strategy for YingYangStrategy {
    fn evaluate(&self, candles: &[Candle]) -> Result<DecisionRecord> {
        self.analyze(candles).map(|(_, record)| record)
    }

    fn name(&self) -> &str {
        crate::models::STRATEGY_TAG
    }

    fn min_candles_required(&self) -> usize {
        self.config.min_candles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entry;
    use chrono::{Duration, TimeZone, Utc};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "KRW-BTC".to_string(),
                timestamp: start + Duration::minutes(30 * i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_insufficient_candles() {
        let strategy = YingYangStrategy::default();
        let result = strategy.evaluate(&candles_from_closes(&[100.0; 14]));
        assert!(matches!(
            result,
            Err(EngineError::InsufficientData { have: 14, need: 15 })
        ));
    }

    #[test]
    fn test_malformed_short_history_is_invalid_input() {
        let strategy = YingYangStrategy::default();

        let mut candles = candles_from_closes(&[100.0; 5]);
        candles[4].close = 0.0;
        assert!(matches!(
            strategy.evaluate(&candles),
            Err(EngineError::InvalidInput(_))
        ));

        let mut candles = candles_from_closes(&[100.0; 5]);
        candles[2].close = f64::NAN;
        assert!(matches!(
            strategy.evaluate(&candles),
            Err(EngineError::InvalidInput(_))
        ));

        let mut candles = candles_from_closes(&[100.0; 5]);
        candles.swap(1, 3);
        assert!(matches!(
            strategy.evaluate(&candles),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_warmup_candles_are_insufficient() {
        // Enough for ATR but not for YYL slow (needs window + span - 1)
        let strategy = YingYangStrategy::default();
        let result = strategy.evaluate(&candles_from_closes(&[100.0; 20]));
        assert!(matches!(result, Err(EngineError::InsufficientData { .. })));
    }

    #[test]
    fn test_constant_prices_are_neutral() {
        let strategy = YingYangStrategy::default();
        let record = strategy.evaluate(&candles_from_closes(&[100.0; 100])).unwrap();

        assert_eq!(record.entry, Entry::Neutral);
        assert_eq!(record.diff, 0);
        // High - low is 2 on every candle
        assert_eq!(record.atr, 2.0);
        assert_eq!(record.stop_loss, 96.0);
        assert_eq!(record.take_profit, 106.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SignalConfig {
            atr_period: 0,
            ..Default::default()
        };
        assert!(YingYangStrategy::new(YingYangParams::default(), config).is_err());
    }
}
