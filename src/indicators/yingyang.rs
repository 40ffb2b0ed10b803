//! YingYang volatility indicator
//!
//! Splits the squared deviation of close from its EMA into an upside ("yang")
//! and a downside ("ying") component, and derives from them:
//! - YYL: the normalized imbalance between the two, in [-100, 100]
//! - YYL slow: a simple moving average of YYL
//! - Pan Bands: an asymmetric envelope around the EMA
//! - YingYang cycle: the band asymmetry, min-max scaled to [-100, 100]
//!
//! Values that need more history than is available are `None` rather than a
//! placeholder number, so warm-up candles can never produce a signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::indicators::moving_average::{ema_series, rolling_max, rolling_mean, rolling_min};
use crate::models::Candle;
use crate::Result;

pub const EPSILON: f64 = 1e-10;
pub const CYCLE_WINDOW: usize = 70;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YingYangParams {
    /// EMA period and volatility window
    pub window: usize,
    /// YYL slow moving average period
    pub span: usize,
    /// Pan Band width in units of directional volatility
    pub band_multiplier: f64,
}

impl Default for YingYangParams {
    fn default() -> Self {
        Self {
            window: 20,
            span: 10,
            band_multiplier: 2.0,
        }
    }
}

/// Indicator values for one candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub ema: f64,
    pub yang_vol: Option<f64>,
    pub ying_vol: Option<f64>,
    pub total_vol: Option<f64>,
    pub yyl: Option<f64>,
    pub yyl_slow: Option<f64>,
    pub upper_band: Option<f64>,
    pub lower_band: Option<f64>,
    pub pan_river_up: Option<f64>,
    pub pan_river_down: Option<f64>,
    /// 0 while the cycle window is warming up or flat
    pub scaled_cycle: f64,
}

impl IndicatorPoint {
    /// Both oscillator lines are defined, so the point can be classified
    pub fn is_ready(&self) -> bool {
        self.yyl.is_some() && self.yyl_slow.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct YingYangIndicator {
    params: YingYangParams,
}

impl YingYangIndicator {
    pub fn new(params: YingYangParams) -> Result<Self> {
        if params.window == 0 {
            return Err(EngineError::InvalidParameter(
                "indicator window must be at least 1".to_string(),
            ));
        }
        if params.span == 0 {
            return Err(EngineError::InvalidParameter(
                "indicator span must be at least 1".to_string(),
            ));
        }
        if !params.band_multiplier.is_finite() || params.band_multiplier < 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "band multiplier must be a finite non-negative number, got {}",
                params.band_multiplier
            )));
        }

        Ok(Self { params })
    }

    pub fn params(&self) -> &YingYangParams {
        &self.params
    }

    /// Rows needed before every field of the latest point is defined
    pub fn min_candles_for_full_output(&self) -> usize {
        self.params.window + self.params.span.max(CYCLE_WINDOW)
    }

    /// Compute one indicator point per candle
    pub fn calculate(&self, candles: &[Candle]) -> Result<Vec<IndicatorPoint>> {
        check_input(candles)?;

        let window = self.params.window;
        let multiplier = self.params.band_multiplier;

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let ema = ema_series(&closes, window);

        let mut yang_sq = Vec::with_capacity(closes.len());
        let mut ying_sq = Vec::with_capacity(closes.len());
        for (close, ma) in closes.iter().zip(&ema) {
            let diff = close - ma;
            let sq = diff * diff;
            if diff > 0.0 {
                yang_sq.push(Some(sq));
                ying_sq.push(Some(0.0));
            } else {
                yang_sq.push(Some(0.0));
                ying_sq.push(Some(sq));
            }
        }

        let yang_vol: Vec<Option<f64>> = rolling_mean(&yang_sq, window)
            .into_iter()
            .map(|m| m.map(f64::sqrt))
            .collect();
        let ying_vol: Vec<Option<f64>> = rolling_mean(&ying_sq, window)
            .into_iter()
            .map(|m| m.map(f64::sqrt))
            .collect();

        let total_vol: Vec<Option<f64>> = yang_vol
            .iter()
            .copied()
            .zip(ying_vol.iter().copied())
            .map(|(yang, ying)| Some((yang?.powi(2) + ying?.powi(2)).sqrt()))
            .collect();

        let yyl: Vec<Option<f64>> = (0..closes.len())
            .map(|i| {
                let (yang, ying, total) = (yang_vol[i]?, ying_vol[i]?, total_vol[i]?);
                Some((yang - ying) / (total + EPSILON) * 100.0)
            })
            .collect();
        let yyl_slow = rolling_mean(&yyl, self.params.span);

        let upper_band: Vec<Option<f64>> = yang_vol
            .iter()
            .zip(&ema)
            .map(|(yang, ma)| yang.map(|v| ma + multiplier * v))
            .collect();
        let lower_band: Vec<Option<f64>> = ying_vol
            .iter()
            .zip(&ema)
            .map(|(ying, ma)| ying.map(|v| ma - multiplier * v))
            .collect();

        let raw_cycle: Vec<Option<f64>> = (0..closes.len())
            .map(|i| {
                let (upper, lower) = (upper_band[i]?, lower_band[i]?);
                Some((upper - ema[i]).powi(2) - (ema[i] - lower).powi(2))
            })
            .collect();
        let scaled_cycle = scale_cycle(&raw_cycle);

        let points = candles
            .iter()
            .enumerate()
            .map(|(i, candle)| IndicatorPoint {
                timestamp: candle.timestamp,
                close: candle.close,
                ema: ema[i],
                yang_vol: yang_vol[i],
                ying_vol: ying_vol[i],
                total_vol: total_vol[i],
                yyl: yyl[i],
                yyl_slow: yyl_slow[i],
                upper_band: upper_band[i],
                lower_band: lower_band[i],
                pan_river_up: upper_band[i].map(|upper| (ema[i] + upper) / 2.0),
                pan_river_down: lower_band[i].map(|lower| (ema[i] + lower) / 2.0),
                scaled_cycle: scaled_cycle[i],
            })
            .collect();

        tracing::debug!(
            "YingYang indicators calculated for {} candles (window={}, span={})",
            candles.len(),
            window,
            self.params.span
        );

        Ok(points)
    }
}

impl Default for YingYangIndicator {
    fn default() -> Self {
        Self {
            params: YingYangParams::default(),
        }
    }
}

fn scale_cycle(raw: &[Option<f64>]) -> Vec<f64> {
    let min = rolling_min(raw, CYCLE_WINDOW);
    let max = rolling_max(raw, CYCLE_WINDOW);

    (0..raw.len())
        .map(|i| match (raw[i], min[i], max[i]) {
            (Some(value), Some(lo), Some(hi)) if hi - lo > EPSILON => {
                (value - lo) / (hi - lo + EPSILON) * 200.0 - 100.0
            }
            _ => 0.0,
        })
        .collect()
}

fn check_input(candles: &[Candle]) -> Result<()> {
    if candles.len() < 2 {
        return Err(EngineError::InvalidInput(format!(
            "need at least 2 candles, got {}",
            candles.len()
        )));
    }
    validate_candles(candles)
}

/// Reject non-positive or non-finite closes and out-of-order timestamps
///
/// Holds for any history length, so callers can run it before deciding
/// whether there is enough data.
pub fn validate_candles(candles: &[Candle]) -> Result<()> {
    for (i, candle) in candles.iter().enumerate() {
        if !candle.close.is_finite() || candle.close <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "candle {} at {} has invalid close {}",
                i, candle.timestamp, candle.close
            )));
        }
    }

    if let Some(pair) = candles
        .windows(2)
        .find(|pair| pair[1].timestamp <= pair[0].timestamp)
    {
        return Err(EngineError::InvalidInput(format!(
            "candle timestamps not strictly increasing: {} then {}",
            pair[0].timestamp, pair[1].timestamp
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "KRW-BTC".to_string(),
                timestamp: start + Duration::minutes(30 * i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 10.0 * (i as f64 * 0.3).sin() + 3.0 * (i as f64 * 1.7).cos())
            .collect()
    }

    #[test]
    fn test_constant_price_has_zero_volatility() {
        let points = YingYangIndicator::default()
            .calculate(&candles_from_closes(&[100.0; 120]))
            .unwrap();

        for point in points.iter().filter(|p| p.yang_vol.is_some()) {
            assert_eq!(point.yang_vol, Some(0.0));
            assert_eq!(point.ying_vol, Some(0.0));
            assert_eq!(point.yyl, Some(0.0));
            assert_eq!(point.scaled_cycle, 0.0);
        }
    }

    #[test]
    fn test_total_vol_is_quadrature_sum() {
        let points = YingYangIndicator::default()
            .calculate(&candles_from_closes(&wave(150)))
            .unwrap();

        for point in points.iter().filter(|p| p.total_vol.is_some()) {
            let yang = point.yang_vol.unwrap();
            let ying = point.ying_vol.unwrap();
            assert_eq!(point.total_vol.unwrap(), (yang.powi(2) + ying.powi(2)).sqrt());
        }
    }

    #[test]
    fn test_yyl_bounded() {
        let points = YingYangIndicator::default()
            .calculate(&candles_from_closes(&wave(150)))
            .unwrap();

        for yyl in points.iter().filter_map(|p| p.yyl) {
            assert!((-100.0..=100.0).contains(&yyl), "yyl out of range: {}", yyl);
        }
    }

    #[test]
    fn test_scaled_cycle_bounded() {
        let points = YingYangIndicator::default()
            .calculate(&candles_from_closes(&wave(200)))
            .unwrap();

        for point in &points {
            assert!((-100.0..=100.0).contains(&point.scaled_cycle));
        }
    }

    #[test]
    fn test_warmup_is_not_ready() {
        let params = YingYangParams::default();
        let points = YingYangIndicator::new(params)
            .unwrap()
            .calculate(&candles_from_closes(&wave(100)))
            .unwrap();

        // Volatility needs `window` samples, YYL slow another `span - 1`
        assert!(points[params.window - 2].yang_vol.is_none());
        assert!(points[params.window - 1].yang_vol.is_some());
        assert!(points[params.window - 1].yyl_slow.is_none());
        assert!(points[params.window + params.span - 2].is_ready());

        // Cycle scaling needs 70 raw values on top of the volatility warm-up
        let first_cycle = params.window - 1 + CYCLE_WINDOW - 1;
        assert!(points[..first_cycle].iter().all(|p| p.scaled_cycle == 0.0));
    }

    #[test]
    fn test_rising_prices_push_yyl_positive() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let points = YingYangIndicator::default()
            .calculate(&candles_from_closes(&closes))
            .unwrap();

        let last = points.last().unwrap();
        assert_eq!(last.ying_vol, Some(0.0));
        assert_relative_eq!(last.yyl.unwrap(), 100.0, epsilon = 1e-6);
        assert!(last.upper_band.unwrap() > last.ema);
        assert_eq!(last.lower_band, Some(last.ema));
        assert_relative_eq!(
            last.pan_river_up.unwrap(),
            (last.ema + last.upper_band.unwrap()) / 2.0
        );
    }

    #[test]
    fn test_band_multiplier_widens_bands() {
        let candles = candles_from_closes(&wave(80));
        let narrow = YingYangIndicator::new(YingYangParams {
            band_multiplier: 1.0,
            ..Default::default()
        })
        .unwrap()
        .calculate(&candles)
        .unwrap();
        let wide = YingYangIndicator::default().calculate(&candles).unwrap();

        let (n, w) = (narrow.last().unwrap(), wide.last().unwrap());
        let narrow_width = n.upper_band.unwrap() - n.lower_band.unwrap();
        let wide_width = w.upper_band.unwrap() - w.lower_band.unwrap();
        assert_relative_eq!(wide_width, 2.0 * narrow_width, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_short_input() {
        let result = YingYangIndicator::default().calculate(&candles_from_closes(&[100.0]));
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_invalid_close() {
        let mut candles = candles_from_closes(&[100.0, 101.0, 102.0]);
        candles[1].close = f64::NAN;
        let result = YingYangIndicator::default().calculate(&candles);
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_unsorted_timestamps() {
        let mut candles = candles_from_closes(&[100.0, 101.0, 102.0]);
        candles.swap(0, 1);
        let result = YingYangIndicator::default().calculate(&candles);
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_params() {
        let result = YingYangIndicator::new(YingYangParams {
            window: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));

        let result = YingYangIndicator::new(YingYangParams {
            band_multiplier: -1.0,
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_min_candles_for_full_output() {
        assert_eq!(YingYangIndicator::default().min_candles_for_full_output(), 90);
    }
}
