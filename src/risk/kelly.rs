use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::Result;

/// Raw Kelly fraction `(p·(b+1) − 1) / b`, clamped at zero
///
/// # Arguments
/// * `win_probability` - p, must be in (0, 1)
/// * `odds` - b, net payout per unit risked, must be > 0
pub fn kelly_fraction(win_probability: f64, odds: f64) -> Result<f64> {
    if !(win_probability > 0.0 && win_probability < 1.0) {
        return Err(EngineError::InvalidParameter(format!(
            "win probability must be in (0, 1), got {}",
            win_probability
        )));
    }
    if !odds.is_finite() || odds <= 0.0 {
        return Err(EngineError::InvalidParameter(format!(
            "odds must be a positive number, got {}",
            odds
        )));
    }

    let kelly = (win_probability * (odds + 1.0) - 1.0) / odds;
    Ok(kelly.max(0.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellyConfig {
    pub win_probability: f64,
    pub odds: f64,
    /// Fraction of full Kelly to bet (0.5 = half Kelly)
    pub fraction: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            win_probability: 0.6,
            odds: 2.0,
            fraction: 1.0,
        }
    }
}

/// Position size for a single entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    pub kelly: f64,
    pub invested: f64,
    pub quantity: f64,
}

/// Fractional-Kelly position sizer
///
/// Parameters are validated once on construction; sizing itself only checks
/// the price.
#[derive(Debug, Clone)]
pub struct KellySizer {
    config: KellyConfig,
    kelly: f64,
}

impl KellySizer {
    pub fn new(config: KellyConfig) -> Result<Self> {
        if !(config.fraction > 0.0 && config.fraction <= 1.0) {
            return Err(EngineError::InvalidParameter(format!(
                "kelly fraction multiplier must be in (0, 1], got {}",
                config.fraction
            )));
        }
        let kelly = kelly_fraction(config.win_probability, config.odds)? * config.fraction;

        tracing::info!(
            "Kelly sizer: p={}, b={}, multiplier={} -> {:.4} of cash per entry",
            config.win_probability,
            config.odds,
            config.fraction,
            kelly
        );

        Ok(Self { config, kelly })
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Fraction of available cash committed per entry
    pub fn fraction(&self) -> f64 {
        self.kelly
    }

    /// Size an entry from the cash available right now
    pub fn size(&self, available_cash: f64, current_price: f64) -> Result<Sizing> {
        if !current_price.is_finite() || current_price <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "cannot size a position at price {}",
                current_price
            )));
        }

        let invested = available_cash.max(0.0) * self.kelly;
        Ok(Sizing {
            kelly: self.kelly,
            invested,
            quantity: invested / current_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kelly_known_value() {
        // (0.6 * 3 - 1) / 2 = 0.4
        assert_relative_eq!(kelly_fraction(0.6, 2.0).unwrap(), 0.4, epsilon = 1e-9);
    }

    #[test]
    fn test_kelly_break_even_is_zero() {
        assert_eq!(kelly_fraction(0.5, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_negative_kelly_clamps_to_zero() {
        assert_eq!(kelly_fraction(0.2, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_probability() {
        for p in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                kelly_fraction(p, 2.0),
                Err(EngineError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_invalid_odds() {
        assert!(kelly_fraction(0.6, 0.0).is_err());
        assert!(kelly_fraction(0.6, -1.0).is_err());
    }

    #[test]
    fn test_sizer_quantity() {
        let sizer = KellySizer::new(KellyConfig::default()).unwrap();
        let sizing = sizer.size(10_000.0, 100.0).unwrap();

        assert_relative_eq!(sizing.kelly, 0.4, epsilon = 1e-9);
        assert_relative_eq!(sizing.invested, 4_000.0, epsilon = 1e-9);
        assert_relative_eq!(sizing.quantity, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_half_kelly() {
        let sizer = KellySizer::new(KellyConfig {
            fraction: 0.5,
            ..Default::default()
        })
        .unwrap();
        assert_relative_eq!(sizer.fraction(), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_sizing_uses_current_cash() {
        let sizer = KellySizer::new(KellyConfig::default()).unwrap();
        let first = sizer.size(10_000.0, 100.0).unwrap();
        let second = sizer.size(6_000.0, 100.0).unwrap();
        assert_relative_eq!(second.invested, 2_400.0, epsilon = 1e-9);
        assert!(second.quantity < first.quantity);
    }

    #[test]
    fn test_invalid_multiplier_rejected() {
        let result = KellySizer::new(KellyConfig {
            fraction: 0.0,
            ..Default::default()
        });
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn test_invalid_price_rejected() {
        let sizer = KellySizer::new(KellyConfig::default()).unwrap();
        assert!(matches!(
            sizer.size(10_000.0, 0.0),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
