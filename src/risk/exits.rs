use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::TradeKind;
use crate::strategy::DecisionRecord;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    LossFloor,
    TakeProfit,
    StrategySell, // Short signal closing the long
}

impl ExitReason {
    pub fn trade_kind(&self) -> TradeKind {
        match self {
            ExitReason::StopLoss | ExitReason::LossFloor => TradeKind::StopLoss,
            ExitReason::TakeProfit => TradeKind::TakeProfit,
            ExitReason::StrategySell => TradeKind::Sell,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::LossFloor => "loss_floor",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StrategySell => "sell",
        }
    }
}

/// Exit level configuration
///
/// Fixed percentages and ATR anchoring can both be set; ATR-anchored levels
/// win when the entry came with a decision record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Stop this fraction below entry (0.05 = 5%)
    pub stop_loss_pct: Option<f64>,
    /// Take profit this fraction above entry (0.10 = 10%)
    pub take_profit_pct: Option<f64>,
    /// Use the stop/take levels of the decision that opened the position
    pub atr_anchored: bool,
    /// Absolute price at or below which any long is closed
    pub loss_floor: Option<f64>,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: Some(0.05),
            take_profit_pct: Some(0.10),
            atr_anchored: false,
            loss_floor: None,
        }
    }
}

/// Stop and take levels attached to a position at entry
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExitLevels {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ExitPolicy {
    config: ExitConfig,
}

impl ExitPolicy {
    pub fn new(config: ExitConfig) -> Result<Self> {
        for (name, pct) in [
            ("stop_loss_pct", config.stop_loss_pct),
            ("take_profit_pct", config.take_profit_pct),
        ] {
            if let Some(pct) = pct {
                if !pct.is_finite() || pct <= 0.0 {
                    return Err(EngineError::InvalidParameter(format!(
                        "{} must be positive, got {}",
                        name, pct
                    )));
                }
            }
        }
        if matches!(config.stop_loss_pct, Some(pct) if pct >= 1.0) {
            return Err(EngineError::InvalidParameter(
                "stop_loss_pct must be below 1.0".to_string(),
            ));
        }
        if let Some(floor) = config.loss_floor {
            if !floor.is_finite() || floor < 0.0 {
                return Err(EngineError::InvalidParameter(format!(
                    "loss_floor must be a non-negative price, got {}",
                    floor
                )));
            }
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    /// Levels for a new long at `entry_price`
    pub fn levels_for_entry(
        &self,
        entry_price: f64,
        decision: Option<&DecisionRecord>,
    ) -> ExitLevels {
        if self.config.atr_anchored {
            if let Some(decision) = decision {
                if decision.stop_loss >= entry_price {
                    tracing::warn!(
                        "ATR stop {:.2} is not below entry {:.2}; position will exit on the next check",
                        decision.stop_loss,
                        entry_price
                    );
                }
                return ExitLevels {
                    stop_loss: Some(decision.stop_loss),
                    take_profit: Some(decision.take_profit),
                };
            }
        }

        ExitLevels {
            stop_loss: self.config.stop_loss_pct.map(|pct| entry_price * (1.0 - pct)),
            take_profit: self
                .config
                .take_profit_pct
                .map(|pct| entry_price * (1.0 + pct)),
        }
    }

    /// Risk exit for an open long at `price`, checked stop first, then floor, then take
    pub fn check(&self, levels: &ExitLevels, price: f64) -> Option<ExitReason> {
        if matches!(levels.stop_loss, Some(stop) if price <= stop) {
            return Some(ExitReason::StopLoss);
        }
        if matches!(self.config.loss_floor, Some(floor) if price <= floor) {
            return Some(ExitReason::LossFloor);
        }
        if matches!(levels.take_profit, Some(take) if price >= take) {
            return Some(ExitReason::TakeProfit);
        }
        None
    }
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            config: ExitConfig::default(),
        }
    }
}
