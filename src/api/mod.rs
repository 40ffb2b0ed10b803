pub mod upbit;

pub use upbit::UpbitClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;
use crate::models::Candle;
use crate::Result;

/// Candle interval, named the way Upbit clients conventionally spell them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    Minutes(u32),
    Day,
}

impl Interval {
    const MINUTE_UNITS: [u32; 8] = [1, 3, 5, 10, 15, 30, 60, 240];

    pub fn minutes(unit: u32) -> Result<Self> {
        if Self::MINUTE_UNITS.contains(&unit) {
            Ok(Interval::Minutes(unit))
        } else {
            Err(EngineError::InvalidParameter(format!(
                "unsupported minute interval: {}",
                unit
            )))
        }
    }

    /// Length of one candle in seconds
    pub fn seconds(&self) -> i64 {
        match self {
            Interval::Minutes(unit) => *unit as i64 * 60,
            Interval::Day => 86_400,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Minutes(unit) => write!(f, "minute{}", unit),
            Interval::Day => write!(f, "day"),
        }
    }
}

impl FromStr for Interval {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s == "day" || s == "days" {
            return Ok(Interval::Day);
        }
        let unit = s
            .strip_prefix("minute")
            .and_then(|u| u.parse::<u32>().ok())
            .ok_or_else(|| EngineError::InvalidParameter(format!("unknown interval: {}", s)))?;
        Interval::minutes(unit)
    }
}

impl TryFrom<String> for Interval {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.to_string()
    }
}

/// Result of an accepted market order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: Option<String>,
    pub fee: f64,
}

/// Source of OHLCV history
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Last `count` candles, oldest first. `DataUnavailable` when nothing comes back.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Candle>>;
}

/// Places market orders. Failures are `EngineError::Execution` and never
/// assumed filled.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Spend `quote_amount` of the quote currency on `symbol`
    async fn buy_market(&self, symbol: &str, quote_amount: f64) -> Result<OrderReceipt>;

    /// Sell `quantity` units of `symbol`
    async fn sell_market(&self, symbol: &str, quantity: f64) -> Result<OrderReceipt>;

    /// Latest close seen by the engine. Simulated executors fill at it.
    fn observe_price(&self, _symbol: &str, _price: f64) {}
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn cash_balance(&self, currency: &str) -> Result<f64>;

    async fn position_quantity(&self, symbol: &str) -> Result<f64>;
}
