use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STRATEGY_TAG: &str = "YingYangVolatility";

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Entry decision produced by the signal logic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Entry {
    Long,
    Short,
    Neutral,
}

/// Kind of trade event emitted by a decision cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeKind {
    Buy,
    Sell,
    StopLoss,
    TakeProfit,
    NoOp,
}

impl TradeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Buy => "Buy",
            TradeKind::Sell => "Sell",
            TradeKind::StopLoss => "StopLoss",
            TradeKind::TakeProfit => "TakeProfit",
            TradeKind::NoOp => "NoOp",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeStatus {
    Completed,
    Skipped,
}

/// Record of one decision cycle's outcome
///
/// Constructed through [`TradeEvent::new`], which is the only place defaults
/// are filled in. Never mutated after it leaves the position manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeEvent {
    pub id: Uuid,
    pub kind: TradeKind,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub fee: f64,
    pub realized_pnl: Option<f64>,
    pub reason: String,
    pub strategy_tag: String,
    pub status: TradeStatus,
    pub related_trade_id: Option<Uuid>,
    pub order_id: Option<String>,
}

impl TradeEvent {
    pub fn new(
        kind: TradeKind,
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        price: f64,
        quantity: f64,
        reason: impl Into<String>,
    ) -> Self {
        let status = if kind == TradeKind::NoOp {
            TradeStatus::Skipped
        } else {
            TradeStatus::Completed
        };

        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp,
            symbol: symbol.into(),
            price,
            quantity,
            fee: 0.0,
            realized_pnl: None,
            reason: reason.into(),
            strategy_tag: STRATEGY_TAG.to_string(),
            status,
            related_trade_id: None,
            order_id: None,
        }
    }

    /// NoOp marker for a cycle that changed nothing
    pub fn no_op(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        price: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(TradeKind::NoOp, symbol, timestamp, price, 0.0, reason)
    }

    pub fn with_fee(mut self, fee: f64) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_realized_pnl(mut self, pnl: f64) -> Self {
        self.realized_pnl = Some(pnl);
        self
    }

    pub fn with_related_trade(mut self, id: Option<Uuid>) -> Self {
        self.related_trade_id = id;
        self
    }

    pub fn with_order_id(mut self, order_id: Option<String>) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn is_no_op(&self) -> bool {
        self.kind == TradeKind::NoOp
    }

    /// One-line human readable summary, used for notifications
    pub fn summary(&self) -> String {
        match self.kind {
            TradeKind::Buy => format!(
                "Buy order executed at {:.2} for {:.8} {}.",
                self.price, self.quantity, self.symbol
            ),
            TradeKind::NoOp => format!("No action for {}: {}", self.symbol, self.reason),
            _ => format!(
                "{} executed at {:.2} for {:.8} {} (P/L: {:.2}). Reason: {}",
                self.kind.as_str(),
                self.price,
                self.quantity,
                self.symbol,
                self.realized_pnl.unwrap_or(0.0),
                self.reason
            ),
        }
    }
}

/// Cash and holdings tracked by the position manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Balance {
    pub cash: f64,
    pub symbol_quantity: f64,
}

/// Account state recorded when the bot starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub quote_currency: String,
    pub cash: f64,
    pub symbol: String,
    pub quantity: f64,
    /// None when no price could be fetched
    pub price: Option<f64>,
    pub coin_value: f64,
    pub total_value: f64,
}

impl BalanceSnapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        quote_currency: impl Into<String>,
        cash: f64,
        symbol: impl Into<String>,
        quantity: f64,
        price: Option<f64>,
    ) -> Self {
        let coin_value = price.map_or(0.0, |p| quantity * p);
        Self {
            timestamp,
            quote_currency: quote_currency.into(),
            cash,
            symbol: symbol.into(),
            quantity,
            price,
            coin_value,
            total_value: cash + coin_value,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{:.2} {} cash, {:.8} {} worth {:.2}. Total: {:.2}",
            self.cash, self.quote_currency, self.quantity, self.symbol, self.coin_value, self.total_value
        )
    }
}
