//! Simulated exchange account
//!
//! Fills market orders immediately at the last observed price, charges a flat
//! fee rate, and rejects anything the simulated balance can't cover.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::api::{BalanceSource, OrderExecutor, OrderReceipt};
use crate::error::EngineError;
use crate::Result;

/// Upbit's KRW market fee
pub const DEFAULT_FEE_RATE: f64 = 0.0005;

#[derive(Debug, Default)]
struct PaperState {
    cash: f64,
    holdings: HashMap<String, f64>,
    marks: HashMap<String, f64>,
    next_order: u64,
    fees_paid: f64,
}

#[derive(Debug)]
pub struct PaperAccount {
    quote_currency: String,
    fee_rate: f64,
    state: Mutex<PaperState>,
}

impl PaperAccount {
    pub fn new(quote_currency: impl Into<String>, initial_cash: f64, fee_rate: f64) -> Result<Self> {
        if !initial_cash.is_finite() || initial_cash < 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "initial paper cash must be non-negative, got {}",
                initial_cash
            )));
        }
        if !(0.0..1.0).contains(&fee_rate) {
            return Err(EngineError::InvalidParameter(format!(
                "paper fee rate must be in [0, 1), got {}",
                fee_rate
            )));
        }

        Ok(Self {
            quote_currency: quote_currency.into(),
            fee_rate,
            state: Mutex::new(PaperState {
                cash: initial_cash,
                ..Default::default()
            }),
        })
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    /// Total fees charged so far
    pub fn fees_paid(&self) -> Result<f64> {
        Ok(self.lock()?.fees_paid)
    }

    fn lock(&self) -> Result<MutexGuard<'_, PaperState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::Execution("paper account state poisoned".to_string()))
    }

    fn mark_for(state: &PaperState, symbol: &str) -> Result<f64> {
        state
            .marks
            .get(symbol)
            .copied()
            .filter(|p| *p > 0.0)
            .ok_or_else(|| EngineError::Execution(format!("no price observed for {}", symbol)))
    }

    fn order_id(state: &mut PaperState) -> String {
        state.next_order += 1;
        format!("paper-{}", state.next_order)
    }
}

#[async_trait]
impl OrderExecutor for PaperAccount {
    async fn buy_market(&self, symbol: &str, quote_amount: f64) -> Result<OrderReceipt> {
        let mut state = self.lock()?;
        let price = Self::mark_for(&state, symbol)?;

        if !(quote_amount > 0.0) {
            return Err(EngineError::Execution(format!(
                "buy amount must be positive, got {}",
                quote_amount
            )));
        }
        let fee = quote_amount * self.fee_rate;
        if quote_amount + fee > state.cash {
            return Err(EngineError::Execution(format!(
                "insufficient {}: need {:.2}, have {:.2}",
                self.quote_currency,
                quote_amount + fee,
                state.cash
            )));
        }

        let quantity = quote_amount / price;
        state.cash -= quote_amount + fee;
        state.fees_paid += fee;
        *state.holdings.entry(symbol.to_string()).or_insert(0.0) += quantity;
        let order_id = Self::order_id(&mut state);

        tracing::info!(
            "📝 Paper buy {}: {:.8} @ {:.2} (fee {:.2}, order {})",
            symbol,
            quantity,
            price,
            fee,
            order_id
        );

        Ok(OrderReceipt {
            order_id: Some(order_id),
            fee,
        })
    }

    async fn sell_market(&self, symbol: &str, quantity: f64) -> Result<OrderReceipt> {
        let mut state = self.lock()?;
        let price = Self::mark_for(&state, symbol)?;

        let held = state.holdings.get(symbol).copied().unwrap_or(0.0);
        if !(quantity > 0.0) || quantity > held + 1e-12 {
            return Err(EngineError::Execution(format!(
                "cannot sell {} {}: holding {}",
                quantity, symbol, held
            )));
        }

        let proceeds = quantity * price;
        let fee = proceeds * self.fee_rate;
        state.cash += proceeds - fee;
        state.fees_paid += fee;
        let remaining = (held - quantity).max(0.0);
        state.holdings.insert(symbol.to_string(), remaining);
        let order_id = Self::order_id(&mut state);

        tracing::info!(
            "📝 Paper sell {}: {:.8} @ {:.2} (fee {:.2}, order {})",
            symbol,
            quantity,
            price,
            fee,
            order_id
        );

        Ok(OrderReceipt {
            order_id: Some(order_id),
            fee,
        })
    }

    fn observe_price(&self, symbol: &str, price: f64) {
        match self.state.lock() {
            Ok(mut state) => {
                state.marks.insert(symbol.to_string(), price);
            }
            Err(_) => tracing::warn!("Paper account state poisoned, dropping price for {}", symbol),
        }
    }
}

#[async_trait]
impl BalanceSource for PaperAccount {
    async fn cash_balance(&self, currency: &str) -> Result<f64> {
        if currency != self.quote_currency {
            return Ok(0.0);
        }
        Ok(self.lock()?.cash)
    }

    async fn position_quantity(&self, symbol: &str) -> Result<f64> {
        Ok(self.lock()?.holdings.get(symbol).copied().unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn account() -> PaperAccount {
        let account = PaperAccount::new("KRW", 1_000_000.0, 0.001).unwrap();
        account.observe_price("KRW-BTC", 50_000.0);
        account
    }

    #[tokio::test]
    async fn test_buy_then_sell() {
        let account = account();

        let buy = account.buy_market("KRW-BTC", 100_000.0).await.unwrap();
        assert_eq!(buy.order_id.as_deref(), Some("paper-1"));
        assert_relative_eq!(buy.fee, 100.0, epsilon = 1e-9);
        assert_relative_eq!(
            account.position_quantity("KRW-BTC").await.unwrap(),
            2.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            account.cash_balance("KRW").await.unwrap(),
            899_900.0,
            epsilon = 1e-6
        );

        account.observe_price("KRW-BTC", 55_000.0);
        let sell = account.sell_market("KRW-BTC", 2.0).await.unwrap();
        assert_relative_eq!(sell.fee, 110.0, epsilon = 1e-9);
        assert_eq!(account.position_quantity("KRW-BTC").await.unwrap(), 0.0);
        assert_relative_eq!(
            account.cash_balance("KRW").await.unwrap(),
            1_009_790.0,
            epsilon = 1e-6
        );
        assert_relative_eq!(account.fees_paid().unwrap(), 210.0, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_rejects_overspend() {
        let account = account();
        let result = account.buy_market("KRW-BTC", 1_000_000.0).await;

        assert!(matches!(result, Err(EngineError::Execution(_))));
        assert_eq!(account.cash_balance("KRW").await.unwrap(), 1_000_000.0);
    }

    #[tokio::test]
    async fn test_rejects_oversell() {
        let account = account();
        assert!(account.sell_market("KRW-BTC", 1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_requires_observed_price() {
        let account = PaperAccount::new("KRW", 1_000_000.0, 0.0).unwrap();
        assert!(account.buy_market("KRW-ETH", 10_000.0).await.is_err());
    }

    #[tokio::test]
    async fn test_other_currency_balance_is_zero() {
        let account = account();
        assert_eq!(account.cash_balance("USDT").await.unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_fee_rate() {
        assert!(PaperAccount::new("KRW", 1_000.0, 1.5).is_err());
        assert!(PaperAccount::new("KRW", -1.0, 0.0).is_err());
    }
}
