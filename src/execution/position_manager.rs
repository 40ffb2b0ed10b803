use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::OrderReceipt;
use crate::error::EngineError;
use crate::models::{Balance, Entry, TradeEvent, TradeKind};
use crate::risk::{ExitLevels, ExitPolicy, ExitReason, KellySizer};
use crate::strategy::DecisionRecord;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Flat,
    Long,
}

/// The single position held for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub status: PositionStatus,
    pub entry_price: f64, // 0 while flat
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub opened_at: Option<DateTime<Utc>>,
    pub entry_event_id: Option<Uuid>, // Buy event that opened it
}

impl Position {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            status: PositionStatus::Flat,
            entry_price: 0.0,
            quantity: 0.0,
            stop_loss: None,
            take_profit: None,
            opened_at: None,
            entry_event_id: None,
        }
    }

    pub fn is_long(&self) -> bool {
        self.status == PositionStatus::Long
    }

    pub fn levels(&self) -> ExitLevels {
        ExitLevels {
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
        }
    }
}

/// What a cycle intends to do, computed without touching any state
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    Hold {
        price: f64,
        timestamp: DateTime<Utc>,
        reason: String,
    },
    Enter {
        price: f64,
        quantity: f64,
        levels: ExitLevels,
        timestamp: DateTime<Utc>,
    },
    Exit {
        price: f64,
        quantity: f64,
        reason: ExitReason,
        timestamp: DateTime<Utc>,
    },
}

impl PlannedAction {
    /// Quote amount spent by an entry
    pub fn order_value(&self) -> f64 {
        match self {
            PlannedAction::Enter {
                price, quantity, ..
            }
            | PlannedAction::Exit {
                price, quantity, ..
            } => price * quantity,
            PlannedAction::Hold { .. } => 0.0,
        }
    }
}

/// Long-only, single-position state machine
///
/// Transitions are split in two: [`PositionManager::plan`] decides, and
/// [`PositionManager::commit`] applies the plan and builds its trade event in
/// one step. Anything that fails in between (order placement) leaves the
/// position and balance untouched.
#[derive(Debug, Clone)]
pub struct PositionManager {
    position: Position,
    balance: Balance,
    sizer: KellySizer,
    exits: ExitPolicy,
    min_order_value: f64,
    total_realized_pnl: f64,
    closed_trades: u32,
}

impl PositionManager {
    pub fn new(
        symbol: impl Into<String>,
        initial_cash: f64,
        sizer: KellySizer,
        exits: ExitPolicy,
    ) -> Self {
        let position = Position::flat(symbol);
        tracing::info!(
            "PositionManager initialized for {} with cash {:.2} and Kelly fraction {:.4}",
            position.symbol,
            initial_cash,
            sizer.fraction()
        );

        Self {
            position,
            balance: Balance {
                cash: initial_cash,
                symbol_quantity: 0.0,
            },
            sizer,
            exits,
            min_order_value: 0.0,
            total_realized_pnl: 0.0,
            closed_trades: 0,
        }
    }

    /// Skip entries whose quote amount is below the exchange minimum
    pub fn with_min_order_value(mut self, min_order_value: f64) -> Self {
        self.min_order_value = min_order_value.max(0.0);
        self
    }

    /// Replace the tracked cash with the account's actual balance
    ///
    /// Only allowed while flat.
    pub fn seed_cash(&mut self, cash: f64) -> Result<()> {
        if self.position.is_long() {
            return Err(EngineError::InvalidState(
                "cannot reseed cash while a position is open".to_string(),
            ));
        }
        if !cash.is_finite() || cash < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "cash balance must be non-negative, got {}",
                cash
            )));
        }
        self.balance.cash = cash;
        Ok(())
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn symbol(&self) -> &str {
        &self.position.symbol
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.total_realized_pnl
    }

    pub fn closed_trades(&self) -> u32 {
        self.closed_trades
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        if self.position.is_long() {
            (current_price - self.position.entry_price) * self.position.quantity
        } else {
            0.0
        }
    }

    /// Cash plus holdings marked at `current_price`
    pub fn portfolio_value(&self, current_price: f64) -> f64 {
        self.balance.cash + self.balance.symbol_quantity * current_price
    }

    /// Risk exit due for the open long at `current_price`, if any
    pub fn check_risk(&self, current_price: f64) -> Option<ExitReason> {
        if !self.position.is_long() {
            return None;
        }
        self.exits.check(&self.position.levels(), current_price)
    }

    /// Decide this cycle's transition
    ///
    /// Risk exits on an open long are checked first and win over the signal.
    pub fn plan(
        &self,
        entry: Entry,
        decision: Option<&DecisionRecord>,
        current_price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<PlannedAction> {
        let hold = |reason: &str| PlannedAction::Hold {
            price: current_price,
            timestamp,
            reason: reason.to_string(),
        };

        match self.position.status {
            PositionStatus::Long => {
                let reason = match self.check_risk(current_price) {
                    Some(reason) => Some(reason),
                    None if entry == Entry::Short => Some(ExitReason::StrategySell),
                    None => None,
                };

                Ok(match reason {
                    Some(reason) => PlannedAction::Exit {
                        price: current_price,
                        quantity: self.position.quantity,
                        reason,
                        timestamp,
                    },
                    None => hold("holding long position"),
                })
            }
            PositionStatus::Flat => {
                if entry != Entry::Long {
                    return Ok(hold(match entry {
                        Entry::Short => "short signal while flat",
                        _ => "no signal",
                    }));
                }

                let sizing = self.sizer.size(self.balance.cash, current_price)?;
                if sizing.quantity <= 0.0 {
                    return Ok(hold("kelly fraction is zero"));
                }
                if sizing.invested < self.min_order_value {
                    tracing::warn!(
                        "Entry of {:.2} is below minimum order value {:.2}, skipping",
                        sizing.invested,
                        self.min_order_value
                    );
                    return Ok(hold("order value below minimum"));
                }

                Ok(PlannedAction::Enter {
                    price: current_price,
                    quantity: sizing.quantity,
                    levels: self.exits.levels_for_entry(current_price, decision),
                    timestamp,
                })
            }
        }
    }

    /// Apply a planned action and emit its trade event
    pub fn commit(&mut self, action: PlannedAction, receipt: Option<OrderReceipt>) -> Result<TradeEvent> {
        let (fee, order_id) = receipt
            .map(|r| (r.fee, r.order_id))
            .unwrap_or((0.0, None));

        let event = match action {
            PlannedAction::Hold {
                price,
                timestamp,
                reason,
            } => TradeEvent::no_op(self.position.symbol.clone(), timestamp, price, reason),
            PlannedAction::Enter {
                price,
                quantity,
                levels,
                timestamp,
            } => self.enter_position(price, quantity, levels, timestamp)?,
            PlannedAction::Exit {
                price,
                reason,
                timestamp,
                ..
            } => self.exit_position(price, reason, timestamp),
        };

        Ok(event.with_fee(fee).with_order_id(order_id))
    }

    /// Open a long. Fails if a long is already open.
    pub fn enter_position(
        &mut self,
        price: f64,
        quantity: f64,
        levels: ExitLevels,
        timestamp: DateTime<Utc>,
    ) -> Result<TradeEvent> {
        if self.position.is_long() {
            return Err(EngineError::InvalidState(format!(
                "already holding a long position in {}",
                self.position.symbol
            )));
        }
        if !(price > 0.0) || !(quantity >= 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "cannot enter at price {} with quantity {}",
                price, quantity
            )));
        }

        let event = TradeEvent::new(
            TradeKind::Buy,
            self.position.symbol.clone(),
            timestamp,
            price,
            quantity,
            "Buy signal triggered.",
        );

        self.position = Position {
            id: Uuid::new_v4(),
            symbol: self.position.symbol.clone(),
            status: PositionStatus::Long,
            entry_price: price,
            quantity,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            opened_at: Some(timestamp),
            entry_event_id: Some(event.id),
        };
        self.balance.cash -= quantity * price;
        self.balance.symbol_quantity += quantity;

        tracing::info!(
            "Entered long position: {:.8} {} at {:.2}. Cash: {:.2} (stop {:?}, take {:?})",
            quantity,
            self.position.symbol,
            price,
            self.balance.cash,
            levels.stop_loss,
            levels.take_profit
        );

        Ok(event)
    }

    /// Close the long at `price`
    ///
    /// Exiting while flat is a no-op with zero realized P/L.
    pub fn exit_position(
        &mut self,
        price: f64,
        reason: ExitReason,
        timestamp: DateTime<Utc>,
    ) -> TradeEvent {
        if !self.position.is_long() {
            tracing::warn!("Attempted to exit a position when no position is held.");
            return TradeEvent::no_op(
                self.position.symbol.clone(),
                timestamp,
                price,
                "no position to exit",
            )
            .with_realized_pnl(0.0);
        }

        let quantity = self.position.quantity;
        let pnl = (price - self.position.entry_price) * quantity;

        let event = TradeEvent::new(
            reason.trade_kind(),
            self.position.symbol.clone(),
            timestamp,
            price,
            quantity,
            reason.as_str(),
        )
        .with_realized_pnl(pnl)
        .with_related_trade(self.position.entry_event_id);

        self.balance.cash += quantity * price;
        self.balance.symbol_quantity = (self.balance.symbol_quantity - quantity).max(0.0);
        self.total_realized_pnl += pnl;
        self.closed_trades += 1;

        tracing::info!(
            "Exited long position: {:.8} {} at {:.2}. P/L: {:.2}. Reason: {}",
            quantity,
            self.position.symbol,
            price,
            pnl,
            reason.as_str()
        );

        self.position = Position::flat(self.position.symbol.clone());
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{ExitConfig, KellyConfig};
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn manager(cash: f64) -> PositionManager {
        PositionManager::new(
            "KRW-BTC",
            cash,
            KellySizer::new(KellyConfig::default()).unwrap(),
            ExitPolicy::default(),
        )
    }

    fn fixed_levels(entry: f64) -> ExitLevels {
        ExitPolicy::default().levels_for_entry(entry, None)
    }

    #[test]
    fn test_starts_flat() {
        let pm = manager(10_000.0);
        assert_eq!(pm.position().status, PositionStatus::Flat);
        assert_eq!(pm.position().entry_price, 0.0);
        assert_eq!(pm.balance().cash, 10_000.0);
    }

    #[test]
    fn test_enter_and_exit_realizes_pnl() {
        let mut pm = manager(10_000.0);
        let buy = pm.enter_position(100.0, 1.0, fixed_levels(100.0), ts()).unwrap();

        assert_eq!(buy.kind, TradeKind::Buy);
        assert!(pm.position().is_long());
        assert_eq!(pm.position().entry_price, 100.0);
        assert_eq!(pm.balance().cash, 9_900.0);
        assert_eq!(pm.balance().symbol_quantity, 1.0);

        let sell = pm.exit_position(110.0, ExitReason::StrategySell, ts());
        assert_eq!(sell.kind, TradeKind::Sell);
        assert_eq!(sell.realized_pnl, Some(10.0));
        assert_eq!(sell.related_trade_id, Some(buy.id));
        assert_eq!(pm.position().status, PositionStatus::Flat);
        assert_eq!(pm.position().entry_price, 0.0);
        assert_eq!(pm.balance().cash, 10_010.0);
        assert_eq!(pm.balance().symbol_quantity, 0.0);
        assert_eq!(pm.total_realized_pnl(), 10.0);
        assert_eq!(pm.closed_trades(), 1);
    }

    #[test]
    fn test_reentry_requires_flat() {
        let mut pm = manager(10_000.0);
        pm.enter_position(100.0, 1.0, fixed_levels(100.0), ts()).unwrap();

        let result = pm.enter_position(105.0, 1.0, fixed_levels(105.0), ts());
        assert!(matches!(result, Err(EngineError::InvalidState(_))));
        assert_eq!(pm.position().entry_price, 100.0);

        pm.exit_position(105.0, ExitReason::StrategySell, ts());
        assert!(pm.enter_position(105.0, 1.0, fixed_levels(105.0), ts()).is_ok());
    }

    #[test]
    fn test_exit_while_flat_is_noop() {
        let mut pm = manager(10_000.0);
        let event = pm.exit_position(100.0, ExitReason::StrategySell, ts());

        assert!(event.is_no_op());
        assert_eq!(event.realized_pnl, Some(0.0));
        assert_eq!(pm.balance().cash, 10_000.0);
        assert_eq!(pm.closed_trades(), 0);
    }

    #[test]
    fn test_plan_entry_sizes_with_kelly() {
        let pm = manager(10_000.0);
        let action = pm.plan(Entry::Long, None, 100.0, ts()).unwrap();

        match action {
            PlannedAction::Enter {
                price,
                quantity,
                levels,
                ..
            } => {
                assert_eq!(price, 100.0);
                assert_relative_eq!(quantity, 40.0, epsilon = 1e-9);
                assert_relative_eq!(levels.stop_loss.unwrap(), 95.0);
            }
            other => panic!("expected entry, got {:?}", other),
        }
        // planning never mutates
        assert_eq!(pm.balance().cash, 10_000.0);
        assert!(!pm.position().is_long());
    }

    #[test]
    fn test_plan_short_while_flat_holds() {
        let pm = manager(10_000.0);
        let action = pm.plan(Entry::Short, None, 100.0, ts()).unwrap();
        assert!(matches!(action, PlannedAction::Hold { .. }));
    }

    #[test]
    fn test_plan_zero_kelly_holds() {
        let pm = PositionManager::new(
            "KRW-BTC",
            10_000.0,
            KellySizer::new(KellyConfig {
                win_probability: 0.5,
                odds: 1.0,
                fraction: 1.0,
            })
            .unwrap(),
            ExitPolicy::default(),
        );

        let action = pm.plan(Entry::Long, None, 100.0, ts()).unwrap();
        assert!(matches!(action, PlannedAction::Hold { ref reason, .. } if reason.contains("zero")));
    }

    #[test]
    fn test_plan_below_minimum_order_holds() {
        let pm = manager(10_000.0).with_min_order_value(5_000.0);
        // 40% of 10 000 = 4 000 < 5 000
        let action = pm.plan(Entry::Long, None, 100.0, ts()).unwrap();
        assert!(matches!(action, PlannedAction::Hold { ref reason, .. } if reason.contains("minimum")));
    }

    #[test]
    fn test_short_signal_closes_long() {
        let mut pm = manager(10_000.0);
        pm.enter_position(100.0, 1.0, fixed_levels(100.0), ts()).unwrap();

        let action = pm.plan(Entry::Short, None, 102.0, ts()).unwrap();
        assert!(matches!(
            action,
            PlannedAction::Exit {
                reason: ExitReason::StrategySell,
                ..
            }
        ));
    }

    #[test]
    fn test_risk_exit_wins_over_signal() {
        let mut pm = manager(10_000.0);
        pm.enter_position(100.0, 1.0, fixed_levels(100.0), ts()).unwrap();

        let action = pm.plan(Entry::Short, None, 94.0, ts()).unwrap();
        assert!(matches!(
            action,
            PlannedAction::Exit {
                reason: ExitReason::StopLoss,
                ..
            }
        ));
    }

    #[test]
    fn test_stop_loss_triggers_once() {
        let mut pm = manager(10_000.0);
        pm.enter_position(100.0, 1.0, fixed_levels(100.0), ts()).unwrap();

        let action = pm.plan(Entry::Neutral, None, 95.0, ts()).unwrap();
        let event = pm.commit(action, None).unwrap();
        assert_eq!(event.kind, TradeKind::StopLoss);
        assert_eq!(event.realized_pnl, Some(-5.0));

        // Same price next cycle: already flat
        let action = pm.plan(Entry::Neutral, None, 95.0, ts()).unwrap();
        let event = pm.commit(action, None).unwrap();
        assert!(event.is_no_op());
    }

    #[test]
    fn test_take_profit() {
        let mut pm = manager(10_000.0);
        pm.enter_position(100.0, 2.0, fixed_levels(100.0), ts()).unwrap();

        assert_eq!(pm.check_risk(109.0), None);
        assert_eq!(pm.check_risk(111.0), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn test_atr_anchored_levels_on_entry() {
        let pm = PositionManager::new(
            "KRW-BTC",
            10_000.0,
            KellySizer::new(KellyConfig::default()).unwrap(),
            ExitPolicy::new(ExitConfig {
                atr_anchored: true,
                ..Default::default()
            })
            .unwrap(),
        );
        let decision = DecisionRecord {
            timestamp: ts(),
            status_prev: -1,
            status_current: 1,
            diff: 2,
            entry: Entry::Long,
            yyl: -80.0,
            atr: 2.0,
            prev_close: 99.0,
            close: 100.0,
            stop_loss: 95.0,
            take_profit: 105.0,
        };

        let action = pm.plan(Entry::Long, Some(&decision), 100.0, ts()).unwrap();
        match action {
            PlannedAction::Enter { levels, .. } => {
                assert_eq!(levels.stop_loss, Some(95.0));
                assert_eq!(levels.take_profit, Some(105.0));
            }
            other => panic!("expected entry, got {:?}", other),
        }
    }

    #[test]
    fn test_commit_carries_receipt() {
        let mut pm = manager(10_000.0);
        let action = pm.plan(Entry::Long, None, 100.0, ts()).unwrap();
        let event = pm
            .commit(
                action,
                Some(OrderReceipt {
                    order_id: Some("paper-1".to_string()),
                    fee: 2.0,
                }),
            )
            .unwrap();

        assert_eq!(event.fee, 2.0);
        assert_eq!(event.order_id.as_deref(), Some("paper-1"));
        assert!(pm.position().is_long());
    }

    #[test]
    fn test_portfolio_value() {
        let mut pm = manager(10_000.0);
        pm.enter_position(100.0, 2.0, fixed_levels(100.0), ts()).unwrap();

        assert_eq!(pm.portfolio_value(110.0), 10_020.0);
        assert_eq!(pm.unrealized_pnl(110.0), 20.0);
    }
}
