//! Decision cycle and scheduler
//!
//! One cycle fetches candles, evaluates the strategy, plans a position
//! transition, places the order, and only then commits the transition
//! together with its trade event. Persistence and notification run after the
//! commit and never undo it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::position_manager::{PlannedAction, PositionManager};
use crate::api::{BalanceSource, MarketDataSource, OrderExecutor};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::indicators::validate_candles;
use crate::models::{Balance, BalanceSnapshot, Entry, TradeEvent};
use crate::notify::Notifier;
use crate::persistence::TradeSink;
use crate::risk::{ExitPolicy, KellySizer};
use crate::strategy::signals::validate_candle_uniformity;
use crate::strategy::{DecisionRecord, Strategy, YingYangStrategy};
use crate::Result;

/// Seconds after a candle boundary before the cycle runs, so the new candle exists
const CANDLE_SETTLE_SECS: u64 = 5;

/// Collaborators shared by every cycle
#[derive(Clone)]
pub struct AppContext {
    pub market_data: Arc<dyn MarketDataSource>,
    pub executor: Arc<dyn OrderExecutor>,
    pub balances: Arc<dyn BalanceSource>,
    pub sink: Arc<dyn TradeSink>,
    pub notifier: Arc<dyn Notifier>,
    pub shutdown: CancellationToken,
}

/// Outcome of one decision cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub event: TradeEvent,
    /// None when the history was too short to decide
    pub decision: Option<DecisionRecord>,
    pub balance: Balance,
}

pub struct TradingEngine {
    config: EngineConfig,
    strategy: Box<dyn Strategy>,
    positions: PositionManager,
    initial_value: f64,
}

impl TradingEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let strategy = YingYangStrategy::new(config.indicator, config.signal.clone())?;
        let positions = PositionManager::new(
            config.symbol.clone(),
            config.initial_cash,
            KellySizer::new(config.kelly)?,
            ExitPolicy::new(config.exits.clone())?,
        )
        .with_min_order_value(config.min_order_value);

        Ok(Self {
            initial_value: config.initial_cash,
            config,
            strategy: Box::new(strategy),
            positions,
        })
    }

    /// Swap in a different decision rule
    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    /// Read the account, announce the start, and seed the tracked cash
    pub async fn startup(&mut self, ctx: &AppContext) -> Result<Balance> {
        let cash = ctx.balances.cash_balance(&self.config.quote_currency).await?;
        let quantity = ctx.balances.position_quantity(&self.config.symbol).await?;

        tracing::info!(
            "Current {} balance: {:.2}, {} held: {:.8}",
            self.config.quote_currency,
            cash,
            self.config.symbol,
            quantity
        );
        if quantity > 0.0 {
            tracing::warn!(
                "Existing {} holdings are not managed by the engine; it starts flat",
                self.config.symbol
            );
        }

        self.positions.seed_cash(cash)?;
        self.initial_value = cash;
        self.record_balance(ctx, cash, quantity).await;

        let message = format!(
            "Trading bot started for {} ({} candles, {}). Cash: {:.2} {}",
            self.config.symbol,
            self.config.interval,
            self.strategy.name(),
            cash,
            self.config.quote_currency
        );
        notify_best_effort(ctx, &message).await;

        Ok(Balance {
            cash,
            symbol_quantity: quantity,
        })
    }

    /// Tell the notifier the bot has stopped; a failed send is only logged
    pub async fn announce_stop(&self, ctx: &AppContext) {
        let message = format!("Trading bot stopped for {}.", self.config.symbol);
        notify_best_effort(ctx, &message).await;
    }

    /// Run one decision cycle
    pub async fn run_cycle(&mut self, ctx: &AppContext) -> Result<CycleReport> {
        let symbol = self.config.symbol.clone();
        let interval = self.config.interval;

        let candles = ctx
            .market_data
            .fetch_candles(&symbol, interval, self.config.candle_count)
            .await?;
        let latest = candles
            .last()
            .ok_or_else(|| EngineError::DataUnavailable(format!("no candles for {}", symbol)))?;
        let (price, timestamp) = (latest.close, latest.timestamp);
        // Bad closes or ordering abort here, before any strategy or position work
        validate_candles(&candles)?;

        if let Err(e) = validate_candle_uniformity(&candles, interval.seconds() as u64) {
            tracing::warn!("{} candle history has gaps: {}", symbol, e);
        }
        ctx.executor.observe_price(&symbol, price);

        let decision = match self.strategy.evaluate(&candles) {
            Ok(decision) => Some(decision),
            Err(e) if e.is_insufficient_data() => {
                tracing::warn!("Skipping signal for {}: {}", symbol, e);
                None
            }
            Err(e) => return Err(e),
        };
        let entry = decision.as_ref().map_or(Entry::Neutral, |d| d.entry);

        let action = self
            .positions
            .plan(entry, decision.as_ref(), price, timestamp)?;

        let receipt = match &action {
            PlannedAction::Enter { .. } => Some(
                ctx.executor
                    .buy_market(&symbol, action.order_value())
                    .await
                    .map_err(|e| {
                        tracing::error!("Buy order for {} failed: {}", symbol, e);
                        e
                    })?,
            ),
            PlannedAction::Exit { quantity, .. } => Some(
                ctx.executor
                    .sell_market(&symbol, *quantity)
                    .await
                    .map_err(|e| {
                        tracing::error!("Sell order for {} failed: {}", symbol, e);
                        e
                    })?,
            ),
            PlannedAction::Hold { .. } => None,
        };

        let event = self.positions.commit(action, receipt)?;
        self.record(ctx, &event).await;
        self.log_summary(price, &event);

        Ok(CycleReport {
            event,
            decision,
            balance: self.positions.balance(),
        })
    }

    /// Journal the starting account state; a missing price only zeroes the coin value
    async fn record_balance(&self, ctx: &AppContext, cash: f64, quantity: f64) {
        let price = match ctx
            .market_data
            .fetch_candles(&self.config.symbol, self.config.interval, 1)
            .await
        {
            Ok(candles) => candles.last().map(|c| c.close),
            Err(e) => {
                tracing::warn!("No current price for {} balance snapshot: {}", self.config.symbol, e);
                None
            }
        };

        let snapshot = BalanceSnapshot::new(
            Utc::now(),
            self.config.quote_currency.clone(),
            cash,
            self.config.symbol.clone(),
            quantity,
            price,
        );
        tracing::info!("💰 {}", snapshot.summary());
        if let Err(e) = ctx.sink.record_balance(&snapshot).await {
            tracing::warn!("Failed to record balance snapshot: {:#}", e);
        }
    }

    async fn record(&self, ctx: &AppContext, event: &TradeEvent) {
        if !event.is_no_op() || self.config.record_noop {
            if let Err(e) = ctx.sink.persist(event).await {
                tracing::warn!("Failed to persist {} event {}: {:#}", event.kind.as_str(), event.id, e);
            }
        }
        if !event.is_no_op() {
            notify_best_effort(ctx, &event.summary()).await;
        }
    }

    fn log_summary(&self, price: f64, event: &TradeEvent) {
        let value = self.positions.portfolio_value(price);
        let pnl = value - self.initial_value;
        let pnl_pct = if self.initial_value > 0.0 {
            pnl / self.initial_value * 100.0
        } else {
            0.0
        };

        tracing::info!(
            "📊 {} @ {:.2} | {} | Value: {:.2} ({:+.2}%) | Realized: {:.2} over {} trades | Unrealized: {:.2}",
            self.config.symbol,
            price,
            event.kind.as_str(),
            value,
            pnl_pct,
            self.positions.total_realized_pnl(),
            self.positions.closed_trades(),
            self.positions.unrealized_pnl(price)
        );
    }
}

async fn notify_best_effort(ctx: &AppContext, message: &str) {
    if let Err(e) = ctx.notifier.notify(message).await {
        tracing::warn!("Notification failed: {:#}", e);
    }
}

/// Time from `now` until the next multiple of `period_secs` since the epoch
pub fn until_next_boundary(now: DateTime<Utc>, period_secs: u64) -> Duration {
    if period_secs == 0 {
        return Duration::ZERO;
    }
    let period_ms = period_secs as i64 * 1000;
    let into_period = now.timestamp_millis().rem_euclid(period_ms);
    if into_period == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - into_period) as u64)
    }
}

/// Run cycles on candle boundaries until the shutdown token fires
///
/// Cancellation is only observed while waiting; an in-flight cycle always
/// finishes. Failed cycles are logged and reported, then the loop continues.
pub async fn run_scheduled(engine: &mut TradingEngine, ctx: &AppContext) -> Result<()> {
    let period_secs = engine.config().interval.seconds() as u64;
    let delay = until_next_boundary(Utc::now(), period_secs) + Duration::from_secs(CANDLE_SETTLE_SECS);
    tracing::info!(
        "First cycle for {} in {:?}, then every {}",
        engine.config().symbol,
        delay,
        engine.config().interval
    );

    let mut ticker = interval_at(Instant::now() + delay, Duration::from_secs(period_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tracing::info!("💹 Cycle at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        match engine.run_cycle(ctx).await {
            Ok(report) => {
                tracing::debug!("Cycle finished: {}", report.event.summary());
            }
            Err(e) => {
                tracing::error!("Error in trading cycle: {}", e);
                notify_best_effort(ctx, &format!("Error in trading cycle: {}", e)).await;
            }
        }

        if ctx.shutdown.is_cancelled() {
            break;
        }
    }

    tracing::info!("Scheduler for {} stopped", engine.config().symbol);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_boundary_from_mid_period() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 17, 30).unwrap();
        assert_eq!(until_next_boundary(now, 1800), Duration::from_secs(12 * 60 + 30));
    }

    #[test]
    fn test_boundary_exactly_on_mark() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        assert_eq!(until_next_boundary(now, 1800), Duration::ZERO);
    }

    #[test]
    fn test_daily_boundary_is_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        assert_eq!(until_next_boundary(now, 86_400), Duration::from_secs(3600));
    }
}
