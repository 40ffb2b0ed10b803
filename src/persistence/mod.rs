use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

use crate::models::{BalanceSnapshot, TradeEvent};

/// Destination for committed trade events
///
/// Writes are best-effort: a failure is logged by the caller and never rolls
/// back the transition that produced the event.
#[async_trait]
pub trait TradeSink: Send + Sync {
    async fn persist(&self, event: &TradeEvent) -> Result<()>;

    /// Account snapshot taken at startup
    async fn record_balance(&self, snapshot: &BalanceSnapshot) -> Result<()>;
}

fn trades_key(symbol: &str) -> String {
    format!("trades:{}", symbol)
}

fn balances_key(symbol: &str) -> String {
    format!("balances:{}", symbol)
}

/// Redis trade journal
///
/// Events are LPUSHed as JSON onto `trades:{symbol}`, newest at the head.
#[derive(Clone)]
pub struct RedisTradeSink {
    conn: ConnectionManager,
}

impl RedisTradeSink {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Invalid Redis URL")?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| anyhow::anyhow!("Redis connection timeout after 5 seconds"))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    /// Most recent `limit` events for a symbol, newest first
    pub async fn recent_trades(&self, symbol: &str, limit: usize) -> Result<Vec<TradeEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(trades_key(symbol), 0, limit as isize - 1)
            .await?;

        raw.iter()
            .map(|json| serde_json::from_str(json).context("Corrupt trade event in Redis"))
            .collect()
    }

    pub async fn count_trades(&self, symbol: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let count: usize = conn.llen(trades_key(symbol)).await?;
        Ok(count)
    }
}

#[async_trait]
impl TradeSink for RedisTradeSink {
    async fn persist(&self, event: &TradeEvent) -> Result<()> {
        let value = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(trades_key(&event.symbol), value)
            .await
            .context("Failed to push trade event")?;

        tracing::debug!("Persisted {} event {} to Redis", event.kind.as_str(), event.id);
        Ok(())
    }

    async fn record_balance(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        let value = serde_json::to_string(snapshot)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(balances_key(&snapshot.symbol), value)
            .await
            .context("Failed to push balance snapshot")?;
        Ok(())
    }
}

/// Journal that only writes to the log, used when no Redis is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTradeSink;

#[async_trait]
impl TradeSink for LogTradeSink {
    async fn persist(&self, event: &TradeEvent) -> Result<()> {
        tracing::info!("Trade recorded: {}", event.summary());
        Ok(())
    }

    async fn record_balance(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        tracing::info!("Balance recorded: {}", snapshot.summary());
        Ok(())
    }
}
