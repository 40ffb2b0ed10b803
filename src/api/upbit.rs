use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::{Interval, MarketDataSource};
use crate::error::EngineError;
use crate::models::Candle;
use crate::Result;

const UPBIT_API_BASE: &str = "https://api.upbit.com";
const MAX_CANDLES_PER_REQUEST: usize = 200;
const RATE_LIMIT_RPS: u32 = 8; // quotation API allows 10/s per IP
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

type UpbitRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Upbit quotation API client
///
/// Cloneable; clones share one rate limiter.
#[derive(Clone)]
pub struct UpbitClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<UpbitRateLimiter>,
    initial_backoff: Duration,
}

/// Candle as returned by `/v1/candles/*`, newest first
#[derive(Debug, Deserialize)]
struct UpbitCandle {
    market: String,
    candle_date_time_utc: String,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    candle_acc_trade_volume: f64,
}

impl UpbitCandle {
    fn into_candle(self) -> AnyResult<Candle> {
        let naive = NaiveDateTime::parse_from_str(&self.candle_date_time_utc, "%Y-%m-%dT%H:%M:%S")
            .with_context(|| format!("Bad candle timestamp {}", self.candle_date_time_utc))?;

        Ok(Candle {
            symbol: self.market,
            timestamp: naive.and_utc(),
            open: self.opening_price,
            high: self.high_price,
            low: self.low_price,
            close: self.trade_price,
            volume: self.candle_acc_trade_volume,
        })
    }
}

impl UpbitClient {
    pub fn new() -> AnyResult<Self> {
        Self::with_base_url(UPBIT_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> AnyResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_second(NonZeroU32::new(RATE_LIMIT_RPS).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first retry delay; later retries double it
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    fn endpoint(&self, interval: Interval) -> String {
        match interval {
            Interval::Minutes(unit) => format!("{}/v1/candles/minutes/{}", self.base_url, unit),
            Interval::Day => format!("{}/v1/candles/days", self.base_url),
        }
    }

    /// Rate-limited GET with retry on 429, 5xx and network errors
    async fn get_with_retry(&self, url: &str, query: &[(&str, String)]) -> AnyResult<reqwest::Response> {
        let mut backoff = self.initial_backoff;

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if (status.as_u16() == 429 || status.is_server_error()) && attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Upbit returned {}, retrying in {:?} (attempt {}/{})",
                            status,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        sleep(backoff).await;
                        backoff *= 2;
                        continue;
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("Upbit API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error: {}, retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }

    /// Fetch up to `count` candles ending now, oldest first
    ///
    /// Pages backwards with the `to` parameter when more than one request's
    /// worth is asked for.
    pub async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
    ) -> AnyResult<Vec<Candle>> {
        let url = self.endpoint(interval);
        let mut newest_first: Vec<Candle> = Vec::with_capacity(count);
        let mut to: Option<DateTime<Utc>> = None;

        while newest_first.len() < count {
            let batch = (count - newest_first.len()).min(MAX_CANDLES_PER_REQUEST);
            let mut query = vec![("market", symbol.to_string()), ("count", batch.to_string())];
            if let Some(to) = to {
                query.push(("to", to.format("%Y-%m-%dT%H:%M:%SZ").to_string()));
            }

            let response = self.get_with_retry(&url, &query).await?;
            let page: Vec<UpbitCandle> = response
                .json()
                .await
                .context("Failed to parse Upbit candles")?;
            if page.is_empty() {
                break;
            }

            let received = page.len();
            let before = newest_first.len();
            for raw in page {
                let candle = raw.into_candle()?;
                if to.map_or(true, |to| candle.timestamp < to) {
                    newest_first.push(candle);
                }
            }
            if newest_first.len() == before {
                tracing::warn!(
                    "Upbit returned no candles older than {:?} for {}, stopping at {}",
                    to,
                    symbol,
                    before
                );
                break;
            }
            to = newest_first.last().map(|c| c.timestamp);

            if received < batch {
                break;
            }
        }

        newest_first.truncate(count);
        newest_first.reverse();

        tracing::debug!(
            "Fetched {} {} candles for {}",
            newest_first.len(),
            interval,
            symbol
        );
        Ok(newest_first)
    }
}

#[async_trait]
impl MarketDataSource for UpbitClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let candles = self
            .get_candles(symbol, interval, count)
            .await
            .map_err(|e| EngineError::DataUnavailable(format!("{:#}", e)))?;

        if candles.is_empty() {
            return Err(EngineError::DataUnavailable(format!(
                "no {} candles returned for {}",
                interval, symbol
            )));
        }
        Ok(candles)
    }
}
