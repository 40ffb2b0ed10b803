use ::config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::api::Interval;
use crate::error::EngineError;
use crate::execution::paper::DEFAULT_FEE_RATE;
use crate::indicators::{YingYangIndicator, YingYangParams};
use crate::risk::{ExitConfig, ExitPolicy, KellyConfig, KellySizer};
use crate::strategy::SignalConfig;
use crate::Result;

const ENV_PREFIX: &str = "YYL";

/// Runtime configuration for the trading engine
///
/// Loaded from defaults overlaid with `YYL_`-prefixed environment variables.
/// Nested fields use a double underscore, e.g. `YYL_KELLY__WIN_PROBABILITY=0.55`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbol: String,
    pub quote_currency: String,
    pub interval: Interval,
    /// Candles fetched per cycle
    pub candle_count: usize,
    pub indicator: YingYangParams,
    pub signal: SignalConfig,
    pub kelly: KellyConfig,
    pub exits: ExitConfig,
    /// Exchange minimum order in quote currency
    pub min_order_value: f64,
    pub paper_fee_rate: f64,
    pub initial_cash: f64,
    /// Also persist NoOp events
    pub record_noop: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "KRW-BTC".to_string(),
            quote_currency: "KRW".to_string(),
            interval: Interval::Minutes(30),
            candle_count: 100,
            indicator: YingYangParams::default(),
            signal: SignalConfig::default(),
            kelly: KellyConfig::default(),
            exits: ExitConfig::default(),
            min_order_value: 5_000.0,
            paper_fee_rate: DEFAULT_FEE_RATE,
            initial_cash: 1_000_000.0,
            record_noop: false,
            log_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load `.env` files, then overlay the environment on the defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        dotenvy::from_filename("config/.env").ok();

        Self::from_env(Environment::with_prefix(ENV_PREFIX))
    }

    /// Build from an explicit environment source
    pub fn from_env(env: Environment) -> Result<Self> {
        let settings = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(env.prefix_separator("_").separator("__").try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no cycle could run with
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(EngineError::InvalidParameter("symbol must not be empty".to_string()));
        }
        if self.quote_currency.trim().is_empty() {
            return Err(EngineError::InvalidParameter(
                "quote_currency must not be empty".to_string(),
            ));
        }

        YingYangIndicator::new(self.indicator)?;
        self.signal.validate()?;
        KellySizer::new(self.kelly)?;
        ExitPolicy::new(self.exits.clone())?;

        let need = self.signal.min_candles();
        if self.candle_count < need {
            return Err(EngineError::InvalidParameter(format!(
                "candle_count {} is below the {} candles a decision needs",
                self.candle_count, need
            )));
        }
        if !self.min_order_value.is_finite() || self.min_order_value < 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "min_order_value must be non-negative, got {}",
                self.min_order_value
            )));
        }
        if !(0.0..1.0).contains(&self.paper_fee_rate) {
            return Err(EngineError::InvalidParameter(format!(
                "paper_fee_rate must be in [0, 1), got {}",
                self.paper_fee_rate
            )));
        }
        if !self.initial_cash.is_finite() || self.initial_cash < 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "initial_cash must be non-negative, got {}",
                self.initial_cash
            )));
        }
        Ok(())
    }

    /// Settings that are valid but degrade the output
    ///
    /// Returned rather than logged so the caller can report them once logging is up.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let Ok(indicator) = YingYangIndicator::new(self.indicator) else {
            return warnings;
        };
        let warmup = indicator.min_candles_for_full_output();
        if self.candle_count < warmup {
            warnings.push(format!(
                "candle_count {} is shorter than the {} candle indicator warm-up; scaled cycle will read 0",
                self.candle_count, warmup
            ));
        }
        warnings
    }
}

/// Secrets read from plain environment variables
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub slack_webhook_url: Option<String>,
    pub redis_url: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            slack_webhook_url: non_empty("SLACK_WEBHOOK_URL"),
            redis_url: non_empty("REDIS_URL"),
        }
    }
}
