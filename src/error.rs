use thiserror::Error;

/// Errors raised by the trading core and its collaborators
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing candle data. Aborts the cycle before any mutation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// History shorter than the required lookback. Cycles resolve this to a no-op.
    #[error("insufficient data: have {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },

    /// Bad configuration value, raised before any cycle runs
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transition not allowed from the current position state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Order placement failed; the order is never assumed filled
    #[error("execution error: {0}")]
    Execution(String),

    /// Market data source returned nothing usable
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    /// True for errors the cycle treats as "nothing to do" rather than a failure
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, EngineError::InsufficientData { .. })
    }
}

impl From<::config::ConfigError> for EngineError {
    fn from(e: ::config::ConfigError) -> Self {
        EngineError::Config(e.to_string())
    }
}
