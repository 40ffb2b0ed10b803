// Trading strategy module
pub mod signals;
pub mod yingyang;

pub use signals::{DecisionRecord, SignalConfig};
pub use yingyang::YingYangStrategy;

use crate::models::Candle;
use crate::Result;

/// Base trait for trading strategies
pub trait Strategy: Send + Sync {
    /// Evaluate the latest candle and produce an entry decision
    ///
    /// Returns `EngineError::InsufficientData` while the history is too short.
    fn evaluate(&self, candles: &[Candle]) -> Result<DecisionRecord>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
