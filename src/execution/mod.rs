// Order execution, position state and the decision cycle
pub mod engine;
pub mod paper;
pub mod position_manager;

pub use engine::{run_scheduled, AppContext, CycleReport, TradingEngine};
pub use paper::PaperAccount;
pub use position_manager::{PlannedAction, Position, PositionManager, PositionStatus};
