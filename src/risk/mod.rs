// Risk management module
pub mod exits;
pub mod kelly;

pub use exits::{ExitConfig, ExitLevels, ExitPolicy, ExitReason};
pub use kelly::{kelly_fraction, KellyConfig, KellySizer, Sizing};
