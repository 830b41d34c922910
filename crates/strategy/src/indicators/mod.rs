pub mod atr;
pub mod rsi;
pub mod supertrend;

pub use atr::{true_range, AtrIndicator};
pub use rsi::RsiIndicator;
pub use supertrend::{SupertrendIndicator, SupertrendPoint};
