pub mod engine;
pub mod models;

pub use engine::{max_drawdown, summarize, Backtester};
pub use models::*;
