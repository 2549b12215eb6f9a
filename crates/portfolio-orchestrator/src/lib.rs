pub mod pipeline;
pub mod reasons;
pub mod report;
pub mod runner;
pub mod summary;

#[cfg(test)]
mod tests;

pub use pipeline::{PortfolioPipeline, PredictiveOutcome};
pub use reasons::{signal_reason, top_signals};
pub use report::AllocationReport;
pub use runner::BackgroundRunner;
pub use summary::{check_limits, summarize_weights, AlertKind, LimitAlert, PortfolioSummary};
