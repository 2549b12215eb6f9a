use std::sync::Arc;
use std::time::Duration;

use portfolio_core::{CancelFlag, EngineError, EngineResult, InvestorProfile, PricePanel};
use tokio::task::JoinError;
use tracing::{error, warn};

use crate::pipeline::{PortfolioPipeline, PredictiveOutcome};
use crate::report::AllocationReport;

/// Runs the CPU-bound pipeline on the blocking pool under a deadline.
///
/// On timeout the shared cancel flag is raised so in-flight fold training
/// stops at its next tree, and the request resolves through the heuristic
/// allocation with `FallbackCause::Cancelled`.
#[derive(Debug, Clone)]
pub struct BackgroundRunner {
    pipeline: Arc<PortfolioPipeline>,
    timeout: Duration,
}

impl BackgroundRunner {
    pub fn new(pipeline: PortfolioPipeline) -> Self {
        let timeout = pipeline.config().pipeline_timeout();
        Self {
            pipeline: Arc::new(pipeline),
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pipeline(&self) -> &PortfolioPipeline {
        &self.pipeline
    }

    pub async fn run(&self, prices: Arc<PricePanel>, profile: InvestorProfile) -> EngineResult<AllocationReport> {
        self.run_with_cancel(prices, profile, CancelFlag::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        prices: Arc<PricePanel>,
        profile: InvestorProfile,
        cancel: CancelFlag,
    ) -> EngineResult<AllocationReport> {
        profile.validate()?;

        let pipeline = Arc::clone(&self.pipeline);
        let worker_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || pipeline.run_predictive(&prices, &worker_cancel));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => self.resolve_joined(joined, &profile),
            Err(_) => {
                cancel.cancel();
                warn!("Pipeline exceeded {:?}; cancelling", self.timeout);
                self.pipeline.resolve(Err(EngineError::Cancelled), &profile)
            }
        }
    }

    /// A worker that panicked surfaces as [`EngineError::TaskFailed`]; a task
    /// aborted by runtime shutdown counts as cancelled.
    fn resolve_joined(
        &self,
        joined: Result<EngineResult<PredictiveOutcome>, JoinError>,
        profile: &InvestorProfile,
    ) -> EngineResult<AllocationReport> {
        match joined {
            Ok(outcome) => self.pipeline.resolve(outcome, profile),
            Err(join_err) if join_err.is_cancelled() => {
                warn!("Pipeline task was aborted");
                self.pipeline.resolve(Err(EngineError::Cancelled), profile)
            }
            Err(join_err) => {
                error!("Pipeline task failed: {join_err}");
                Err(EngineError::TaskFailed(join_err.to_string()))
            }
        }
    }
}
