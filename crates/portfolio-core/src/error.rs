use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Solver infeasible: {0}")]
    SolverInfeasible(String),

    #[error("Degenerate covariance: {0}")]
    DegenerateCovariance(String),

    #[error("Pipeline cancelled before completion")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pipeline task failed: {0}")]
    TaskFailed(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// The fallback cause this error maps to, or `None` for contract
    /// violations and crashed workers, which propagate to the caller.
    pub fn fallback_cause(&self) -> Option<FallbackCause> {
        match self {
            EngineError::InsufficientData(_) => Some(FallbackCause::InsufficientData),
            EngineError::SolverInfeasible(_) => Some(FallbackCause::SolverInfeasible),
            EngineError::DegenerateCovariance(_) => Some(FallbackCause::DegenerateCovariance),
            EngineError::Cancelled => Some(FallbackCause::Cancelled),
            EngineError::InvalidInput(_) | EngineError::TaskFailed(_) => None,
        }
    }
}

/// Why the predictive path handed over to the heuristic allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackCause {
    InsufficientData,
    SolverInfeasible,
    DegenerateCovariance,
    Cancelled,
}

impl FallbackCause {
    pub fn label(&self) -> &'static str {
        match self {
            FallbackCause::InsufficientData => "insufficient data",
            FallbackCause::SolverInfeasible => "solver infeasible",
            FallbackCause::DegenerateCovariance => "degenerate covariance",
            FallbackCause::Cancelled => "cancelled or timed out",
        }
    }
}

impl std::fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
