pub mod contributions;
pub mod covariance;
pub mod shrinkage;

pub use contributions::{annualized_volatility, risk_contributions, RiskContribution};
pub use covariance::{complete_case_returns, estimate_covariance};
pub use shrinkage::ledoit_wolf;
