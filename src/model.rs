//! # Model
//!
//! $$
//! \mu_i=\mathbb E[r_i],\qquad \Sigma=\operatorname{Cov}(r)
//! $$
//!
//! Return and risk estimation: Carhart factor regressions and Ledoit-Wolf
//! shrinkage covariance.

pub mod covariance;
pub mod expected_returns;
pub mod regression;

pub use covariance::ledoit_wolf;
pub use covariance::shrinkage_covariance;
pub use covariance::CovarianceMatrix;
pub use expected_returns::estimate_expected_returns;
pub use expected_returns::ExcludedAsset;
pub use expected_returns::ExpectedReturns;
pub use regression::fit_factor_loadings;
pub use regression::FactorLoadings;
pub use regression::RegressionError;
