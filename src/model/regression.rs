//! # Factor Regression
//!
//! $$
//! r_t-r_{f,t}=\alpha+\beta_{M}\,\text{MKT}_t+\beta_{S}\,\text{SMB}_t+\beta_{H}\,\text{HML}_t+\beta_{U}\,\text{UMD}_t+\varepsilon_t
//! $$
//!
//! Ordinary least squares on the Carhart design matrix for a single asset.

use nalgebra::DMatrix;
use nalgebra::DVector;
use statrs::statistics::Statistics;
use thiserror::Error;

/// Number of columns in the Carhart design matrix (intercept + four factors).
pub const DESIGN_COLUMNS: usize = 5;

/// Smallest singular value, relative to the largest, for a usable design.
const RCOND: f64 = 1e-10;

/// Why a single asset's regression could not be fitted.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RegressionError {
  #[error("{nobs} observations for {k} regressors")]
  InsufficientObservations { nobs: usize, k: usize },
  #[error("singular design matrix")]
  SingularDesign,
  #[error("non-finite coefficients")]
  NonFinite,
}

#[derive(Clone, Debug)]
pub struct OlsFit {
  pub beta: Vec<f64>,
  pub std_err: Vec<f64>,
  pub sse: f64,
  pub sigma2: f64,
  pub r_squared: f64,
  pub nobs: usize,
  pub k: usize,
}

/// OLS of `y` on the columns of `x` via the normal equations.
pub fn ols(y: &DVector<f64>, x: &DMatrix<f64>) -> Result<OlsFit, RegressionError> {
  let n = y.len();
  let k = x.ncols();
  if n != x.nrows() || k == 0 || n <= k {
    return Err(RegressionError::InsufficientObservations { nobs: n, k });
  }

  let singular_values = x.clone().svd(false, false).singular_values;
  let max_sv = singular_values.max();
  if !(max_sv > 0.0) || singular_values.iter().any(|&s| s <= max_sv * RCOND) {
    return Err(RegressionError::SingularDesign);
  }

  let xt = x.transpose();
  let xtx = &xt * x;
  let Some(xtx_inv) = xtx.try_inverse() else {
    return Err(RegressionError::SingularDesign);
  };

  let beta = &xtx_inv * (&xt * y);
  if beta.iter().any(|b| !b.is_finite()) {
    return Err(RegressionError::NonFinite);
  }

  let residuals = y - x * &beta;
  let sse = residuals.norm_squared();
  let sigma2 = (sse / (n - k) as f64).max(0.0);
  let std_err = (0..k)
    .map(|i| (xtx_inv[(i, i)] * sigma2).max(0.0).sqrt())
    .collect();

  let y_mean = y.iter().mean();
  let sst: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
  let r_squared = if sst > f64::EPSILON * y.norm_squared() {
    1.0 - sse / sst
  } else {
    0.0
  };

  Ok(OlsFit {
    beta: beta.iter().copied().collect(),
    std_err,
    sse,
    sigma2,
    r_squared,
    nobs: n,
    k,
  })
}

/// Intercept and factor betas of one asset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FactorLoadings {
  pub alpha: f64,
  /// Betas on `Mkt-RF`, `SMB`, `HML`, `UMD`.
  pub betas: [f64; 4],
  pub r_squared: f64,
  pub nobs: usize,
}

impl FactorLoadings {
  /// alpha + sum(beta_i * factor_means_i), per period.
  pub fn expected_excess_return(&self, factor_means: &[f64; 4]) -> f64 {
    self.alpha
      + self
        .betas
        .iter()
        .zip(factor_means)
        .map(|(b, m)| b * m)
        .sum::<f64>()
  }
}

/// Fit one asset. `design` has an intercept column followed by the four factors.
pub fn fit_factor_loadings(
  excess: &DVector<f64>,
  design: &DMatrix<f64>,
) -> Result<FactorLoadings, RegressionError> {
  let fit = ols(excess, design)?;
  Ok(FactorLoadings {
    alpha: fit.beta[0],
    betas: [fit.beta[1], fit.beta[2], fit.beta[3], fit.beta[4]],
    r_squared: fit.r_squared,
    nobs: fit.nobs,
  })
}
