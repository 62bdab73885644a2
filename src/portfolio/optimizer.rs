//! # Maximum Sharpe Optimizer
//!
//! $$
//! \mathbf w^\*=\arg\max_{\mathbf w\ge 0,\ \mathbf 1^\top\mathbf w=1}\frac{\mu^\top\mathbf w}{\sqrt{\mathbf w^\top\Sigma\mathbf w}}
//! \quad\Longleftrightarrow\quad
//! \min_{\mathbf y\ge 0,\ \mu^\top\mathbf y=1}\mathbf y^\top\Sigma\mathbf y,\ \ \mathbf w^\*=\frac{\mathbf y^\*}{\mathbf 1^\top\mathbf y^\*}
//! $$
//!
//! Long-only tangency portfolio with a zero risk-free rate, solved exactly by
//! a primal active-set method on the convex reformulation.

use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

use super::types::WeightVector;
use crate::error::AllocError;
use crate::error::Result;
use crate::model::CovarianceMatrix;
use crate::model::ExpectedReturns;

/// Relative tolerance on the KKT multipliers of the bound constraints.
const KKT_TOL: f64 = 1e-10;

/// Maximum-Sharpe weights for the given expected returns and covariance.
///
/// Both inputs must cover the same assets in the same order. Only long-only
/// portfolios are supported.
pub fn max_sharpe(
  expected: &ExpectedReturns,
  covariance: &CovarianceMatrix,
  long_only: bool,
) -> Result<WeightVector> {
  if !long_only {
    return Err(AllocError::Validation(
      "only long-only maximum Sharpe portfolios are supported".into(),
    ));
  }
  if expected.is_empty() {
    return Err(AllocError::Validation("no assets to optimize".into()));
  }
  if expected.symbols() != covariance.symbols() {
    return Err(AllocError::Validation(format!(
      "expected returns cover {:?} but covariance covers {:?}",
      expected.symbols(),
      covariance.symbols()
    )));
  }

  let mu = DVector::from_iterator(expected.len(), expected.values().iter().copied());
  if mu.iter().any(|m| !m.is_finite()) {
    return Err(AllocError::Validation("expected returns must be finite".into()));
  }

  let weights = tangency_weights(&mu, covariance.matrix())?;
  WeightVector::new(expected.symbols().to_vec(), weights.iter().copied().collect())
}

/// Solve `min y'Sy  s.t.  mu'y = 1, y >= 0` and normalize.
pub fn tangency_weights(mu: &DVector<f64>, sigma: &DMatrix<f64>) -> Result<DVector<f64>> {
  let n = mu.len();
  if sigma.nrows() != n || sigma.ncols() != n {
    return Err(AllocError::Validation(format!(
      "covariance must be {n}x{n}, got {}x{}",
      sigma.nrows(),
      sigma.ncols()
    )));
  }

  let (start, best) = mu
    .iter()
    .copied()
    .enumerate()
    .fold((0, f64::NEG_INFINITY), |acc, (i, m)| if m > acc.1 { (i, m) } else { acc });
  if !(best > 0.0) {
    return Err(AllocError::Infeasible(
      "at least one asset must have a positive expected return".into(),
    ));
  }

  let mut y = DVector::zeros(n);
  y[start] = 1.0 / best;
  let mut free = vec![false; n];
  free[start] = true;

  let max_iter = 50 * (n + 1);
  for iter in 0..max_iter {
    let idx: Vec<usize> = (0..n).filter(|&i| free[i]).collect();
    let target = free_set_solution(mu, sigma, &idx)?;

    let mut step = 1.0;
    let mut blocking = None;
    for (pos, &i) in idx.iter().enumerate() {
      if target[pos] < 0.0 {
        let alpha = y[i] / (y[i] - target[pos]);
        if alpha < step {
          step = alpha;
          blocking = Some(i);
        }
      }
    }

    for (pos, &i) in idx.iter().enumerate() {
      y[i] += step * (target[pos] - y[i]);
    }

    if let Some(b) = blocking {
      y[b] = 0.0;
      free[b] = false;
      continue;
    }

    // Equality-constrained optimum on the free set; price the bounds.
    let grad = sigma * &y * 2.0;
    let lambda = grad.dot(&y) / mu.dot(&y);
    let mut release = None;
    let mut most_negative = 0.0;
    for i in (0..n).filter(|&i| !free[i]) {
      let nu = grad[i] - lambda * mu[i];
      let scale = grad[i].abs() + (lambda * mu[i]).abs();
      if nu < -KKT_TOL * scale && nu < most_negative {
        most_negative = nu;
        release = Some(i);
      }
    }

    match release {
      Some(i) => free[i] = true,
      None => {
        debug!(iterations = iter + 1, active = idx.len(), "max sharpe converged");
        let total = y.sum();
        if !(total > 0.0) || !total.is_finite() {
          return Err(AllocError::Infeasible(
            "tangency portfolio has no positive holdings".into(),
          ));
        }
        return Ok(y.map(|v| v.max(0.0) / total));
      }
    }
  }

  Err(AllocError::Infeasible(format!(
    "max sharpe did not converge in {max_iter} iterations"
  )))
}

/// `y_F = S_FF^{-1} mu_F / (mu_F' S_FF^{-1} mu_F)` for the free indices.
fn free_set_solution(
  mu: &DVector<f64>,
  sigma: &DMatrix<f64>,
  idx: &[usize],
) -> Result<DVector<f64>> {
  let k = idx.len();
  let sub_sigma = DMatrix::from_fn(k, k, |r, c| sigma[(idx[r], idx[c])]);
  let sub_mu = DVector::from_fn(k, |r, _| mu[idx[r]]);

  let chol = sub_sigma.cholesky().ok_or_else(|| {
    AllocError::Infeasible("covariance is not positive definite on the active assets".into())
  })?;
  let z = chol.solve(&sub_mu);
  let d = sub_mu.dot(&z);
  if !(d > 0.0) || !d.is_finite() {
    return Err(AllocError::Infeasible(
      "no positive-return combination of the active assets".into(),
    ));
  }
  Ok(z / d)
}
