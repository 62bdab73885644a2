//! # Shrinkage Covariance
//!
//! $$
//! \hat\Sigma=\delta F+(1-\delta)S,\qquad \delta\in[0,1]
//! $$
//!
//! Ledoit-Wolf shrinkage of the per-period sample covariance of simple returns
//! toward a structured target, followed by a positive-definiteness check.

use nalgebra::DMatrix;
use nalgebra::SymmetricEigen;
use ndarray::Array2;
use ndarray::Axis;
use tracing::debug;
use tracing::warn;

use crate::config::ShrinkageTarget;
use crate::data::PriceMatrix;
use crate::data::ReturnSeries;
use crate::error::AllocError;
use crate::error::Result;

/// Per-period covariance over a fixed asset order.
#[derive(Clone, Debug, PartialEq)]
pub struct CovarianceMatrix {
  symbols: Vec<String>,
  matrix: DMatrix<f64>,
  shrinkage: f64,
  regularized: bool,
}

impl CovarianceMatrix {
  /// Wrap an existing matrix. Fails on a non-square, non-symmetric or
  /// mis-sized input.
  pub fn new(symbols: Vec<String>, matrix: DMatrix<f64>) -> Result<Self> {
    let n = symbols.len();
    if matrix.nrows() != n || matrix.ncols() != n {
      return Err(AllocError::Validation(format!(
        "covariance must be {n}x{n}, got {}x{}",
        matrix.nrows(),
        matrix.ncols()
      )));
    }
    let scale = matrix.amax().max(1.0);
    for i in 0..n {
      for j in (i + 1)..n {
        if (matrix[(i, j)] - matrix[(j, i)]).abs() > 1e-12 * scale {
          return Err(AllocError::Validation(format!(
            "covariance is not symmetric at ({i}, {j})"
          )));
        }
      }
    }
    Ok(Self {
      symbols,
      matrix,
      shrinkage: 0.0,
      regularized: false,
    })
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn matrix(&self) -> &DMatrix<f64> {
    &self.matrix
  }

  /// Shrinkage intensity used to build the matrix.
  pub fn shrinkage(&self) -> f64 {
    self.shrinkage
  }

  /// Whether the diagonal was bumped to restore positive-definiteness.
  pub fn regularized(&self) -> bool {
    self.regularized
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  /// Bump the diagonal by `epsilon` if any eigenvalue is non-positive.
  ///
  /// This only makes the matrix usable by the optimizer; it does not make a
  /// degenerate estimate any more accurate.
  pub fn ensure_positive_definite(mut self, epsilon: f64) -> Self {
    let (matrix, bumped) = regularize(self.matrix, epsilon);
    self.matrix = matrix;
    self.regularized |= bumped;
    self
  }

  /// Restrict to the given assets, in the given order.
  pub fn restrict_to(&self, symbols: &[String]) -> Result<Self> {
    let idx = symbols
      .iter()
      .map(|s| {
        self
          .symbols
          .iter()
          .position(|x| x == s)
          .ok_or_else(|| AllocError::Validation(format!("'{s}' is not in the covariance")))
      })
      .collect::<Result<Vec<_>>>()?;
    Ok(Self {
      symbols: symbols.to_vec(),
      matrix: DMatrix::from_fn(idx.len(), idx.len(), |i, j| self.matrix[(idx[i], idx[j])]),
      shrinkage: self.shrinkage,
      regularized: self.regularized,
    })
  }
}

/// Eigenvalues below this fraction of the largest one count as zero.
const EIGEN_RTOL: f64 = 1e-12;

fn eigen_floor(eigenvalues: &[f64]) -> f64 {
  let max_abs = eigenvalues.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
  max_abs * EIGEN_RTOL
}

/// Add `epsilon` to every diagonal entry when the smallest eigenvalue is not
/// strictly positive. Returns the matrix and whether it was changed.
pub fn regularize(matrix: DMatrix<f64>, epsilon: f64) -> (DMatrix<f64>, bool) {
  if matrix.is_empty() {
    return (matrix, false);
  }
  let eigenvalues: Vec<f64> = SymmetricEigen::new(matrix.clone())
    .eigenvalues
    .iter()
    .copied()
    .collect();
  let min = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
  if min > eigen_floor(&eigenvalues) {
    return (matrix, false);
  }

  warn!(
    min_eigenvalue = min,
    epsilon, "covariance matrix is not positive definite, adjusting diagonal"
  );
  let n = matrix.nrows();
  (matrix + DMatrix::identity(n, n) * epsilon, true)
}

/// Ledoit-Wolf shrunk covariance of the asset returns in `prices`.
pub fn shrinkage_covariance(
  prices: &PriceMatrix,
  target: ShrinkageTarget,
  epsilon: f64,
) -> Result<CovarianceMatrix> {
  let returns = ReturnSeries::from_prices(prices).complete_rows();
  if returns.nrows() < 2 {
    return Err(AllocError::EmptyData(format!(
      "{} complete return rows, need at least 2 for a covariance",
      returns.nrows()
    )));
  }

  let (matrix, shrinkage) = ledoit_wolf(&returns, target);
  debug!(
    observations = returns.nrows(),
    assets = returns.ncols(),
    shrinkage,
    ?target,
    "estimated shrinkage covariance"
  );

  let cov = CovarianceMatrix {
    symbols: prices.symbols().to_vec(),
    matrix,
    shrinkage,
    regularized: false,
  };
  Ok(cov.ensure_positive_definite(epsilon))
}

/// Shrunk covariance and shrinkage intensity for a `T x N` matrix of
/// complete returns.
pub fn ledoit_wolf(returns: &Array2<f64>, target: ShrinkageTarget) -> (DMatrix<f64>, f64) {
  let t = returns.nrows();
  let n = returns.ncols();
  let mean = returns
    .mean_axis(Axis(0))
    .unwrap_or_else(|| ndarray::Array1::zeros(n));
  let centered = returns - &mean;
  let x = DMatrix::from_fn(t, n, |r, c| centered[[r, c]]);

  if n < 2 || t < 2 {
    return ((x.transpose() * &x) / t.max(1) as f64, 0.0);
  }

  let (shrunk, shrinkage) = match target {
    ShrinkageTarget::ConstantVariance => constant_variance(&x),
    ShrinkageTarget::ConstantCorrelation => constant_correlation(&x),
  };
  (symmetrize(shrunk), shrinkage)
}

fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
  (&m + m.transpose()) * 0.5
}

/// Biased sample covariance shrunk toward `mu * I`, `mu` the mean variance.
fn constant_variance(x: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
  let t = x.nrows() as f64;
  let n = x.ncols();
  let sample = (x.transpose() * x) / t;
  let mu = sample.trace() / n as f64;
  let target = DMatrix::identity(n, n) * mu;

  let x2 = x.component_mul(x);
  let beta_raw = (x2.transpose() * &x2).sum();
  let delta_raw = sample.component_mul(&sample).sum();

  let beta = (beta_raw / t - delta_raw) / (n as f64 * t);
  let delta = (delta_raw - n as f64 * mu * mu) / n as f64;
  let beta = beta.min(delta);

  let shrinkage = if beta <= 0.0 || delta <= 0.0 {
    0.0
  } else {
    (beta / delta).clamp(0.0, 1.0)
  };
  (&target * shrinkage + &sample * (1.0 - shrinkage), shrinkage)
}

/// Unbiased sample covariance shrunk toward sample variances with the
/// average sample correlation off the diagonal.
fn constant_correlation(x: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
  let t = x.nrows() as f64;
  let n = x.ncols();
  let cross = x.transpose() * x;
  let moment = &cross / t;
  let sample = &cross / (t - 1.0);
  let var: Vec<f64> = (0..n).map(|i| sample[(i, i)].max(0.0)).collect();
  let std: Vec<f64> = var.iter().map(|v| v.sqrt()).collect();

  let mut corr_sum = 0.0;
  for i in 0..n {
    for j in 0..n {
      if i != j && std[i] > 0.0 && std[j] > 0.0 {
        corr_sum += sample[(i, j)] / (std[i] * std[j]);
      }
    }
  }
  let r_bar = corr_sum / (n * (n - 1)) as f64;

  let target = DMatrix::from_fn(n, n, |i, j| {
    if i == j {
      var[i]
    } else {
      r_bar * std[i] * std[j]
    }
  });

  let y = x.component_mul(x);
  let pi_mat = (y.transpose() * &y) / t - cross.component_mul(&sample) * (2.0 / t)
    + sample.component_mul(&sample);
  let pi_hat = pi_mat.sum();

  let x3 = y.component_mul(x);
  let mut theta = (x3.transpose() * x) / t;
  for i in 0..n {
    for j in 0..n {
      theta[(i, j)] += -moment[(i, i)] * sample[(i, j)] - moment[(i, j)] * var[i]
        + var[i] * sample[(i, j)];
    }
  }

  let mut rho_off = 0.0;
  for i in 0..n {
    for j in 0..n {
      if i != j && std[i] > 0.0 {
        rho_off += std[j] / std[i] * theta[(i, j)];
      }
    }
  }
  let rho_hat = pi_mat.diagonal().sum() + r_bar * rho_off;
  let gamma_hat = (&sample - &target).norm_squared();

  let shrinkage = if gamma_hat > 0.0 {
    ((pi_hat - rho_hat) / gamma_hat / t).clamp(0.0, 1.0)
  } else {
    0.0
  };
  (&target * shrinkage + &sample * (1.0 - shrinkage), shrinkage)
}
