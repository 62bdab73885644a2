//! # Discrete Allocation
//!
//! $$
//! n_i=\Bigl\lfloor\frac{w_iB}{p_i}\Bigr\rfloor,\qquad
//! L=B-\sum_i n_ip_i,\qquad
//! \sigma_p=\sqrt{\tilde{\mathbf w}^\top\Sigma\tilde{\mathbf w}}\,\sqrt{P}
//! $$
//!
//! Reconciles target weights against a budget and latest prices, then
//! re-evaluates the realized holdings.

use nalgebra::DVector;
use tracing::debug;

use super::types::AllocationResult;
use super::types::Holding;
use super::types::WeightVector;
use crate::error::AllocError;
use crate::error::Result;
use crate::model::CovarianceMatrix;
use crate::model::ExpectedReturns;

/// Largest negative leftover, relative to the budget, treated as rounding noise.
const LEFTOVER_RTOL: f64 = 1e-9;

/// Annualized return, volatility and Sharpe ratio of a weight vector.
///
/// `expected` is already annualized, `covariance` is per period. Sharpe is
/// NaN when the volatility is exactly zero.
pub fn portfolio_performance(
  weights: &[f64],
  expected: &ExpectedReturns,
  covariance: &CovarianceMatrix,
  periods_per_year: usize,
) -> Result<(f64, f64, f64)> {
  let n = weights.len();
  if expected.len() != n || covariance.len() != n {
    return Err(AllocError::Validation(format!(
      "{n} weights for {} expected returns and a {}x{} covariance",
      expected.len(),
      covariance.len(),
      covariance.len()
    )));
  }

  let w = DVector::from_column_slice(weights);
  let mu = DVector::from_iterator(n, expected.values().iter().copied());
  let ret = mu.dot(&w);
  let variance = w.dot(&(covariance.matrix() * &w)).max(0.0);
  let vol = variance.sqrt() * (periods_per_year as f64).sqrt();
  let sharpe = if vol == 0.0 { f64::NAN } else { ret / vol };
  Ok((ret, vol, sharpe))
}

/// Whole-share holdings for `weights` under `budget`.
///
/// `latest_prices`, `expected` and `covariance` follow the asset order of
/// `weights`. Shares are floored, never rounded up, so the leftover cash is
/// non-negative. Weights summing above 1 after cleaning are scaled down for
/// the share count only; the reported weights are unchanged.
pub fn reconcile(
  weights: &WeightVector,
  budget: f64,
  latest_prices: &[f64],
  expected: &ExpectedReturns,
  covariance: &CovarianceMatrix,
  periods_per_year: usize,
) -> Result<AllocationResult> {
  if !(budget.is_finite() && budget > 0.0) {
    return Err(AllocError::Validation(format!(
      "budget must be a positive number, got {budget}"
    )));
  }
  if periods_per_year == 0 {
    return Err(AllocError::Validation("periods_per_year must be > 0".into()));
  }
  if latest_prices.len() != weights.len() {
    return Err(AllocError::Validation(format!(
      "{} prices for {} weights",
      latest_prices.len(),
      weights.len()
    )));
  }
  if expected.symbols() != weights.symbols() || covariance.symbols() != weights.symbols() {
    return Err(AllocError::Validation(
      "weights, expected returns and covariance must share one asset order".into(),
    ));
  }

  let weight_sum = weights.sum();
  let scale = if weight_sum > 1.0 { 1.0 / weight_sum } else { 1.0 };
  if scale < 1.0 {
    debug!(weight_sum, "scaling investments to keep cleaned weights within budget");
  }

  let mut holdings = Vec::with_capacity(weights.len());
  for ((symbol, &weight), &price) in weights
    .symbols()
    .iter()
    .zip(weights.weights())
    .zip(latest_prices)
  {
    if weight < 0.0 {
      return Err(AllocError::Validation(format!(
        "negative weight {weight} for '{symbol}'"
      )));
    }
    if !(price.is_finite() && price > 0.0) {
      return Err(AllocError::Validation(format!(
        "no usable latest price for '{symbol}'"
      )));
    }
    let shares = (weight * budget * scale / price).floor() as u64;
    holdings.push(Holding {
      symbol: symbol.clone(),
      weight,
      price,
      shares,
      invested: shares as f64 * price,
      realized_weight: 0.0,
    });
  }

  let total_invested: f64 = holdings.iter().map(|h| h.invested).sum();
  let leftover_cash = budget - total_invested;
  if leftover_cash < -LEFTOVER_RTOL * budget {
    return Err(AllocError::Infeasible(format!(
      "invested {total_invested} exceeds budget {budget}"
    )));
  }
  let leftover_cash = leftover_cash.max(0.0);

  if total_invested > 0.0 {
    for h in holdings.iter_mut() {
      h.realized_weight = h.invested / total_invested;
    }
  }

  let realized: Vec<f64> = holdings.iter().map(|h| h.realized_weight).collect();
  let (expected_return, volatility, sharpe_ratio) =
    portfolio_performance(&realized, expected, covariance, periods_per_year)?;

  debug!(
    budget,
    total_invested, leftover_cash, expected_return, volatility, "reconciled allocation"
  );

  Ok(AllocationResult {
    holdings,
    budget,
    total_invested,
    leftover_cash,
    expected_return,
    volatility,
    sharpe_ratio,
    dropped: Vec::new(),
    excluded: Vec::new(),
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use nalgebra::DMatrix;

  use super::*;

  fn names(n: usize) -> Vec<String> {
    ["A", "B", "C", "D"][..n].iter().map(|s| s.to_string()).collect()
  }

  fn setup(
    weights: &[f64],
    mu: &[f64],
    cov: DMatrix<f64>,
  ) -> (WeightVector, ExpectedReturns, CovarianceMatrix) {
    let s = names(weights.len());
    (
      WeightVector::new(s.clone(), weights.to_vec()).unwrap(),
      ExpectedReturns::from_values(s.clone(), mu.to_vec()).unwrap(),
      CovarianceMatrix::new(s, cov).unwrap(),
    )
  }

  #[test]
  fn floors_shares_and_spends_exactly() {
    let cov = DMatrix::from_row_slice(2, 2, &[0.0004, 0.0001, 0.0001, 0.0009]);
    let (w, er, c) = setup(&[0.6, 0.4], &[0.10, 0.15], cov.clone());
    let result = reconcile(&w, 1000.0, &[100.0, 50.0], &er, &c, 252).unwrap();

    assert_eq!(result.shares("A"), Some(6));
    assert_eq!(result.shares("B"), Some(8));
    assert_abs_diff_eq!(result.total_invested(), 1000.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.leftover_cash(), 0.0, epsilon = 1e-9);

    let realized = [0.6, 0.4];
    assert_abs_diff_eq!(result.expected_return(), 0.6 * 0.10 + 0.4 * 0.15, epsilon = 1e-12);
    let var: f64 = 0.36 * 0.0004 + 2.0 * 0.24 * 0.0001 + 0.16 * 0.0009;
    assert_abs_diff_eq!(result.volatility(), (var * 252.0).sqrt(), epsilon = 1e-12);
    assert_abs_diff_eq!(
      result.sharpe_ratio(),
      result.expected_return() / result.volatility(),
      epsilon = 1e-12
    );
    for (h, r) in result.holdings().iter().zip(realized) {
      assert_abs_diff_eq!(h.realized_weight, r, epsilon = 1e-12);
    }
  }

  #[test]
  fn rounded_weights_above_one_stay_within_budget() {
    let cov = DMatrix::identity(3, 3) * 0.0004;
    let raw = WeightVector::new(names(3), vec![0.333336, 0.333336, 0.333328]).unwrap();
    let cleaned = raw.clean(1e-4, 5);
    assert!(cleaned.sum() > 1.0);

    let (_, er, c) = setup(&[0.3, 0.3, 0.3], &[0.1, 0.1, 0.1], cov);
    let result = reconcile(&cleaned, 1e6, &[0.01, 0.01, 0.01], &er, &c, 252).unwrap();

    assert!(result.leftover_cash() >= 0.0);
    assert!(result.total_invested() <= 1e6);
    assert_abs_diff_eq!(result.total_invested() + result.leftover_cash(), 1e6, epsilon = 1e-6);
    assert_eq!(result.holding("A").unwrap().weight, 0.33334);
    assert_eq!(result.holding("C").unwrap().weight, 0.33333);
    assert!(result.shares("A").unwrap() >= result.shares("C").unwrap());
  }

  #[test]
  fn leftover_is_non_negative_and_below_cheapest_price_for_single_asset() {
    let (w, er, c) = setup(&[1.0], &[0.08], DMatrix::from_element(1, 1, 0.0002));
    let result = reconcile(&w, 1000.0, &[33.0], &er, &c, 252).unwrap();
    assert_eq!(result.shares("A"), Some(30));
    assert_abs_diff_eq!(result.leftover_cash(), 10.0, epsilon = 1e-9);
    assert_eq!(result.holding("A").unwrap().realized_weight, 1.0);
  }

  #[test]
  fn higher_price_never_buys_more_shares() {
    let (w, er, c) = setup(&[0.5, 0.5], &[0.1, 0.1], DMatrix::identity(2, 2) * 0.0004);
    let mut last = u64::MAX;
    for price in [10.0, 17.0, 33.0, 125.0, 499.0, 501.0] {
      let shares = reconcile(&w, 1000.0, &[price, 20.0], &er, &c, 252)
        .unwrap()
        .shares("A")
        .unwrap();
      assert!(shares <= last);
      last = shares;
    }
    assert_eq!(last, 0);
  }

  #[test]
  fn nothing_bought_gives_nan_sharpe() {
    let (w, er, c) = setup(&[1.0], &[0.08], DMatrix::from_element(1, 1, 0.0002));
    let result = reconcile(&w, 100.0, &[500.0], &er, &c, 252).unwrap();
    assert_eq!(result.shares("A"), Some(0));
    assert_eq!(result.leftover_cash(), 100.0);
    assert_eq!(result.holding("A").unwrap().realized_weight, 0.0);
    assert_eq!(result.volatility(), 0.0);
    assert!(result.sharpe_ratio().is_nan());
  }

  #[test]
  fn invalid_budget_is_rejected() {
    let (w, er, c) = setup(&[1.0], &[0.08], DMatrix::from_element(1, 1, 0.0002));
    for budget in [0.0, -5.0, f64::NAN] {
      assert!(matches!(
        reconcile(&w, budget, &[10.0], &er, &c, 252),
        Err(AllocError::Validation(_))
      ));
    }
  }

  #[test]
  fn missing_price_is_rejected() {
    let (w, er, c) = setup(&[1.0], &[0.08], DMatrix::from_element(1, 1, 0.0002));
    assert!(matches!(
      reconcile(&w, 100.0, &[f64::NAN], &er, &c, 252),
      Err(AllocError::Validation(_))
    ));
  }
}
