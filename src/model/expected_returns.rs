//! # Carhart Expected Returns
//!
//! $$
//! \mathbb E[r_i]=P\Bigl(\hat\alpha_i+\sum_{k}\hat\beta_{ik}\,\bar F_k+\bar r_f\Bigr)
//! $$
//!
//! Annualized expected returns from per-asset four-factor regressions.

use std::collections::HashMap;

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::regression::fit_factor_loadings;
use super::regression::FactorLoadings;
use super::regression::RegressionError;
use super::regression::DESIGN_COLUMNS;
use crate::config::RegressionFailurePolicy;
use crate::data::Factor;
use crate::data::FactorMatrix;
use crate::data::PriceMatrix;
use crate::data::ReturnSeries;
use crate::error::AllocError;
use crate::error::Result;

/// An asset left out of the expected-return vector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExcludedAsset {
  pub symbol: String,
  pub reason: String,
}

/// Annualized expected returns, one per surviving asset, in price-column order.
#[derive(Clone, Debug)]
pub struct ExpectedReturns {
  symbols: Vec<String>,
  values: Array1<f64>,
  loadings: Vec<FactorLoadings>,
  excluded: Vec<ExcludedAsset>,
  n_periods: usize,
}

impl ExpectedReturns {
  /// Expected returns without regression diagnostics, e.g. from an external model.
  pub fn from_values(symbols: Vec<String>, values: Vec<f64>) -> Result<Self> {
    if symbols.len() != values.len() {
      return Err(AllocError::Validation(format!(
        "{} symbols but {} expected returns",
        symbols.len(),
        values.len()
      )));
    }
    Ok(Self {
      symbols,
      values: Array1::from(values),
      loadings: Vec::new(),
      excluded: Vec::new(),
      n_periods: 0,
    })
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn values(&self) -> &Array1<f64> {
    &self.values
  }

  pub fn get(&self, symbol: &str) -> Option<f64> {
    let i = self.symbols.iter().position(|s| s == symbol)?;
    Some(self.values[i])
  }

  /// Regression fits, aligned with [`Self::symbols`]. Empty when built from raw values.
  pub fn loadings(&self) -> &[FactorLoadings] {
    &self.loadings
  }

  pub fn excluded(&self) -> &[ExcludedAsset] {
    &self.excluded
  }

  /// Number of common return/factor dates used.
  pub fn n_periods(&self) -> usize {
    self.n_periods
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }
}

/// Regress each asset's excess returns on the Carhart factors and annualize
/// the implied expected return.
pub fn estimate_expected_returns(
  prices: &PriceMatrix,
  factors: &FactorMatrix,
  periods_per_year: usize,
  policy: RegressionFailurePolicy,
) -> Result<ExpectedReturns> {
  if periods_per_year == 0 {
    return Err(AllocError::Validation("periods_per_year must be > 0".into()));
  }

  let returns = ReturnSeries::from_prices(prices).complete();
  let factor_rows: HashMap<_, usize> = factors
    .dates()
    .iter()
    .enumerate()
    .map(|(i, d)| (*d, i))
    .collect();

  let (return_rows, common_factor_rows): (Vec<usize>, Vec<usize>) = returns
    .dates()
    .iter()
    .enumerate()
    .filter_map(|(i, d)| factor_rows.get(d).map(|&f| (i, f)))
    .unzip();

  if return_rows.is_empty() {
    return Err(AllocError::EmptyData(
      "no overlapping dates between complete price returns and factor data".into(),
    ));
  }

  let aligned = factors.select_rows(&common_factor_rows);
  let means = aligned.means();
  let factor_means = [
    means[Factor::MktRf as usize],
    means[Factor::Smb as usize],
    means[Factor::Hml as usize],
    means[Factor::Umd as usize],
  ];
  let mean_rf = means[Factor::Rf as usize];
  let rf = aligned.column(Factor::Rf);

  let design = DMatrix::from_fn(aligned.len(), DESIGN_COLUMNS, |r, c| {
    if c == 0 {
      1.0
    } else {
      aligned.column(Factor::REGRESSORS[c - 1])[r]
    }
  });

  debug!(
    periods = aligned.len(),
    assets = prices.n_assets(),
    "fitting factor regressions"
  );

  let fits: Vec<std::result::Result<FactorLoadings, RegressionError>> = (0..prices.n_assets())
    .into_par_iter()
    .map(|j| {
      let excess = DVector::from_iterator(
        return_rows.len(),
        return_rows
          .iter()
          .enumerate()
          .map(|(t, &row)| returns.values()[[row, j]] - rf[t]),
      );
      fit_factor_loadings(&excess, &design)
    })
    .collect();

  let mut symbols = Vec::with_capacity(fits.len());
  let mut values = Vec::with_capacity(fits.len());
  let mut loadings = Vec::with_capacity(fits.len());
  let mut excluded = Vec::new();

  for (symbol, fit) in prices.symbols().iter().zip(fits) {
    match fit {
      Ok(l) => {
        let expected =
          (l.expected_excess_return(&factor_means) + mean_rf) * periods_per_year as f64;
        symbols.push(symbol.clone());
        values.push(expected);
        loadings.push(l);
      }
      Err(e) => match policy {
        RegressionFailurePolicy::Abort => {
          return Err(AllocError::EmptyData(format!(
            "factor regression failed for '{symbol}': {e}"
          )));
        }
        RegressionFailurePolicy::Exclude => {
          warn!(symbol = %symbol, reason = %e, "excluding asset after failed factor regression");
          excluded.push(ExcludedAsset {
            symbol: symbol.clone(),
            reason: e.to_string(),
          });
        }
      },
    }
  }

  if symbols.is_empty() {
    return Err(AllocError::EmptyData(
      "factor regression failed for every asset".into(),
    ));
  }

  Ok(ExpectedReturns {
    symbols,
    values: Array1::from(values),
    loadings,
    excluded,
    n_periods: aligned.len(),
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::Duration;
  use chrono::NaiveDate;
  use ndarray::Array2;
  use tracing_test::traced_test;

  use super::*;

  const N: usize = 120;

  fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
  }

  fn factor_matrix() -> FactorMatrix {
    let values = Array2::from_shape_fn((N, 5), |(t, c)| {
      let t = t as f64;
      match c {
        0 => 0.0004 + (0.9 * t).sin() * 0.01,
        1 => (1.7 * t).cos() * 0.004,
        2 => (0.3 * t + 0.5).sin() * 0.005,
        3 => (2.3 * t).sin() * (0.2 * t).cos() * 0.006,
        _ => 0.0001,
      }
    });
    FactorMatrix::new(dates(N), values).unwrap()
  }

  /// Prices whose returns on date t (t >= 1) follow the given loadings exactly.
  fn prices_from(
    factors: &FactorMatrix,
    assets: &[(f64, [f64; 4])],
  ) -> PriceMatrix {
    let mut values = Array2::zeros((N, assets.len()));
    for (j, (alpha, betas)) in assets.iter().enumerate() {
      values[[0, j]] = 100.0;
      for t in 1..N {
        let row = factors.values().row(t);
        let r = alpha
          + betas[0] * row[0]
          + betas[1] * row[1]
          + betas[2] * row[2]
          + betas[3] * row[3]
          + row[4];
        values[[t, j]] = values[[t - 1, j]] * (1.0 + r);
      }
    }
    let symbols = (0..assets.len()).map(|j| format!("A{j}")).collect();
    PriceMatrix::new(dates(N), symbols, values).unwrap()
  }

  #[test]
  fn recovers_loadings_and_annualizes() {
    let factors = factor_matrix();
    let assets = [(0.0001, [1.2, 0.3, -0.2, 0.1]), (0.0, [0.8, -0.1, 0.4, 0.0])];
    let prices = prices_from(&factors, &assets);

    let er = estimate_expected_returns(&prices, &factors, 252, RegressionFailurePolicy::Exclude)
      .unwrap();
    assert_eq!(er.symbols(), &["A0".to_string(), "A1".to_string()]);
    assert_eq!(er.n_periods(), N - 1);

    let means = factors.select_rows(&(1..N).collect::<Vec<_>>()).means();
    for (j, (alpha, betas)) in assets.iter().enumerate() {
      let l = er.loadings()[j];
      assert_abs_diff_eq!(l.alpha, *alpha, epsilon = 1e-9);
      for k in 0..4 {
        assert_abs_diff_eq!(l.betas[k], betas[k], epsilon = 1e-7);
      }
      let expected = (alpha
        + (0..4).map(|k| betas[k] * means[k]).sum::<f64>()
        + means[4])
        * 252.0;
      assert_abs_diff_eq!(er.values()[j], expected, epsilon = 1e-8);
    }
  }

  #[test]
  fn late_listed_asset_shortens_the_shared_window() {
    const LISTED: usize = 40;
    let factors = factor_matrix();
    let assets = [(0.0002, [1.3, 0.1, 0.2, -0.1]), (-0.0001, [0.6, 0.4, -0.3, 0.2])];
    let mut values = prices_from(&factors, &assets).values().clone();
    for t in 0..LISTED {
      values[[t, 1]] = f64::NAN;
    }
    let prices = PriceMatrix::new(dates(N), vec!["OLD".into(), "NEW".into()], values).unwrap();

    let er = estimate_expected_returns(&prices, &factors, 252, RegressionFailurePolicy::Exclude)
      .unwrap();
    // The first return of NEW is on the day after listing.
    assert_eq!(er.n_periods(), N - LISTED - 1);
    assert!(er.excluded().is_empty());

    let window: Vec<usize> = (LISTED + 1..N).collect();
    let means = factors.select_rows(&window).means();
    for (j, (alpha, betas)) in assets.iter().enumerate() {
      assert_eq!(er.loadings()[j].nobs, N - LISTED - 1);
      let expected = (alpha
        + (0..4).map(|k| betas[k] * means[k]).sum::<f64>()
        + means[4])
        * 252.0;
      assert_abs_diff_eq!(er.values()[j], expected, epsilon = 1e-8);
    }
  }

  #[test]
  #[traced_test]
  fn too_short_shared_window_fails_every_asset() {
    let factors = factor_matrix();
    let mut prices = prices_from(&factors, &[(0.0, [1.0, 0.0, 0.0, 0.0]); 2])
      .values()
      .clone();
    for t in 0..N - 4 {
      prices[[t, 1]] = f64::NAN;
    }
    let prices = PriceMatrix::new(dates(N), vec!["OLD".into(), "NEW".into()], prices).unwrap();

    let err = estimate_expected_returns(&prices, &factors, 252, RegressionFailurePolicy::Exclude)
      .unwrap_err();
    assert!(matches!(err, AllocError::EmptyData(msg) if msg.contains("every asset")));
    assert!(logs_contain("excluding asset after failed factor regression"));

    let err = estimate_expected_returns(&prices, &factors, 252, RegressionFailurePolicy::Abort)
      .unwrap_err();
    assert!(matches!(err, AllocError::EmptyData(msg) if msg.contains("OLD")));
  }

  #[test]
  fn disjoint_dates_are_empty_data() {
    let factors = factor_matrix();
    let later: Vec<NaiveDate> = dates(N)
      .iter()
      .map(|d| *d + Duration::days(1000))
      .collect();
    let prices =
      PriceMatrix::new(later, vec!["A".into()], Array2::from_elem((N, 1), 10.0)).unwrap();
    assert!(matches!(
      estimate_expected_returns(&prices, &factors, 252, RegressionFailurePolicy::Exclude),
      Err(AllocError::EmptyData(_))
    ));
  }
}
