//! # Return Series
//!
//! $$
//! r_{t,i}=\frac{P_{t,i}}{P_{t-1,i}}-1
//! $$
//!
//! Simple period-over-period returns derived from a [`PriceMatrix`].

use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::Axis;

use super::prices::PriceMatrix;

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnSeries {
  dates: Vec<NaiveDate>,
  symbols: Vec<String>,
  values: Array2<f64>,
}

impl ReturnSeries {
  /// Simple returns on forward-filled prices. The first row is undefined and
  /// dropped; returns before an asset's first price stay NaN.
  pub fn from_prices(prices: &PriceMatrix) -> Self {
    let filled = prices.forward_filled();
    let n = prices.n_dates().saturating_sub(1);
    let mut values = Array2::from_elem((n, prices.n_assets()), f64::NAN);

    for t in 0..n {
      for j in 0..prices.n_assets() {
        let prev = filled[[t, j]];
        let cur = filled[[t + 1, j]];
        if prev.is_finite() && cur.is_finite() {
          values[[t, j]] = cur / prev - 1.0;
        }
      }
    }

    Self {
      dates: prices.dates().iter().skip(1).copied().collect(),
      symbols: prices.symbols().to_vec(),
      values,
    }
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn n_periods(&self) -> usize {
    self.dates.len()
  }

  /// Rows where every asset has a return.
  pub fn complete_rows(&self) -> Array2<f64> {
    self.values.select(Axis(0), &self.complete_row_indices())
  }

  /// The series restricted to dates on which every asset has a return.
  pub fn complete(&self) -> Self {
    let rows = self.complete_row_indices();
    Self {
      dates: rows.iter().map(|&i| self.dates[i]).collect(),
      symbols: self.symbols.clone(),
      values: self.values.select(Axis(0), &rows),
    }
  }

  fn complete_row_indices(&self) -> Vec<usize> {
    self
      .values
      .rows()
      .into_iter()
      .enumerate()
      .filter(|(_, row)| row.iter().all(|r| r.is_finite()))
      .map(|(i, _)| i)
      .collect()
  }
}
