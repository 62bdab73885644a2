//! # Price Matrix
//!
//! $$
//! P\in\mathbb R_{>0}^{T\times N},\qquad P_{t,i}=\text{NaN}\ \text{if missing}
//! $$
//!
//! Adjusted-close prices indexed by date (rows) and asset (columns).

use std::collections::HashSet;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use tracing::warn;

use crate::error::AllocError;
use crate::error::Result;

#[derive(Clone, Debug, PartialEq)]
pub struct PriceMatrix {
  dates: Vec<NaiveDate>,
  symbols: Vec<String>,
  values: Array2<f64>,
}

impl PriceMatrix {
  /// Build a price matrix. Rows are sorted by date; non-positive or
  /// non-finite prices are stored as missing.
  pub fn new(dates: Vec<NaiveDate>, symbols: Vec<String>, values: Array2<f64>) -> Result<Self> {
    if values.nrows() != dates.len() || values.ncols() != symbols.len() {
      return Err(AllocError::Validation(format!(
        "price values are {}x{} but there are {} dates and {} symbols",
        values.nrows(),
        values.ncols(),
        dates.len(),
        symbols.len()
      )));
    }

    let mut seen = HashSet::with_capacity(symbols.len());
    for s in &symbols {
      if !seen.insert(s.as_str()) {
        return Err(AllocError::Schema(format!("duplicate symbol '{s}'")));
      }
    }

    let mut order: Vec<usize> = (0..dates.len()).collect();
    order.sort_by_key(|&i| dates[i]);
    for w in order.windows(2) {
      if dates[w[0]] == dates[w[1]] {
        return Err(AllocError::Parse(format!(
          "duplicate price date {}",
          dates[w[0]]
        )));
      }
    }

    let dates: Vec<NaiveDate> = order.iter().map(|&i| dates[i]).collect();
    let mut values = values.select(Axis(0), &order);

    let mut invalid = 0usize;
    values.mapv_inplace(|p| {
      if p.is_nan() || (p.is_finite() && p > 0.0) {
        p
      } else {
        invalid += 1;
        f64::NAN
      }
    });
    if invalid > 0 {
      warn!(invalid, "non-positive or non-finite prices treated as missing");
    }

    Ok(Self {
      dates,
      symbols,
      values,
    })
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

  pub fn n_dates(&self) -> usize {
    self.dates.len()
  }

  pub fn n_assets(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty() || self.symbols.is_empty()
  }

  /// Column of one asset, if present.
  pub fn column(&self, symbol: &str) -> Option<Array1<f64>> {
    let idx = self.symbols.iter().position(|s| s == symbol)?;
    Some(self.values.column(idx).to_owned())
  }

  /// Remove assets with no price at all. Returns the cleaned matrix and the
  /// dropped symbols, or `EmptyData` when nothing survives.
  pub fn drop_missing_assets(self) -> Result<(Self, Vec<String>)> {
    let mut keep = Vec::with_capacity(self.symbols.len());
    let mut dropped = Vec::new();
    for (i, s) in self.symbols.iter().enumerate() {
      if self.values.column(i).iter().any(|p| p.is_finite()) {
        keep.push(i);
      } else {
        dropped.push(s.clone());
      }
    }

    if !dropped.is_empty() {
      warn!(?dropped, "dropping assets without any price data");
    }
    if keep.is_empty() || self.dates.is_empty() {
      return Err(AllocError::EmptyData(
        "no valid stock data available after dropping missing values".into(),
      ));
    }

    Ok((self.select_assets(&keep), dropped))
  }

  /// Keep only the named assets, in the given order.
  pub fn restrict_to(&self, symbols: &[String]) -> Result<Self> {
    let idx = symbols
      .iter()
      .map(|s| {
        self
          .symbols
          .iter()
          .position(|x| x == s)
          .ok_or_else(|| AllocError::Schema(format!("no price column for '{s}'")))
      })
      .collect::<Result<Vec<_>>>()?;
    Ok(self.select_assets(&idx))
  }

  /// Keep only rows with `start <= date < end`.
  pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Self {
    let rows: Vec<usize> = self
      .dates
      .iter()
      .enumerate()
      .filter(|(_, d)| **d >= start && **d < end)
      .map(|(i, _)| i)
      .collect();
    Self {
      dates: rows.iter().map(|&i| self.dates[i]).collect(),
      symbols: self.symbols.clone(),
      values: self.values.select(Axis(0), &rows),
    }
  }

  /// Interior gaps filled with the previous observed price. Leading gaps stay
  /// missing.
  pub fn forward_filled(&self) -> Array2<f64> {
    let mut filled = self.values.clone();
    for mut col in filled.columns_mut() {
      let mut last = f64::NAN;
      for p in col.iter_mut() {
        if p.is_nan() {
          *p = last;
        } else {
          last = *p;
        }
      }
    }
    filled
  }

  /// Most recent observed price per asset.
  pub fn latest_prices(&self) -> Array1<f64> {
    self
      .values
      .columns()
      .into_iter()
      .map(|col| {
        col
          .iter()
          .rev()
          .copied()
          .find(|p| p.is_finite())
          .unwrap_or(f64::NAN)
      })
      .collect()
  }

  fn select_assets(&self, idx: &[usize]) -> Self {
    Self {
      dates: self.dates.clone(),
      symbols: idx.iter().map(|&i| self.symbols[i].clone()).collect(),
      values: self.values.select(Axis(1), idx),
    }
  }
}
