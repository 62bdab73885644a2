//! # Portfolio Types
//!
//! $$
//! \mathbf w\in\Delta^{N-1},\qquad n_i=\Bigl\lfloor \frac{w_i B}{p_i}\Bigr\rfloor
//! $$
//!
//! Weight vectors, per-asset holdings and the allocation result with its
//! serialized report.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::Serializer;

use crate::error::AllocError;
use crate::error::Result;
use crate::model::ExcludedAsset;

/// Portfolio weights over a fixed asset order.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightVector {
  symbols: Vec<String>,
  weights: Vec<f64>,
}

impl WeightVector {
  pub fn new(symbols: Vec<String>, weights: Vec<f64>) -> Result<Self> {
    if symbols.len() != weights.len() {
      return Err(AllocError::Validation(format!(
        "{} symbols but {} weights",
        symbols.len(),
        weights.len()
      )));
    }
    if let Some(i) = weights.iter().position(|w| !w.is_finite()) {
      return Err(AllocError::Validation(format!(
        "weight for '{}' is not finite",
        symbols[i]
      )));
    }
    Ok(Self { symbols, weights })
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn weights(&self) -> &[f64] {
    &self.weights
  }

  pub fn get(&self, symbol: &str) -> Option<f64> {
    let i = self.symbols.iter().position(|s| s == symbol)?;
    Some(self.weights[i])
  }

  pub fn sum(&self) -> f64 {
    self.weights.iter().sum()
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  /// Zero out weights with `|w| < cutoff`, then round to `decimals` places.
  /// The result is not renormalized.
  pub fn clean(&self, cutoff: f64, decimals: u32) -> Self {
    let scale = 10f64.powi(decimals as i32);
    let weights = self
      .weights
      .iter()
      .map(|&w| {
        if w.abs() < cutoff {
          0.0
        } else {
          (w * scale).round() / scale
        }
      })
      .collect();
    Self {
      symbols: self.symbols.clone(),
      weights,
    }
  }
}

/// One asset's slice of the budget.
#[derive(Clone, Debug, PartialEq)]
pub struct Holding {
  pub symbol: String,
  /// Target weight from the optimizer.
  pub weight: f64,
  /// Latest price used for the share count.
  pub price: f64,
  pub shares: u64,
  /// `shares * price`.
  pub invested: f64,
  /// Share of the invested amount actually held.
  pub realized_weight: f64,
}

/// Outcome of turning a budget into whole-share holdings.
#[derive(Clone, Debug)]
pub struct AllocationResult {
  pub(crate) holdings: Vec<Holding>,
  pub(crate) budget: f64,
  pub(crate) total_invested: f64,
  pub(crate) leftover_cash: f64,
  pub(crate) expected_return: f64,
  pub(crate) volatility: f64,
  pub(crate) sharpe_ratio: f64,
  pub(crate) dropped: Vec<String>,
  pub(crate) excluded: Vec<ExcludedAsset>,
}

impl AllocationResult {
  pub fn holdings(&self) -> &[Holding] {
    &self.holdings
  }

  pub fn holding(&self, symbol: &str) -> Option<&Holding> {
    self.holdings.iter().find(|h| h.symbol == symbol)
  }

  pub fn shares(&self, symbol: &str) -> Option<u64> {
    self.holding(symbol).map(|h| h.shares)
  }

  pub fn budget(&self) -> f64 {
    self.budget
  }

  pub fn total_invested(&self) -> f64 {
    self.total_invested
  }

  pub fn leftover_cash(&self) -> f64 {
    self.leftover_cash
  }

  /// Annualized return of the realized holdings.
  pub fn expected_return(&self) -> f64 {
    self.expected_return
  }

  /// Annualized volatility of the realized holdings.
  pub fn volatility(&self) -> f64 {
    self.volatility
  }

  /// `expected_return / volatility`; NaN when volatility is zero.
  pub fn sharpe_ratio(&self) -> f64 {
    self.sharpe_ratio
  }

  /// Requested tickers without any price data.
  pub fn dropped(&self) -> &[String] {
    &self.dropped
  }

  /// Assets removed because their factor regression failed.
  pub fn excluded(&self) -> &[ExcludedAsset] {
    &self.excluded
  }

  pub(crate) fn with_diagnostics(
    mut self,
    dropped: Vec<String>,
    excluded: Vec<ExcludedAsset>,
  ) -> Self {
    self.dropped = dropped;
    self.excluded = excluded;
    self
  }

  pub fn report(&self) -> AllocationReport {
    AllocationReport::from(self)
  }
}

/// Flat view of an [`AllocationResult`] keyed by ticker.
#[derive(Clone, Debug, Serialize)]
pub struct AllocationReport {
  pub weights: BTreeMap<String, f64>,
  pub shares: BTreeMap<String, u64>,
  pub realized_weights: BTreeMap<String, f64>,
  pub expected_return: f64,
  pub volatility: f64,
  #[serde(serialize_with = "nan_as_null")]
  pub sharpe_ratio: f64,
  pub total_invested: f64,
  pub leftover_cash: f64,
  pub dropped: Vec<String>,
  pub excluded: Vec<ExcludedAsset>,
}

impl From<&AllocationResult> for AllocationReport {
  fn from(result: &AllocationResult) -> Self {
    let by_symbol = |f: fn(&Holding) -> f64| -> BTreeMap<String, f64> {
      result
        .holdings
        .iter()
        .map(|h| (h.symbol.clone(), f(h)))
        .collect()
    };
    Self {
      weights: by_symbol(|h| h.weight),
      shares: result
        .holdings
        .iter()
        .map(|h| (h.symbol.clone(), h.shares))
        .collect(),
      realized_weights: by_symbol(|h| h.realized_weight),
      expected_return: result.expected_return,
      volatility: result.volatility,
      sharpe_ratio: result.sharpe_ratio,
      total_invested: result.total_invested,
      leftover_cash: result.leftover_cash,
      dropped: result.dropped.clone(),
      excluded: result.excluded.clone(),
    }
  }
}

impl Serialize for AllocationResult {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    self.report().serialize(serializer)
  }
}

fn nan_as_null<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
  if value.is_finite() {
    serializer.serialize_f64(*value)
  } else {
    serializer.serialize_none()
  }
}
