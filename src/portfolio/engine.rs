//! # Allocation Engine
//!
//! $$
//! (\text{tickers},B)\xrightarrow{\ P,\,F\ }(\mu,\Sigma)\xrightarrow{\ \max SR\ }\mathbf w\xrightarrow{\ \lfloor\cdot\rfloor\ }\mathbf n
//! $$
//!
//! End-to-end pipeline from a ticker list and budget to whole-share holdings.

use std::collections::HashSet;

use tracing::info;

use super::allocation::reconcile;
use super::optimizer::max_sharpe;
use super::types::AllocationResult;
use crate::config::AllocatorConfig;
use crate::data::FactorMatrix;
use crate::data::FactorSource;
use crate::data::PriceMatrix;
use crate::data::PriceSource;
use crate::error::AllocError;
use crate::error::Result;
use crate::model::estimate_expected_returns;
use crate::model::shrinkage_covariance;

/// Characters accepted in a ticker besides ASCII alphanumerics, e.g. `BRK-B`,
/// `^GSPC`, `EURUSD=X`.
const TICKER_PUNCTUATION: &[char] = &['.', '-', '^', '='];

/// Allocation engine over a price provider and a factor provider.
#[derive(Clone, Debug)]
pub struct Allocator<P, F> {
  config: AllocatorConfig,
  prices: P,
  factors: F,
}

impl<P: PriceSource, F: FactorSource> Allocator<P, F> {
  pub fn new(config: AllocatorConfig, prices: P, factors: F) -> Self {
    Self {
      config,
      prices,
      factors,
    }
  }

  pub fn config(&self) -> &AllocatorConfig {
    &self.config
  }

  /// Allocate `budget` across `tickers`. Input is validated before any data
  /// is requested from the providers.
  pub fn allocate(&self, tickers: &[String], budget: f64) -> Result<AllocationResult> {
    self.config.validate()?;
    let tickers = validate_request(tickers, budget)?;

    info!(
      tickers = ?tickers,
      budget,
      start = %self.config.history_start,
      end = %self.config.history_end,
      "starting allocation"
    );

    let prices =
      self
        .prices
        .get_prices(&tickers, self.config.history_start, self.config.history_end)?;
    let factors = self.factors.factor_matrix()?;
    allocate_with_data(prices, &factors, budget, &self.config)
  }
}

/// Trimmed tickers, or `Validation` for an empty list, a blank or malformed
/// ticker, a duplicate, or a non-positive budget.
pub fn validate_request(tickers: &[String], budget: f64) -> Result<Vec<String>> {
  if !(budget.is_finite() && budget > 0.0) {
    return Err(AllocError::Validation(format!(
      "budget must be a positive number, got {budget}"
    )));
  }
  if tickers.is_empty() {
    return Err(AllocError::Validation("at least one ticker is required".into()));
  }

  let mut seen = HashSet::with_capacity(tickers.len());
  let mut cleaned = Vec::with_capacity(tickers.len());
  for raw in tickers {
    let t = raw.trim();
    if t.is_empty() {
      return Err(AllocError::Validation("tickers must not be blank".into()));
    }
    if !t
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || TICKER_PUNCTUATION.contains(&c))
    {
      return Err(AllocError::Validation(format!("invalid ticker '{t}'")));
    }
    if !seen.insert(t.to_string()) {
      return Err(AllocError::Validation(format!("duplicate ticker '{t}'")));
    }
    cleaned.push(t.to_string());
  }
  Ok(cleaned)
}

/// The allocation pipeline on data already in memory.
pub fn allocate_with_data(
  prices: PriceMatrix,
  factors: &FactorMatrix,
  budget: f64,
  config: &AllocatorConfig,
) -> Result<AllocationResult> {
  if !(budget.is_finite() && budget > 0.0) {
    return Err(AllocError::Validation(format!(
      "budget must be a positive number, got {budget}"
    )));
  }

  let (prices, dropped) = prices.drop_missing_assets()?;
  let expected = estimate_expected_returns(
    &prices,
    factors,
    config.periods_per_year,
    config.regression_failure,
  )?;
  let prices = prices.restrict_to(expected.symbols())?;
  let covariance =
    shrinkage_covariance(&prices, config.shrinkage_target, config.per_period_epsilon())?;

  let weights = max_sharpe(&expected, &covariance, true)?
    .clean(config.weight_cutoff, config.weight_decimals);
  let latest = prices.latest_prices();
  let result = reconcile(
    &weights,
    budget,
    &latest.to_vec(),
    &expected,
    &covariance,
    config.periods_per_year,
  )?
  .with_diagnostics(dropped, expected.excluded().to_vec());

  info!(
    assets = result.holdings().len(),
    invested = result.total_invested(),
    leftover = result.leftover_cash(),
    expected_return = result.expected_return(),
    volatility = result.volatility(),
    sharpe = result.sharpe_ratio(),
    shrinkage = covariance.shrinkage(),
    "allocation complete"
  );
  Ok(result)
}
