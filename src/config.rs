//! # Configuration
//!
//! $$
//! \hat\mu^{ann}=P\cdot\hat\mu,\quad \sigma^{ann}=\sqrt{P}\,\sigma,\quad P=252
//! $$
//!
//! Runtime configuration for the allocation pipeline. Every field has a default,
//! so a JSON override file only needs the fields it changes.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::error::AllocError;
use crate::error::Result;

/// Default Fama-French three-factor daily file.
pub const THREE_FACTOR_FILE: &str = "F-F_Research_Data_Factors_daily.CSV";

/// Default Fama-French momentum daily file.
pub const MOMENTUM_FILE: &str = "F-F_Momentum_Factor_daily.CSV";

/// Trading days per year.
pub const TRADING_DAYS: usize = 252;

/// Target used by the Ledoit-Wolf shrinkage estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShrinkageTarget {
  /// Mean sample variance times the identity.
  #[default]
  ConstantVariance,
  /// Sample variances with the average pairwise correlation off the diagonal.
  ConstantCorrelation,
}

/// What to do when a single asset's factor regression cannot be fitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionFailurePolicy {
  /// Drop the asset, log a warning and keep going with the rest.
  #[default]
  Exclude,
  /// Fail the whole estimation on the first asset that cannot be fitted.
  Abort,
}

/// Locations of the two factor files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorFiles {
  pub three_factor: PathBuf,
  pub momentum: PathBuf,
}

impl Default for FactorFiles {
  fn default() -> Self {
    Self {
      three_factor: PathBuf::from(THREE_FACTOR_FILE),
      momentum: PathBuf::from(MOMENTUM_FILE),
    }
  }
}

impl FactorFiles {
  pub fn new(three_factor: impl Into<PathBuf>, momentum: impl Into<PathBuf>) -> Self {
    Self {
      three_factor: three_factor.into(),
      momentum: momentum.into(),
    }
  }
}

/// Runtime configuration for [`crate::portfolio::Allocator`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
  /// Periods per year used to annualize returns and volatility.
  pub periods_per_year: usize,
  /// First date of the price history requested from the price source.
  pub history_start: NaiveDate,
  /// End (exclusive) of the requested price history.
  pub history_end: NaiveDate,
  /// Shrinkage target for the covariance estimator.
  pub shrinkage_target: ShrinkageTarget,
  /// Diagonal bump, in annualized units, applied when the covariance is not
  /// positive definite.
  pub regularization_epsilon: f64,
  /// Weights below this magnitude are snapped to zero.
  pub weight_cutoff: f64,
  /// Decimal places kept when cleaning weights.
  pub weight_decimals: u32,
  /// Per-asset regression failure handling.
  pub regression_failure: RegressionFailurePolicy,
  /// Factor files read on every allocation.
  pub factor_files: FactorFiles,
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self {
      periods_per_year: TRADING_DAYS,
      history_start: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default(),
      history_end: NaiveDate::from_ymd_opt(2023, 10, 1).unwrap_or_default(),
      shrinkage_target: ShrinkageTarget::default(),
      regularization_epsilon: 1e-6,
      weight_cutoff: 1e-4,
      weight_decimals: 5,
      regression_failure: RegressionFailurePolicy::default(),
      factor_files: FactorFiles::default(),
    }
  }
}

impl AllocatorConfig {
  /// Load a configuration from a JSON file; absent fields keep their defaults.
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if !path.exists() {
      return Err(AllocError::NotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&raw)
      .map_err(|e| AllocError::Parse(format!("config '{}': {e}", path.display())))?;
    config.validate()?;
    Ok(config)
  }

  /// `regularization_epsilon` rescaled to the per-period covariance.
  pub fn per_period_epsilon(&self) -> f64 {
    self.regularization_epsilon / self.periods_per_year.max(1) as f64
  }

  pub fn validate(&self) -> Result<()> {
    if self.periods_per_year == 0 {
      return Err(AllocError::Validation(
        "periods_per_year must be > 0".into(),
      ));
    }
    if self.history_start >= self.history_end {
      return Err(AllocError::Validation(format!(
        "history_start {} must be before history_end {}",
        self.history_start, self.history_end
      )));
    }
    if !(self.regularization_epsilon.is_finite() && self.regularization_epsilon > 0.0) {
      return Err(AllocError::Validation(
        "regularization_epsilon must be a positive number".into(),
      ));
    }
    if !(self.weight_cutoff.is_finite() && self.weight_cutoff >= 0.0) {
      return Err(AllocError::Validation(
        "weight_cutoff must be a non-negative number".into(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn defaults_match_daily_french_setup() {
    let cfg = AllocatorConfig::default();
    assert_eq!(cfg.periods_per_year, 252);
    assert_eq!(cfg.weight_decimals, 5);
    assert_eq!(cfg.factor_files.momentum, PathBuf::from(MOMENTUM_FILE));
    assert!(cfg.validate().is_ok());
  }

  #[test]
  fn json_overrides_keep_remaining_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let json = r#"{
      "periods_per_year": 12,
      "regression_failure": "abort",
      "shrinkage_target": "constant_correlation"
    }"#;
    write!(file, "{json}").unwrap();

    let cfg = AllocatorConfig::from_json_file(file.path()).unwrap();
    assert_eq!(cfg.periods_per_year, 12);
    assert_eq!(cfg.regression_failure, RegressionFailurePolicy::Abort);
    assert_eq!(cfg.shrinkage_target, ShrinkageTarget::ConstantCorrelation);
    assert_eq!(cfg.weight_cutoff, 1e-4);
  }

  #[test]
  fn regularization_epsilon_is_scaled_to_one_period() {
    let daily = AllocatorConfig::default();
    assert_eq!(daily.per_period_epsilon(), 1e-6 / 252.0);

    let monthly = AllocatorConfig {
      periods_per_year: 12,
      regularization_epsilon: 1.2e-5,
      ..AllocatorConfig::default()
    };
    assert_eq!(monthly.per_period_epsilon() * 12.0, 1.2e-5);
  }

  #[test]
  fn inverted_history_window_is_rejected() {
    let cfg = AllocatorConfig {
      history_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      history_end: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
      ..AllocatorConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(AllocError::Validation(_))));
  }
}
