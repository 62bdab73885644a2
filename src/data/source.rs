//! # Data Sources
//!
//! $$
//! \text{get\_prices}:(\text{tickers},t_0,t_1)\to P,\qquad \text{factor\_matrix}:()\to F
//! $$
//!
//! Collaborator seams used by the allocation engine. Implementations are
//! synchronous; retries and timeouts belong to the caller.

use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use chrono::NaiveDate;
use ndarray::Array2;
use tracing::debug;
use tracing::warn;

use super::factors::build_factor_matrix;
use super::factors::FactorMatrix;
use super::prices::PriceMatrix;
use crate::config::FactorFiles;
use crate::error::AllocError;
use crate::error::Result;

/// Provider of adjusted-close prices.
pub trait PriceSource {
  /// Prices for `tickers` on `start <= date < end`. Unknown tickers come back
  /// as all-missing columns rather than errors.
  fn get_prices(&self, tickers: &[String], start: NaiveDate, end: NaiveDate)
    -> Result<PriceMatrix>;
}

/// Provider of the aligned Carhart factor matrix.
pub trait FactorSource {
  fn factor_matrix(&self) -> Result<FactorMatrix>;
}

impl PriceSource for PriceMatrix {
  fn get_prices(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<PriceMatrix> {
    let window = self.between(start, end);
    let mut values = Array2::from_elem((window.n_dates(), tickers.len()), f64::NAN);
    for (j, ticker) in tickers.iter().enumerate() {
      if let Some(col) = window.column(ticker) {
        values.column_mut(j).assign(&col);
      }
    }
    PriceMatrix::new(window.dates().to_vec(), tickers.to_vec(), values)
  }
}

impl FactorSource for FactorMatrix {
  fn factor_matrix(&self) -> Result<FactorMatrix> {
    Ok(self.clone())
  }
}

impl FactorSource for FactorFiles {
  fn factor_matrix(&self) -> Result<FactorMatrix> {
    build_factor_matrix(&self.three_factor, &self.momentum)
  }
}

/// Wide price CSV: a `Date` column (`YYYY-MM-DD`) followed by one column per
/// ticker. Empty cells are missing prices.
#[derive(Clone, Debug)]
pub struct CsvPriceSource {
  path: PathBuf,
}

impl CsvPriceSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Read the whole file.
  pub fn load(&self) -> Result<PriceMatrix> {
    if !self.path.exists() {
      return Err(AllocError::NotFound(self.path.clone()));
    }
    let mut reader = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .from_reader(File::open(&self.path)?);

    let headers = reader.headers()?.clone();
    let date_idx = headers
      .iter()
      .position(|h| h.eq_ignore_ascii_case("date"))
      .ok_or_else(|| {
        AllocError::Schema(format!(
          "'Date' column not found in '{}'",
          self.path.display()
        ))
      })?;
    let symbols: Vec<String> = headers
      .iter()
      .enumerate()
      .filter(|(i, _)| *i != date_idx)
      .map(|(_, h)| h.to_string())
      .collect();

    let mut dates = Vec::new();
    let mut flat = Vec::new();
    for record in reader.records() {
      let record = record?;
      for (i, field) in record.iter().enumerate() {
        if i == date_idx {
          let date = NaiveDate::parse_from_str(field, "%Y-%m-%d").map_err(|e| {
            AllocError::Parse(format!(
              "bad date '{field}' in '{}': {e}",
              self.path.display()
            ))
          })?;
          dates.push(date);
        } else if field.is_empty() {
          flat.push(f64::NAN);
        } else {
          let price = field.parse::<f64>().map_err(|_| {
            AllocError::Parse(format!(
              "bad price '{field}' in '{}'",
              self.path.display()
            ))
          })?;
          flat.push(price);
        }
      }
    }

    let values = Array2::from_shape_vec((dates.len(), symbols.len()), flat)
      .map_err(|e| AllocError::Parse(e.to_string()))?;
    debug!(
      path = %self.path.display(),
      rows = dates.len(),
      assets = symbols.len(),
      "loaded price file"
    );
    PriceMatrix::new(dates, symbols, values)
  }
}

impl PriceSource for CsvPriceSource {
  fn get_prices(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<PriceMatrix> {
    let all = self.load()?;
    let unknown: Vec<&String> = tickers
      .iter()
      .filter(|t| !all.symbols().contains(*t))
      .collect();
    if !unknown.is_empty() {
      warn!(?unknown, "tickers not present in price file");
    }
    all.get_prices(tickers, start, end)
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tempfile::NamedTempFile;

  use super::*;

  fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
  }

  #[test]
  fn csv_source_selects_tickers_and_window() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
      file,
      "Date,AAA,BBB\n2024-01-02,10,20\n2024-01-03,11,\n2024-01-04,12,22\n"
    )
    .unwrap();

    let source = CsvPriceSource::new(file.path());
    let tickers = vec!["BBB".to_string(), "ZZZ".to_string()];
    let prices = source
      .get_prices(&tickers, d(2024, 1, 3), d(2024, 1, 5))
      .unwrap();

    assert_eq!(prices.symbols(), tickers.as_slice());
    assert_eq!(prices.dates(), &[d(2024, 1, 3), d(2024, 1, 4)]);
    assert!(prices.values()[[0, 0]].is_nan());
    assert_eq!(prices.values()[[1, 0]], 22.0);
    assert!(prices.values().column(1).iter().all(|p| p.is_nan()));
  }

  #[test]
  fn csv_source_reports_missing_file() {
    let source = CsvPriceSource::new("/nope/prices.csv");
    assert!(matches!(source.load(), Err(AllocError::NotFound(_))));
  }
}
