//! # Factor Data
//!
//! $$
//! F_t=\frac{1}{100}\bigl(\text{Mkt-RF}_t,\ \text{SMB}_t,\ \text{HML}_t,\ \text{UMD}_t,\ \text{RF}_t\bigr)
//! $$
//!
//! Loading of Fama-French style factor files (a date column in `YYYYMMDD` plus
//! factor columns in percent) and their alignment into a Carhart factor matrix.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use tracing::debug;

use crate::error::AllocError;
use crate::error::Result;

/// Header names accepted for the date column, compared case-insensitively.
const DATE_COLUMNS: [&str; 2] = ["date", "dates"];

/// Momentum headers renamed to `UMD`. Matching is exact on the trimmed header,
/// so the padded spelling is kept only for parity with the published files.
pub const MOMENTUM_ALIASES: [&str; 2] = ["Mom", "Mom   "];

/// Columns required from the three-factor file.
pub const THREE_FACTOR_COLUMNS: [&str; 4] = ["Mkt-RF", "SMB", "HML", "RF"];

/// Carhart factors in the column order of [`FactorMatrix`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Factor {
  MktRf,
  Smb,
  Hml,
  Umd,
  Rf,
}

impl Factor {
  /// Regressors, in design-matrix order.
  pub const REGRESSORS: [Factor; 4] = [Factor::MktRf, Factor::Smb, Factor::Hml, Factor::Umd];
  pub const ALL: [Factor; 5] = [
    Factor::MktRf,
    Factor::Smb,
    Factor::Hml,
    Factor::Umd,
    Factor::Rf,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Factor::MktRf => "Mkt-RF",
      Factor::Smb => "SMB",
      Factor::Hml => "HML",
      Factor::Umd => "UMD",
      Factor::Rf => "RF",
    }
  }

  fn index(self) -> usize {
    self as usize
  }
}

/// One parsed factor file, values still in percent.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorTable {
  pub dates: Vec<NaiveDate>,
  pub columns: Vec<String>,
  pub values: Array2<f64>,
}

impl FactorTable {
  pub fn column_index(&self, name: &str) -> Option<usize> {
    self.columns.iter().position(|c| c == name)
  }
}

/// Read one factor file.
pub fn load_factor_file(path: impl AsRef<Path>) -> Result<FactorTable> {
  let path = path.as_ref();
  if !path.exists() {
    return Err(AllocError::NotFound(path.to_path_buf()));
  }

  let file = File::open(path)?;
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(true)
    .trim(csv::Trim::Fields)
    .from_reader(file);

  let headers: Vec<String> = reader
    .headers()
    .map_err(|e| AllocError::Parse(format!("error reading '{}': {e}", path.display())))?
    .iter()
    .map(|h| h.trim().to_string())
    .collect();

  let date_idx = headers
    .iter()
    .position(|h| DATE_COLUMNS.iter().any(|d| h.eq_ignore_ascii_case(d)))
    .ok_or_else(|| {
      AllocError::Schema(format!(
        "'Date' column not found in '{}'. Available columns: {:?}",
        path.display(),
        headers
      ))
    })?;

  let mut raw_dates = Vec::new();
  let mut flat = Vec::new();
  for record in reader.records() {
    let record =
      record.map_err(|e| AllocError::Parse(format!("error reading '{}': {e}", path.display())))?;
    if record.iter().all(|f| f.is_empty()) {
      continue;
    }
    for (i, field) in record.iter().enumerate() {
      if i == date_idx {
        raw_dates.push(field.to_string());
        continue;
      }
      let value = field.parse::<f64>().map_err(|_| {
        AllocError::Parse(format!(
          "non-numeric value '{field}' in column '{}' of '{}'",
          headers[i],
          path.display()
        ))
      })?;
      flat.push(value);
    }
  }

  if raw_dates.is_empty() {
    return Err(AllocError::EmptyData(format!(
      "the file '{}' contains no data",
      path.display()
    )));
  }

  let dates = raw_dates
    .iter()
    .map(|raw| parse_yyyymmdd(raw))
    .collect::<Result<Vec<_>>>()
    .map_err(|e| AllocError::Parse(format!("error parsing 'Date' in '{}': {e}", path.display())))?;

  let mut sorted = dates.clone();
  sorted.sort();
  if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
    return Err(AllocError::Parse(format!(
      "duplicate date {} in '{}'",
      w[0],
      path.display()
    )));
  }

  let columns: Vec<String> = headers
    .iter()
    .enumerate()
    .filter(|(i, _)| *i != date_idx)
    .map(|(_, h)| h.clone())
    .collect();
  let values = Array2::from_shape_vec((dates.len(), columns.len()), flat)
    .map_err(|e| AllocError::Parse(format!("ragged rows in '{}': {e}", path.display())))?;

  debug!(
    path = %path.display(),
    rows = dates.len(),
    columns = ?columns,
    "loaded factor file"
  );

  Ok(FactorTable {
    dates,
    columns,
    values,
  })
}

fn parse_yyyymmdd(raw: &str) -> Result<NaiveDate> {
  if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
    return Err(AllocError::Parse(format!(
      "'{raw}' does not match format YYYYMMDD"
    )));
  }
  NaiveDate::parse_from_str(raw, "%Y%m%d")
    .map_err(|e| AllocError::Parse(format!("'{raw}' is not a valid date: {e}")))
}

/// Aligned Carhart factors in decimal units, ascending by date.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorMatrix {
  dates: Vec<NaiveDate>,
  values: Array2<f64>,
}

impl FactorMatrix {
  /// `values` holds one column per [`Factor::ALL`] entry, already in decimals.
  pub fn new(dates: Vec<NaiveDate>, values: Array2<f64>) -> Result<Self> {
    if values.ncols() != Factor::ALL.len() || values.nrows() != dates.len() {
      return Err(AllocError::Schema(format!(
        "factor matrix must be {}x{}, got {}x{}",
        dates.len(),
        Factor::ALL.len(),
        values.nrows(),
        values.ncols()
      )));
    }
    if values.iter().any(|v| !v.is_finite()) {
      return Err(AllocError::Parse("factor values must be finite".into()));
    }
    let mut order: Vec<usize> = (0..dates.len()).collect();
    order.sort_by_key(|&i| dates[i]);
    if order.windows(2).any(|w| dates[w[0]] == dates[w[1]]) {
      return Err(AllocError::Parse("duplicate factor date".into()));
    }
    Ok(Self {
      dates: order.iter().map(|&i| dates[i]).collect(),
      values: values.select(Axis(0), &order),
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn column(&self, factor: Factor) -> ArrayView1<'_, f64> {
    self.values.column(factor.index())
  }

  /// Sample mean of each column over all rows, in [`Factor::ALL`] order.
  pub fn means(&self) -> Array1<f64> {
    self
      .values
      .mean_axis(Axis(0))
      .unwrap_or_else(|| Array1::zeros(Factor::ALL.len()))
  }

  /// Keep only the given rows (indices into [`Self::dates`]).
  pub fn select_rows(&self, rows: &[usize]) -> Self {
    Self {
      dates: rows.iter().map(|&i| self.dates[i]).collect(),
      values: self.values.select(Axis(0), rows),
    }
  }
}

/// Load the three-factor and momentum files, rename momentum to `UMD`,
/// inner-join on date and convert percent to decimals.
pub fn build_factor_matrix(
  three_factor_path: impl AsRef<Path>,
  momentum_path: impl AsRef<Path>,
) -> Result<FactorMatrix> {
  let ff3 = load_factor_file(three_factor_path.as_ref())?;
  let momentum = load_factor_file(momentum_path.as_ref())?;
  join_factor_tables(&ff3, &momentum, momentum_path.as_ref())
}

fn join_factor_tables(
  ff3: &FactorTable,
  momentum: &FactorTable,
  momentum_path: &Path,
) -> Result<FactorMatrix> {
  let mut ff3_idx = [0usize; 4];
  for (slot, name) in ff3_idx.iter_mut().zip(THREE_FACTOR_COLUMNS) {
    *slot = ff3.column_index(name).ok_or_else(|| {
      AllocError::Schema(format!(
        "'{name}' column not found in three-factor data. Available columns: {:?}",
        ff3.columns
      ))
    })?;
  }

  let umd_idx = MOMENTUM_ALIASES
    .iter()
    .find_map(|alias| momentum.column_index(alias))
    .ok_or_else(|| {
      AllocError::Schema(format!(
        "'Mom' column not found in '{}'. Available columns: {:?}",
        momentum_path.display(),
        momentum.columns
      ))
    })?;

  let momentum_rows: HashMap<NaiveDate, usize> = momentum
    .dates
    .iter()
    .enumerate()
    .map(|(i, d)| (*d, i))
    .collect();

  let mut dates = Vec::new();
  let mut flat = Vec::new();
  for (i, date) in ff3.dates.iter().enumerate() {
    let Some(&m) = momentum_rows.get(date) else {
      continue;
    };
    let [mkt, smb, hml, rf] = ff3_idx;
    dates.push(*date);
    flat.extend_from_slice(&[
      ff3.values[[i, mkt]] / 100.0,
      ff3.values[[i, smb]] / 100.0,
      ff3.values[[i, hml]] / 100.0,
      momentum.values[[m, umd_idx]] / 100.0,
      ff3.values[[i, rf]] / 100.0,
    ]);
  }

  if dates.is_empty() {
    return Err(AllocError::EmptyData(
      "the merged factors table is empty; check that the data files have overlapping dates".into(),
    ));
  }

  let values = Array2::from_shape_vec((dates.len(), Factor::ALL.len()), flat)
    .map_err(|e| AllocError::Parse(e.to_string()))?;
  debug!(rows = dates.len(), "joined factor tables");
  FactorMatrix::new(dates, values)
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use approx::assert_abs_diff_eq;
  use tempfile::NamedTempFile;

  use super::*;

  fn write_csv(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
  }

  const FF3: &str = "Date, Mkt-RF,  SMB,  HML,   RF\n\
                     20230103, -0.71, 0.47, 1.02, 0.017\n\
                     20230104, 0.70, 0.29, 0.58, 0.017\n\
                     20230105, -1.18, 0.03, 0.89, 0.017\n";

  #[test]
  fn missing_file_is_not_found() {
    let err = load_factor_file("/definitely/not/here.csv").unwrap_err();
    assert!(matches!(err, AllocError::NotFound(_)));
  }

  #[test]
  fn headers_are_trimmed_and_dates_parsed() {
    let file = write_csv(FF3);
    let table = load_factor_file(file.path()).unwrap();
    assert_eq!(table.columns, vec!["Mkt-RF", "SMB", "HML", "RF"]);
    assert_eq!(table.dates[0], NaiveDate::from_ymd_opt(2023, 1, 3).unwrap());
    assert_abs_diff_eq!(table.values[[1, 0]], 0.70);
  }

  #[test]
  fn lowercase_dates_header_is_accepted() {
    let file = write_csv("dates,Mom\n20230103,1.5\n");
    let table = load_factor_file(file.path()).unwrap();
    assert_eq!(table.columns, vec!["Mom"]);
  }

  #[test]
  fn missing_date_column_is_schema_error() {
    let file = write_csv("Day,Mom\n20230103,1.5\n");
    assert!(matches!(
      load_factor_file(file.path()),
      Err(AllocError::Schema(_))
    ));
  }

  #[test]
  fn header_only_file_is_empty_data() {
    let file = write_csv("Date,Mom\n");
    assert!(matches!(
      load_factor_file(file.path()),
      Err(AllocError::EmptyData(_))
    ));
  }

  #[test]
  fn malformed_dates_and_rows_are_parse_errors() {
    let bad_date = write_csv("Date,Mom\n2023-01-03,1.5\n");
    assert!(matches!(
      load_factor_file(bad_date.path()),
      Err(AllocError::Parse(_))
    ));

    let ragged = write_csv("Date,Mom\n20230103,1.5,9\n");
    assert!(matches!(
      load_factor_file(ragged.path()),
      Err(AllocError::Parse(_))
    ));

    let text_value = write_csv("Date,Mom\n20230103,abc\n");
    assert!(matches!(
      load_factor_file(text_value.path()),
      Err(AllocError::Parse(_))
    ));
  }

  #[test]
  fn factor_matrix_is_inner_joined_and_scaled() {
    let ff3 = write_csv(FF3);
    let mom = write_csv("Date,Mom   \n20230105,2.0\n20230104,-1.0\n20230110,3.0\n");
    let factors = build_factor_matrix(ff3.path(), mom.path()).unwrap();

    assert_eq!(factors.len(), 2);
    assert_eq!(
      factors.dates(),
      &[
        NaiveDate::from_ymd_opt(2023, 1, 4).unwrap(),
        NaiveDate::from_ymd_opt(2023, 1, 5).unwrap()
      ]
    );
    assert_abs_diff_eq!(factors.column(Factor::MktRf)[0], 0.007, epsilon = 1e-12);
    assert_abs_diff_eq!(factors.column(Factor::Umd)[0], -0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(factors.column(Factor::Umd)[1], 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(factors.column(Factor::Rf)[1], 0.00017, epsilon = 1e-12);
  }

  #[test]
  fn missing_momentum_column_is_schema_error() {
    let ff3 = write_csv(FF3);
    let mom = write_csv("Date,Momentum\n20230104,1.0\n");
    assert!(matches!(
      build_factor_matrix(ff3.path(), mom.path()),
      Err(AllocError::Schema(_))
    ));
  }

  #[test]
  fn disjoint_dates_are_empty_data() {
    let ff3 = write_csv(FF3);
    let mom = write_csv("Date,Mom\n19990104,1.0\n");
    let err = build_factor_matrix(ff3.path(), mom.path()).unwrap_err();
    assert!(matches!(err, AllocError::EmptyData(_)));
  }
}
