//! # Errors
//!
//! $$
//! \text{allocate}:(\text{tickers},B)\to\text{AllocationResult}\ \cup\ \text{AllocError}
//! $$
//!
//! Error taxonomy shared by the loader, estimator, optimizer and reconciler.
//! Every stage returns [`Result`] and the allocation entry point propagates the
//! error unchanged, so callers can map [`AllocError::kind`] to their own codes.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Stable classification of an [`AllocError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  NotFound,
  Parse,
  Schema,
  EmptyData,
  Infeasible,
  Validation,
  Source,
  Io,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::NotFound => "not_found",
      ErrorKind::Parse => "parse",
      ErrorKind::Schema => "schema",
      ErrorKind::EmptyData => "empty_data",
      ErrorKind::Infeasible => "infeasible",
      ErrorKind::Validation => "validation",
      ErrorKind::Source => "source",
      ErrorKind::Io => "io",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Error)]
pub enum AllocError {
  /// A factor or price file does not exist.
  #[error("file '{}' does not exist", .0.display())]
  NotFound(PathBuf),

  /// Malformed CSV content, dates or numbers.
  #[error("parse error: {0}")]
  Parse(String),

  /// A required column is missing.
  #[error("schema error: {0}")]
  Schema(String),

  /// No rows, or no overlap left after alignment/cleaning.
  #[error("empty data: {0}")]
  EmptyData(String),

  /// The optimizer cannot satisfy its constraints.
  #[error("infeasible: {0}")]
  Infeasible(String),

  /// Bad input from the caller.
  #[error("validation error: {0}")]
  Validation(String),

  /// A price or factor provider failed.
  #[error("data source error: {0}")]
  Source(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl AllocError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      AllocError::NotFound(_) => ErrorKind::NotFound,
      AllocError::Parse(_) => ErrorKind::Parse,
      AllocError::Schema(_) => ErrorKind::Schema,
      AllocError::EmptyData(_) => ErrorKind::EmptyData,
      AllocError::Infeasible(_) => ErrorKind::Infeasible,
      AllocError::Validation(_) => ErrorKind::Validation,
      AllocError::Source(_) => ErrorKind::Source,
      AllocError::Io(_) => ErrorKind::Io,
    }
  }
}

impl From<csv::Error> for AllocError {
  fn from(err: csv::Error) -> Self {
    if err.is_io_error() {
      match err.into_kind() {
        csv::ErrorKind::Io(io) => AllocError::Io(io),
        other => AllocError::Parse(format!("{other:?}")),
      }
    } else {
      AllocError::Parse(err.to_string())
    }
  }
}

/// Result type alias for allocation operations.
pub type Result<T> = std::result::Result<T, AllocError>;
