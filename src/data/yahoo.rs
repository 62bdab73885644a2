//! # Yahoo Finance Prices
//!
//! $$
//! P_{t,i}=\text{AdjClose}_{t,i}
//! $$
//!
//! Blocking adjusted-close download through `yahoo_finance_api`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Datelike;
use chrono::NaiveDate;
use ndarray::Array2;
use time::Month;
use time::OffsetDateTime;
use tracing::debug;
use tracing::warn;
use yahoo_finance_api::YahooConnector;

use super::prices::PriceMatrix;
use super::source::PriceSource;
use crate::error::AllocError;
use crate::error::Result;

#[derive(Clone, Debug, Default)]
pub struct YahooPriceSource;

impl YahooPriceSource {
  pub fn new() -> Self {
    Self
  }
}

fn to_offset(date: NaiveDate) -> Result<OffsetDateTime> {
  let month = Month::try_from(date.month() as u8)
    .map_err(|e| AllocError::Validation(format!("bad month in {date}: {e}")))?;
  let day = time::Date::from_calendar_date(date.year(), month, date.day() as u8)
    .map_err(|e| AllocError::Validation(format!("bad date {date}: {e}")))?;
  Ok(day.midnight().assume_utc())
}

impl PriceSource for YahooPriceSource {
  fn get_prices(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<PriceMatrix> {
    let provider = YahooConnector::new().map_err(|e| AllocError::Source(e.to_string()))?;
    let (from, to) = (to_offset(start)?, to_offset(end)?);

    let mut series: Vec<BTreeMap<NaiveDate, f64>> = Vec::with_capacity(tickers.len());
    let mut all_dates = BTreeSet::new();
    for ticker in tickers {
      let mut closes = BTreeMap::new();
      match provider
        .get_quote_history(ticker, from, to)
        .and_then(|resp| resp.quotes())
      {
        Ok(quotes) => {
          for q in quotes {
            if let Some(dt) = DateTime::from_timestamp(q.timestamp as i64, 0) {
              let date = dt.date_naive();
              if date >= start && date < end {
                closes.insert(date, q.adjclose);
                all_dates.insert(date);
              }
            }
          }
          debug!(ticker = %ticker, rows = closes.len(), "downloaded quotes");
        }
        Err(e) => warn!(ticker = %ticker, error = %e, "no quotes returned"),
      }
      series.push(closes);
    }

    let dates: Vec<NaiveDate> = all_dates.into_iter().collect();
    let mut values = Array2::from_elem((dates.len(), tickers.len()), f64::NAN);
    for (j, closes) in series.iter().enumerate() {
      for (i, date) in dates.iter().enumerate() {
        if let Some(p) = closes.get(date) {
          values[[i, j]] = *p;
        }
      }
    }

    PriceMatrix::new(dates, tickers.to_vec(), values)
  }
}
