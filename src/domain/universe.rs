//! Ticker lists and assembly of the aligned price history.

use crate::domain::error::AllocbtError;
use crate::domain::price_series::PriceSeries;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("no tickers given")]
    Empty,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),
}

/// Split a comma-separated ticker list. Blank entries are ignored and
/// tickers are upper-cased.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let ticker = trimmed.to_uppercase();
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    if tickers.is_empty() {
        return Err(UniverseError::Empty);
    }
    Ok(tickers)
}

/// Fetch every ticker and align the series on the union of their dates.
///
/// Tickers that fail or return nothing are skipped with a warning; the call
/// fails with [`AllocbtError::NoData`] only when no ticker has data.
pub fn get_stocks_data(
    data_port: &dyn DataPort,
    tickers: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<PriceSeries, AllocbtError> {
    let mut columns = Vec::with_capacity(tickers.len());

    for ticker in tickers {
        let points = match data_port.fetch_prices(ticker, start_date, end_date) {
            Ok(points) => points,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "skipping ticker");
                continue;
            }
        };
        if points.is_empty() {
            warn!(ticker = %ticker, "skipping ticker with no data in range");
            continue;
        }
        info!(ticker = %ticker, observations = points.len(), "loaded prices");
        columns.push((
            ticker.clone(),
            points.into_iter().map(|p| (p.date, p.close)).collect(),
        ));
    }

    if columns.is_empty() {
        return Err(AllocbtError::NoData {
            tickers: tickers.join(","),
        });
    }

    PriceSeries::from_columns(columns)
}
