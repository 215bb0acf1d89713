#![allow(dead_code)]

use allocbt::domain::backtest::BacktestConfig;
use allocbt::domain::broker::{FundingPolicy, LogMode};
use allocbt::domain::error::AllocbtError;
use allocbt::domain::price_series::PriceSeries;
use allocbt::ports::data_port::{DataPort, PricePoint};
use chrono::NaiveDate;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_prices(mut self, ticker: &str, closes: &[f64]) -> Self {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: day(i),
                close,
            })
            .collect();
        self.data.insert(ticker.to_string(), points);
        self
    }

    pub fn with_points(mut self, ticker: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(ticker.to_string(), points);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, AllocbtError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(AllocbtError::PriceData {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(ticker)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.date >= start_date && p.date <= end_date)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, AllocbtError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AllocbtError> {
        match self.data.get(ticker) {
            Some(points) if !points.is_empty() => {
                let min = points.iter().map(|p| p.date).min().unwrap();
                let max = points.iter().map(|p| p.date).max().unwrap();
                Ok(Some((min, max, points.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// The `i`-th consecutive calendar day from 2024-01-01.
pub fn day(i: usize) -> NaiveDate {
    date(2024, 1, 1) + chrono::Duration::days(i as i64)
}

/// Series dated `day(0)..`, one column per `(asset, closes)`.
pub fn series(columns: &[(&str, &[f64])]) -> PriceSeries {
    PriceSeries::from_columns(
        columns
            .iter()
            .map(|(asset, closes)| {
                (
                    asset.to_string(),
                    closes
                        .iter()
                        .enumerate()
                        .map(|(i, &c)| (day(i), c))
                        .collect(),
                )
            })
            .collect(),
    )
    .unwrap()
}

/// Smooth but not collinear price paths, long enough for covariance estimation.
pub fn wavy_prices(count: usize, start: f64, phase: f64) -> Vec<f64> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            start * (1.0 + 0.002 * t + 0.02 * (0.7 * t + phase).sin() + 0.01 * (1.3 * t).cos())
        })
        .collect()
}

/// Frictionless config covering every date, with risk exits disabled.
pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        start_date: date(2024, 1, 1),
        end_date: date(2024, 12, 31),
        initial_cash: 100_000.0,
        transaction_cost: 0.0,
        stop_loss: 1.0,
        take_profit: 1.0,
        allow_shorting: false,
        allow_reentry: false,
        funding: FundingPolicy::PartialFill,
        log_mode: LogMode::Incremental,
    }
}
