//! CSV price files: one `<TICKER>.csv` per ticker in a base directory.
//!
//! Files need a `date` column (YYYY-MM-DD) and either an adjusted close
//! (`adj_close` / `Adj Close`) or a `close` column; the adjusted close wins
//! when both exist. Blank price cells are treated as missing observations.

use crate::domain::error::AllocbtError;
use crate::ports::data_port::{DataPort, PricePoint};
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{ticker}.csv"))
    }

    fn normalize_header(name: &str) -> String {
        name.trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect()
    }

    fn read_all(&self, ticker: &str) -> Result<Vec<PricePoint>, AllocbtError> {
        let path = self.csv_path(ticker);
        let content = fs::read_to_string(&path).map_err(|e| AllocbtError::PriceData {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| AllocbtError::PriceData {
                reason: format!("CSV header error in {}: {}", path.display(), e),
            })?
            .iter()
            .map(Self::normalize_header)
            .collect();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let date_col = column("date").ok_or_else(|| AllocbtError::PriceData {
            reason: format!("{}: missing date column", path.display()),
        })?;
        let price_col = column("adjclose")
            .or_else(|| column("close"))
            .ok_or_else(|| AllocbtError::PriceData {
                reason: format!("{}: missing adj_close or close column", path.display()),
            })?;

        let mut points = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| AllocbtError::PriceData {
                reason: format!("CSV parse error: {}", e),
            })?;

            let date_str = record.get(date_col).unwrap_or_default().trim();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                AllocbtError::PriceData {
                    reason: format!("invalid date '{}' in {}: {}", date_str, ticker, e),
                }
            })?;

            let raw = record.get(price_col).unwrap_or_default().trim();
            if raw.is_empty() {
                continue;
            }
            let close: f64 = raw.parse().map_err(|e| AllocbtError::PriceData {
                reason: format!("invalid price '{}' in {} on {}: {}", raw, ticker, date, e),
            })?;

            points.push(PricePoint { date, close });
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, AllocbtError> {
        Ok(self
            .read_all(ticker)?
            .into_iter()
            .filter(|p| p.date >= start_date && p.date <= end_date)
            .collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, AllocbtError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| AllocbtError::PriceData {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AllocbtError::PriceData {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(ticker) = name_str.strip_suffix(".csv") {
                symbols.push(ticker.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AllocbtError> {
        if !self.csv_path(ticker).exists() {
            return Ok(None);
        }
        let points = self.read_all(ticker)?;
        Ok(match (points.first(), points.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, points.len())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        fs::write(
            path.join("AAPL.csv"),
            "Date,Open,High,Low,Close,Adj Close,Volume\n\
             2024-01-17,110.0,120.0,105.0,115.0,114.0,55000\n\
             2024-01-15,100.0,110.0,90.0,105.0,104.0,50000\n\
             2024-01-16,105.0,115.0,100.0,110.0,109.0,60000\n",
        )
        .unwrap();
        fs::write(
            path.join("MSFT.csv"),
            "date,close\n2024-01-15,300.0\n2024-01-16,\n2024-01-17,305.5\n",
        )
        .unwrap();
        fs::write(path.join("EMPTY.csv"), "date,close\n").unwrap();
        fs::write(path.join("BAD.csv"), "day,close\n2024-01-15,1.0\n").unwrap();
        fs::write(path.join("notes.txt"), "not a price file").unwrap();

        (dir, path)
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn fetch_prices_prefers_adjusted_close_and_sorts() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let points = adapter.fetch_prices("AAPL", d(1), d(31)).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], PricePoint { date: d(15), close: 104.0 });
        assert_eq!(points[2].date, d(17));
    }

    #[test]
    fn fetch_prices_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let points = adapter.fetch_prices("AAPL", d(16), d(16)).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, d(16));
    }

    #[test]
    fn fetch_prices_skips_blank_cells() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let points = adapter.fetch_prices("MSFT", d(1), d(31)).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].close, 305.5);
    }

    #[test]
    fn fetch_prices_errors_for_missing_file() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert!(adapter.fetch_prices("XYZ", d(1), d(31)).is_err());
    }

    #[test]
    fn fetch_prices_requires_date_column() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let err = adapter.fetch_prices("BAD", d(1), d(31)).unwrap_err();
        assert!(err.to_string().contains("missing date column"));
    }

    #[test]
    fn list_symbols_returns_csv_stems() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(
            adapter.list_symbols().unwrap(),
            vec!["AAPL", "BAD", "EMPTY", "MSFT"]
        );
    }

    #[test]
    fn data_range_reports_span_and_count() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(
            adapter.get_data_range("AAPL").unwrap(),
            Some((d(15), d(17), 3))
        );
        assert_eq!(adapter.get_data_range("EMPTY").unwrap(), None);
        assert_eq!(adapter.get_data_range("XYZ").unwrap(), None);
    }
}
