//! Price provider port.

use crate::domain::error::AllocbtError;
use chrono::NaiveDate;

/// One adjusted closing price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

pub trait DataPort {
    /// Observations for `ticker` within `[start_date, end_date]`, ascending by date.
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, AllocbtError>;

    fn list_symbols(&self) -> Result<Vec<String>, AllocbtError>;

    /// First date, last date and observation count, or `None` if the ticker is unknown.
    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AllocbtError>;
}
