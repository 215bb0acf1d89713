//! Date-indexed price table and per-date price rows.
//!
//! A [`PriceSeries`] is a dense table: one row per date (strictly
//! increasing), one column per asset (unique). Missing observations are
//! gaps (`None`), never sentinel values.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::error::AllocbtError;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
    date_index: HashMap<NaiveDate, usize>,
}

impl PriceSeries {
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<String>,
        values: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, AllocbtError> {
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AllocbtError::InvalidSeries {
                reason: "dates must be strictly increasing".into(),
            });
        }

        let mut seen = HashSet::new();
        for asset in &assets {
            if !seen.insert(asset.as_str()) {
                return Err(AllocbtError::InvalidSeries {
                    reason: format!("duplicate column {asset}"),
                });
            }
        }

        if values.len() != dates.len() {
            return Err(AllocbtError::InvalidSeries {
                reason: format!("{} rows for {} dates", values.len(), dates.len()),
            });
        }
        if let Some((i, row)) = values
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != assets.len())
        {
            return Err(AllocbtError::InvalidSeries {
                reason: format!(
                    "row {} has {} values, expected {}",
                    dates[i],
                    row.len(),
                    assets.len()
                ),
            });
        }

        let date_index = dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();
        Ok(Self {
            dates,
            assets,
            values,
            date_index,
        })
    }

    /// Align per-asset observation lists on the union of their dates.
    ///
    /// Dates an asset has no observation for become gaps.
    pub fn from_columns(
        columns: Vec<(String, Vec<(NaiveDate, f64)>)>,
    ) -> Result<Self, AllocbtError> {
        let dates: Vec<NaiveDate> = columns
            .iter()
            .flat_map(|(_, obs)| obs.iter().map(|(d, _)| *d))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let position: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();

        let mut values = vec![vec![None; columns.len()]; dates.len()];
        let mut assets = Vec::with_capacity(columns.len());
        for (col, (asset, obs)) in columns.into_iter().enumerate() {
            for (date, price) in obs {
                values[position[&date]][col] = Some(price);
            }
            assets.push(asset);
        }

        Self::new(dates, assets, values)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn get_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(row)?.get(col).copied().flatten()
    }

    /// Number of rows strictly before `date`, whether or not `date` is in the table.
    pub fn rows_before(&self, date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d < date)
    }

    pub fn row(&self, index: usize) -> Option<PriceRow> {
        let values = self.values.get(index)?;
        Some(PriceRow {
            date: self.dates[index],
            prices: self
                .assets
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .collect(),
        })
    }

    pub fn row_at(&self, date: NaiveDate) -> Option<PriceRow> {
        self.get_index(date).and_then(|i| self.row(i))
    }

    /// Simple returns `p_t / p_{t-1} - 1`, dated at `t`. The first date is dropped.
    ///
    /// A return is a gap when either endpoint is a gap or the prior price is zero.
    pub fn pct_change(&self) -> PriceSeries {
        let values: Vec<Vec<Option<f64>>> = self
            .values
            .windows(2)
            .map(|w| {
                w[0].iter()
                    .zip(w[1].iter())
                    .map(|(prev, curr)| match (prev, curr) {
                        (Some(p), Some(c)) if *p != 0.0 => Some(c / p - 1.0),
                        _ => None,
                    })
                    .collect()
            })
            .collect();
        let dates = self.dates.iter().skip(1).copied().collect();
        self.rebuilt(dates, values)
    }

    /// Drop every date that has at least one gap.
    pub fn drop_incomplete(&self) -> PriceSeries {
        self.filter_rows(|row| row.iter().all(Option::is_some))
    }

    fn filter_rows(&self, keep: impl Fn(&[Option<f64>]) -> bool) -> PriceSeries {
        let (dates, values): (Vec<_>, Vec<_>) = self
            .dates
            .iter()
            .zip(self.values.iter())
            .filter(|(_, row)| keep(row))
            .map(|(d, row)| (*d, row.clone()))
            .unzip();
        self.rebuilt(dates, values)
    }

    fn rebuilt(&self, dates: Vec<NaiveDate>, values: Vec<Vec<Option<f64>>>) -> PriceSeries {
        let date_index = dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();
        PriceSeries {
            dates,
            assets: self.assets.clone(),
            values,
            date_index,
        }
    }
}

/// Clean raw provider data for strategy consumption.
///
/// Non-finite and non-positive prices become gaps; dates left with no
/// observation at all are removed. Dates with partial gaps are kept so the
/// simulation loop can report them.
pub fn preprocess_data(series: &PriceSeries) -> PriceSeries {
    let values = series
        .values
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| v.filter(|p| p.is_finite() && *p > 0.0))
                .collect()
        })
        .collect();
    series
        .rebuilt(series.dates.clone(), values)
        .filter_rows(|row| row.iter().any(Option::is_some))
}

/// Prices of every asset on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub prices: BTreeMap<String, Option<f64>>,
}

impl PriceRow {
    pub fn get(&self, asset: &str) -> Option<f64> {
        self.prices.get(asset).copied().flatten()
    }

    pub fn is_complete(&self) -> bool {
        self.prices.values().all(Option::is_some)
    }

    pub fn missing_assets(&self) -> Vec<String> {
        self.prices
            .iter()
            .filter(|(_, p)| p.is_none())
            .map(|(a, _)| a.clone())
            .collect()
    }

    /// Assets with a usable (finite, positive) price, in asset order.
    pub fn valid_assets(&self) -> Vec<String> {
        self.prices
            .iter()
            .filter(|(_, p)| p.is_some_and(|v| v.is_finite() && v > 0.0))
            .map(|(a, _)| a.clone())
            .collect()
    }

    /// Keep only the listed assets.
    pub fn restricted_to(&self, assets: &[String]) -> PriceRow {
        PriceRow {
            date: self.date,
            prices: self
                .prices
                .iter()
                .filter(|(a, _)| assets.contains(*a))
                .map(|(a, p)| (a.clone(), *p))
                .collect(),
        }
    }
}
