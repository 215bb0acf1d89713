//! Return/covariance estimation over a trailing window.
//!
//! The estimator owns a return table built once from the price history. For an
//! evaluation date it takes the last `window` return observations dated
//! strictly before that date, so no information from the evaluation date
//! itself leaks into the allocation.

use chrono::NaiveDate;
use ndarray::{Array1, Array2, Axis};

use super::error::EngineError;
use super::price_series::PriceSeries;

pub const DEFAULT_WINDOW: usize = 60;
pub const DEFAULT_MIN_OBSERVATIONS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    pub window: usize,
    pub min_observations: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            window: DEFAULT_WINDOW,
            min_observations: DEFAULT_MIN_OBSERVATIONS,
        }
    }
}

/// Expected returns and covariance for a set of assets at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct InformationSet {
    pub assets: Vec<String>,
    pub expected_return: Array1<f64>,
    pub covariance_matrix: Array2<f64>,
    pub observations: usize,
}

impl InformationSet {
    pub fn dimension(&self) -> usize {
        self.assets.len()
    }

    pub fn index_of(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Sub-set for the listed assets, in the listed order.
    pub fn restricted_to(&self, assets: &[String]) -> Result<InformationSet, EngineError> {
        let idx = assets
            .iter()
            .map(|a| {
                self.index_of(a).ok_or_else(|| EngineError::DataInsufficiency {
                    reason: format!("no estimate for {a}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InformationSet {
            assets: assets.to_vec(),
            expected_return: self.expected_return.select(Axis(0), &idx),
            covariance_matrix: self
                .covariance_matrix
                .select(Axis(0), &idx)
                .select(Axis(1), &idx),
            observations: self.observations,
        })
    }

    /// Correlation matrix implied by the covariance; zero-variance assets get zero correlation.
    pub fn correlation_matrix(&self) -> Array2<f64> {
        let std: Array1<f64> = self.covariance_matrix.diag().mapv(f64::sqrt);
        let n = self.dimension();
        Array2::from_shape_fn((n, n), |(i, j)| {
            let denom = std[i] * std[j];
            if denom > 0.0 {
                self.covariance_matrix[[i, j]] / denom
            } else {
                0.0
            }
        })
    }
}

pub struct InformationEstimator {
    returns: PriceSeries,
    config: EstimatorConfig,
}

impl InformationEstimator {
    /// Build the return table from a price history.
    pub fn new(prices: &PriceSeries, config: EstimatorConfig) -> Self {
        Self {
            returns: prices.pct_change(),
            config,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn compute_information(&self, date: NaiveDate) -> Result<InformationSet, EngineError> {
        let end = self.returns.rows_before(date);
        let start = end.saturating_sub(self.config.window);
        let rows = end - start;
        let need = self.config.min_observations.max(2);

        if rows < need {
            return Err(EngineError::DataInsufficiency {
                reason: format!("{rows} observations before {date}, need {need}"),
            });
        }
        self.estimate(start, end)
    }

    /// Estimates over every return in the history, ignoring the window.
    pub fn full_sample(&self) -> Result<InformationSet, EngineError> {
        let rows = self.returns.len();
        if rows < 2 {
            return Err(EngineError::DataInsufficiency {
                reason: format!("{rows} observations in the full sample, need 2"),
            });
        }
        self.estimate(0, rows)
    }

    fn estimate(&self, start: usize, end: usize) -> Result<InformationSet, EngineError> {
        let rows = end - start;
        let assets = self.returns.assets();
        let mut window = Array2::<f64>::zeros((rows, assets.len()));
        for (r, row) in (start..end).enumerate() {
            for (c, asset) in assets.iter().enumerate() {
                window[[r, c]] =
                    self.returns
                        .value(row, c)
                        .ok_or_else(|| EngineError::DataInsufficiency {
                            reason: format!(
                                "{asset} has no return on {}",
                                self.returns.dates()[row]
                            ),
                        })?;
            }
        }

        let expected_return = window
            .mean_axis(Axis(0))
            .ok_or_else(|| EngineError::DataInsufficiency {
                reason: "empty estimation window".into(),
            })?;
        let centered = &window - &expected_return;
        let covariance_matrix = centered.t().dot(&centered) / (rows as f64 - 1.0);

        Ok(InformationSet {
            assets: assets.to_vec(),
            expected_return,
            covariance_matrix,
            observations: rows,
        })
    }
}
