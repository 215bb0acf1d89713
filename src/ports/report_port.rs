//! Report writing port.

use std::path::PathBuf;

use crate::domain::backtest::{BacktestConfig, BacktestResult, RiskReport};
use crate::domain::error::AllocbtError;
use crate::domain::information::InformationSet;
use crate::domain::metrics::Metrics;
use crate::domain::strategy::Strategy;

/// Everything a finished run produced.
pub struct RunReport<'a> {
    pub strategy: &'a Strategy,
    pub config: &'a BacktestConfig,
    pub result: &'a BacktestResult,
    pub metrics: &'a Metrics,
    pub risk: Option<&'a RiskReport>,
    /// Full-sample estimate over the processed price history.
    pub information: Option<&'a InformationSet>,
}

pub trait ReportPort {
    /// Persist the report and return the files written.
    fn write(&self, report: &RunReport<'_>) -> Result<Vec<PathBuf>, AllocbtError>;
}
