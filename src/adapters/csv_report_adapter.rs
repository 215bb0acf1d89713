//! CSV report files for a finished run.
//!
//! Writes into one output directory:
//! `portfolio_value.csv`, `transactions.csv`, `date_outcomes.csv`,
//! `summary.csv` and, when an estimate is supplied, `correlation.csv`.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::error::AllocbtError;
use crate::domain::information::InformationSet;
use crate::ports::report_port::{ReportPort, RunReport};

pub const VALUES_FILE: &str = "portfolio_value.csv";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const OUTCOMES_FILE: &str = "date_outcomes.csv";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const CORRELATION_FILE: &str = "correlation.csv";

pub struct CsvReportAdapter {
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct ValueRow {
    date: String,
    value: f64,
    #[serde(rename = "return")]
    daily_return: Option<f64>,
}

#[derive(Serialize)]
struct TransactionRow<'a> {
    date: String,
    asset: &'a str,
    side: String,
    quantity: f64,
    price: f64,
    cost: f64,
}

#[derive(Serialize)]
struct OutcomeRow {
    date: String,
    state: &'static str,
    detail: String,
    exits: String,
}

#[derive(Serialize)]
struct SummaryRow {
    metric: &'static str,
    value: String,
}

fn csv_error(path: &Path, e: csv::Error) -> AllocbtError {
    AllocbtError::Io(std::io::Error::other(format!("{}: {}", path.display(), e)))
}

fn write_rows<T: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<(), AllocbtError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

/// Square asset-by-asset matrix with a leading `asset` column.
fn write_correlation(path: &Path, info: &InformationSet) -> Result<(), AllocbtError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    let header = std::iter::once("asset").chain(info.assets.iter().map(String::as_str));
    writer
        .write_record(header)
        .map_err(|e| csv_error(path, e))?;

    let corr = info.correlation_matrix();
    for (i, asset) in info.assets.iter().enumerate() {
        let row = corr.row(i);
        let record = std::iter::once(asset.clone())
            .chain(row.iter().map(|c| format!("{c:.6}")));
        writer
            .write_record(record)
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

impl CsvReportAdapter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn summary_rows(report: &RunReport<'_>) -> Vec<SummaryRow> {
        let m = report.metrics;
        let r = report.result;
        let mut pairs = vec![
            ("strategy", report.strategy.kind().to_string()),
            ("start_date", report.config.start_date.to_string()),
            ("end_date", report.config.end_date.to_string()),
            ("initial_cash", format!("{:.2}", report.config.initial_cash)),
            ("final_value", format!("{:.2}", m.final_value)),
            ("total_return", format!("{:.6}", m.total_return)),
            ("annualized_return", format!("{:.6}", m.annualized_return)),
            ("sharpe_ratio", format!("{:.4}", m.sharpe_ratio)),
            ("sortino_ratio", format!("{:.4}", m.sortino_ratio)),
            ("max_drawdown", format!("{:.6}", m.max_drawdown)),
            ("max_drawdown_duration", m.max_drawdown_duration.to_string()),
            ("trades", m.trades.to_string()),
            ("stop_loss_exits", m.stop_loss_exits.to_string()),
            ("take_profit_exits", m.take_profit_exits.to_string()),
            ("total_costs", format!("{:.2}", m.total_costs)),
            ("realized_pnl", format!("{:.2}", r.realized_pnl)),
            ("executed_dates", r.executed_dates().to_string()),
            ("skipped_dates", r.skipped_dates().to_string()),
        ];
        if let Some(risk) = report.risk {
            pairs.push(("confidence_level", risk.confidence_level.to_string()));
            pairs.push(("value_at_risk", format!("{:.2}", risk.var)));
            pairs.push(("expected_shortfall", format!("{:.2}", risk.expected_shortfall)));
        }
        pairs
            .into_iter()
            .map(|(metric, value)| SummaryRow { metric, value })
            .collect()
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, report: &RunReport<'_>) -> Result<Vec<PathBuf>, AllocbtError> {
        fs::create_dir_all(&self.output_dir)?;
        let result = report.result;

        let values_path = self.output_dir.join(VALUES_FILE);
        let mut previous: Option<f64> = None;
        write_rows(
            &values_path,
            result.values.iter().map(|p| {
                let daily_return = previous.filter(|v| *v > 0.0).map(|v| p.value / v - 1.0);
                previous = Some(p.value);
                ValueRow {
                    date: p.date.to_string(),
                    value: p.value,
                    daily_return,
                }
            }),
        )?;

        let transactions_path = self.output_dir.join(TRANSACTIONS_FILE);
        write_rows(
            &transactions_path,
            result.transactions.iter().map(|t| TransactionRow {
                date: t.date.to_string(),
                asset: &t.asset,
                side: t.side.to_string(),
                quantity: t.quantity,
                price: t.price,
                cost: t.cost,
            }),
        )?;

        let outcomes_path = self.output_dir.join(OUTCOMES_FILE);
        write_rows(
            &outcomes_path,
            result.outcomes.iter().map(|o| OutcomeRow {
                date: o.date.to_string(),
                state: o.state.as_str(),
                detail: o.detail.clone().unwrap_or_default(),
                exits: o
                    .exits
                    .iter()
                    .map(|(asset, trigger)| format!("{asset}:{}", trigger.as_str()))
                    .collect::<Vec<_>>()
                    .join(";"),
            }),
        )?;

        let summary_path = self.output_dir.join(SUMMARY_FILE);
        write_rows(&summary_path, Self::summary_rows(report))?;

        let mut files = vec![values_path, transactions_path, outcomes_path, summary_path];
        if let Some(info) = report.information {
            let correlation_path = self.output_dir.join(CORRELATION_FILE);
            write_correlation(&correlation_path, info)?;
            files.push(correlation_path);
        }
        Ok(files)
    }
}
