//! Backtest configuration and the date-ordered simulation loop.
//!
//! For each date the loop runs: risk exits, completeness check, universe
//! selection, estimation, allocation, rebalancing, valuation. Risk exits run on
//! every date in range. A failure at any later step is recorded as that date's
//! [`DateOutcome`] and the loop moves on; only an empty result is fatal, and
//! only when risk figures are requested.

use chrono::NaiveDate;
use std::fmt;
use tracing::{info, warn};

use super::broker::{Broker, BrokerConfig, FundingPolicy, LogMode, TransactionRecord};
use super::error::{AllocbtError, EngineError};
use super::information::InformationEstimator;
use super::metrics::value_returns;
use super::portfolio::Portfolio;
use super::position::ExitTrigger;
use super::price_series::{PriceRow, PriceSeries};
use super::risk_metrics::{calculate_expected_shortfall, calculate_var};
use super::strategy::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_cash: f64,
    pub transaction_cost: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub allow_shorting: bool,
    /// Whether an asset may be bought again after a risk exit.
    pub allow_reentry: bool,
    pub funding: FundingPolicy,
    pub log_mode: LogMode,
}

impl BacktestConfig {
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            transaction_cost: self.transaction_cost,
            allow_shorting: self.allow_shorting,
            funding: self.funding,
            log_mode: self.log_mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateState {
    Executed,
    /// Missing price data.
    Skipped,
    DataError,
    StrategyError,
    /// Rebalance rejected by the broker.
    ExecutionError,
}

impl DateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateState::Executed => "EXECUTED",
            DateState::Skipped => "SKIP",
            DateState::DataError => "DATA_ERROR",
            DateState::StrategyError => "STRATEGY_ERROR",
            DateState::ExecutionError => "EXECUTION_ERROR",
        }
    }
}

impl fmt::Display for DateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateOutcome {
    pub date: NaiveDate,
    pub state: DateState,
    pub detail: Option<String>,
    pub exits: Vec<(String, ExitTrigger)>,
}

impl DateOutcome {
    fn new(date: NaiveDate, state: DateState, detail: Option<String>) -> Self {
        Self {
            date,
            state,
            detail,
            exits: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskReport {
    pub confidence_level: f64,
    pub current_value: f64,
    pub var: f64,
    pub expected_shortfall: f64,
    pub observations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub values: Vec<ValuePoint>,
    pub transactions: Vec<TransactionRecord>,
    pub outcomes: Vec<DateOutcome>,
    pub final_cash: f64,
    pub realized_pnl: f64,
    pub total_costs: f64,
}

impl BacktestResult {
    pub fn returns(&self) -> Vec<f64> {
        value_returns(&self.values)
    }

    pub fn executed_dates(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == DateState::Executed)
            .count()
    }

    pub fn skipped_dates(&self) -> usize {
        self.outcomes.len() - self.executed_dates()
    }

    /// VaR and Expected Shortfall of the realized returns, scaled by the last value.
    ///
    /// This is the run's only terminal failure: no value point, or too few to
    /// form a return, yields [`AllocbtError::RunFailed`].
    pub fn risk_report(&self, confidence_level: f64) -> Result<RiskReport, AllocbtError> {
        let current_value = self
            .values
            .last()
            .map(|p| p.value)
            .ok_or_else(|| AllocbtError::RunFailed {
                reason: "no dates were executed".into(),
            })?;
        let returns = self.returns();
        let failed = |e: EngineError| AllocbtError::RunFailed {
            reason: format!("risk metrics: {e}"),
        };

        Ok(RiskReport {
            confidence_level,
            current_value,
            var: calculate_var(&returns, current_value, confidence_level).map_err(failed)?,
            expected_shortfall: calculate_expected_shortfall(
                &returns,
                current_value,
                confidence_level,
            )
            .map_err(failed)?,
            observations: returns.len(),
        })
    }
}

/// Run the simulation over every date of `prices` in `[start_date, end_date]`
/// except the first date of the series. Earlier history still feeds the estimator.
pub fn run_backtest(
    prices: &PriceSeries,
    strategy: &Strategy,
    estimator: &InformationEstimator,
    config: &BacktestConfig,
) -> BacktestResult {
    let mut broker = Broker::new(config.initial_cash, config.broker_config());
    let mut values = Vec::new();
    let mut transactions = Vec::new();
    let mut outcomes = Vec::new();

    for index in 1..prices.len() {
        let Some(row) = prices.row(index) else {
            continue;
        };
        let date = row.date;
        if date < config.start_date || date > config.end_date {
            continue;
        }

        let exits = broker.apply_risk_management(&row, config.stop_loss, config.take_profit, date);

        let mut outcome = rebalance_on(&mut broker, &row, strategy, estimator, config);
        if outcome.state == DateState::Executed {
            let value = broker.get_portfolio_value(&row);
            values.push(ValuePoint { date, value });
        }
        outcome.exits = exits;
        outcomes.push(outcome);

        transactions.extend(broker.get_transaction_log());
    }
    transactions.extend(broker.get_transaction_log());

    let result = BacktestResult {
        values,
        transactions,
        outcomes,
        final_cash: broker.cash(),
        realized_pnl: broker.realized_pnl(),
        total_costs: broker.costs_paid(),
    };
    info!(
        executed = result.executed_dates(),
        skipped = result.skipped_dates(),
        trades = result.transactions.len(),
        "backtest finished"
    );
    result
}

/// Select the universe, estimate, allocate and rebalance for one date.
///
/// Assets exited earlier in the run stay out of the universe unless re-entry
/// is allowed; an empty universe rebalances into cash.
fn rebalance_on(
    broker: &mut Broker,
    row: &PriceRow,
    strategy: &Strategy,
    estimator: &InformationEstimator,
    config: &BacktestConfig,
) -> DateOutcome {
    let date = row.date;
    if !row.is_complete() {
        let missing = row.missing_assets().join(", ");
        warn!(%date, missing = %missing, "skipping date with missing prices");
        return DateOutcome::new(
            date,
            DateState::Skipped,
            Some(format!("missing prices: {missing}")),
        );
    }

    let universe: Vec<String> = row
        .valid_assets()
        .into_iter()
        .filter(|a| config.allow_reentry || !broker.exited_assets().contains(a))
        .collect();

    let target = if universe.is_empty() {
        Portfolio::cash_only()
    } else {
        let info = if strategy.requires_information() {
            match estimator
                .compute_information(date)
                .and_then(|info| info.restricted_to(&universe))
            {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(%date, error = %e, "estimator failed, skipping date");
                    return DateOutcome::new(date, DateState::DataError, Some(e.to_string()));
                }
            }
        } else {
            None
        };

        match strategy.allocate(&row.restricted_to(&universe), info.as_ref()) {
            Ok(portfolio) => portfolio,
            Err(e) => {
                warn!(
                    %date,
                    strategy = %strategy.kind(),
                    error = %e,
                    "strategy failed, skipping date"
                );
                return DateOutcome::new(date, DateState::StrategyError, Some(e.to_string()));
            }
        }
    };

    match broker.execute_portfolio(&target, row, date) {
        Ok(_) => DateOutcome::new(date, DateState::Executed, None),
        Err(e) => {
            warn!(%date, error = %e, "execution failed, skipping date");
            DateOutcome::new(date, DateState::ExecutionError, Some(e.to_string()))
        }
    }
}
