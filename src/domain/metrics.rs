//! Performance summary and return statistics for a finished run.

use super::backtest::ValuePoint;
use super::broker::{Side, TransactionRecord};
use super::position::ExitTrigger;
use super::risk_metrics::quantile;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub trades: usize,
    pub stop_loss_exits: usize,
    pub take_profit_exits: usize,
    pub total_costs: f64,
    pub final_value: f64,
}

impl Metrics {
    /// `risk_free_rate` is annual.
    pub fn compute(
        values: &[ValuePoint],
        transactions: &[TransactionRecord],
        initial_cash: f64,
        risk_free_rate: f64,
    ) -> Self {
        let final_value = values.last().map(|p| p.value).unwrap_or(initial_cash);

        let total_return = if initial_cash > 0.0 {
            (final_value - initial_cash) / initial_cash
        } else {
            0.0
        };

        let years = values.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(values);

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(values, daily_rf);

        let count_exits = |trigger: ExitTrigger| {
            transactions
                .iter()
                .filter(|t| t.side == Side::Exit(trigger))
                .count()
        };

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            trades: transactions.len(),
            stop_loss_exits: count_exits(ExitTrigger::StopLoss),
            take_profit_exits: count_exits(ExitTrigger::TakeProfit),
            total_costs: transactions.iter().map(|t| t.cost).sum(),
            final_value,
        }
    }
}

/// Simple returns between consecutive value points.
pub fn value_returns(values: &[ValuePoint]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| {
            let prev = w[0].value;
            if prev > 0.0 {
                (w[1].value - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

/// Descriptive statistics of a return sample: count, mean, sample standard
/// deviation, extremes and quartiles (linear interpolation).
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

impl ReturnStats {
    /// `None` for an empty sample.
    pub fn describe(returns: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = returns.iter().copied().filter(|r| r.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let std = if sorted.len() > 1 {
            (sorted.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            f64::NAN
        };

        Some(ReturnStats {
            count: sorted.len(),
            mean,
            std,
            min: sorted[0],
            q25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

fn compute_drawdown(values: &[ValuePoint]) -> (f64, i64) {
    let Some(first) = values.first() else {
        return (0.0, 0);
    };

    let mut peak = first.value;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in values {
        if point.value >= peak {
            peak = point.value;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(values: &[ValuePoint], daily_rf: f64) -> (f64, f64) {
    let returns = value_returns(values);
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
