//! Allocation algorithms.
//!
//! The strategy is chosen once per run as a [`Strategy`] variant. Only the
//! optimizing variants consume an [`InformationSet`]; `EqualWeight` works from
//! current prices alone, which [`Strategy::requires_information`] exposes so
//! the simulation loop can skip estimation entirely.

use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::EngineError;
use super::information::InformationSet;
use super::linalg::solve;
use super::portfolio::Portfolio;
use super::price_series::PriceRow;

pub const DEFAULT_RISK_PARITY_TOLERANCE: f64 = 1e-8;
pub const DEFAULT_RISK_PARITY_MAX_ITERATIONS: usize = 1_000;

/// Unnormalized solutions summing to less than this are treated as zero.
const ZERO_SUM_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    EqualWeight,
    MinimumVariance,
    MaximumSharpe,
    RiskParity,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::EqualWeight,
        StrategyKind::MinimumVariance,
        StrategyKind::MaximumSharpe,
        StrategyKind::RiskParity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::EqualWeight => "equal_weight",
            StrategyKind::MinimumVariance => "minimum_variance",
            StrategyKind::MaximumSharpe => "maximum_sharpe",
            StrategyKind::RiskParity => "risk_parity",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    /// Accepts snake_case names and the display spellings ("Equal Weight",
    /// "Maximum Sharpe Ratio", "Risk-Parity", ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "equalweight" | "ew" => Ok(StrategyKind::EqualWeight),
            "minimumvariance" | "minvariance" | "minvar" => Ok(StrategyKind::MinimumVariance),
            "maximumsharpe" | "maximumsharperatio" | "maxsharpe" => {
                Ok(StrategyKind::MaximumSharpe)
            }
            "riskparity" => Ok(StrategyKind::RiskParity),
            _ => Err(format!(
                "unknown strategy '{}', expected one of: {}",
                s.trim(),
                StrategyKind::ALL.map(|k| k.as_str()).join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    EqualWeight,
    MinimumVariance {
        long_only: bool,
    },
    /// `risk_free_rate` is per observation period, matching the estimator's returns.
    MaximumSharpe {
        risk_free_rate: f64,
        long_only: bool,
    },
    RiskParity {
        tolerance: f64,
        max_iterations: usize,
    },
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::EqualWeight => StrategyKind::EqualWeight,
            Strategy::MinimumVariance { .. } => StrategyKind::MinimumVariance,
            Strategy::MaximumSharpe { .. } => StrategyKind::MaximumSharpe,
            Strategy::RiskParity { .. } => StrategyKind::RiskParity,
        }
    }

    pub fn requires_information(&self) -> bool {
        !matches!(self, Strategy::EqualWeight)
    }

    pub fn allocate(
        &self,
        prices: &PriceRow,
        info: Option<&InformationSet>,
    ) -> Result<Portfolio, EngineError> {
        match self {
            Strategy::EqualWeight => equal_weight(prices),
            other => {
                let info = info.ok_or_else(|| EngineError::DataInsufficiency {
                    reason: format!("{} requires an information set", other.kind()),
                })?;
                match *other {
                    Strategy::MinimumVariance { long_only } => minimum_variance(info, long_only),
                    Strategy::MaximumSharpe {
                        risk_free_rate,
                        long_only,
                    } => maximum_sharpe(info, risk_free_rate, long_only),
                    Strategy::RiskParity {
                        tolerance,
                        max_iterations,
                    } => risk_parity(info, tolerance, max_iterations),
                    Strategy::EqualWeight => equal_weight(prices),
                }
            }
        }
    }
}

/// 1/N across every asset with a usable current price.
pub fn equal_weight(prices: &PriceRow) -> Result<Portfolio, EngineError> {
    let assets = prices.valid_assets();
    if assets.is_empty() {
        return Err(EngineError::InvalidPortfolio {
            reason: "no asset has a valid price".into(),
        });
    }
    let w = 1.0 / assets.len() as f64;
    Portfolio::fully_invested(assets.into_iter().map(|a| (a, w)).collect())
}

/// Global minimum-variance weights `Σ⁻¹1 / 1ᵀΣ⁻¹1`.
pub fn minimum_variance(info: &InformationSet, long_only: bool) -> Result<Portfolio, EngineError> {
    let ones = Array1::<f64>::ones(info.dimension());
    let raw = solve(&info.covariance_matrix, &ones)?;
    normalized(info, raw, long_only)
}

/// Tangency portfolio `Σ⁻¹(μ − r_f·1)`, renormalized to sum to one.
pub fn maximum_sharpe(
    info: &InformationSet,
    risk_free_rate: f64,
    long_only: bool,
) -> Result<Portfolio, EngineError> {
    let excess = info.expected_return.mapv(|mu| mu - risk_free_rate);
    let raw = solve(&info.covariance_matrix, &excess)?;
    normalized(info, raw, long_only)
}

/// Equal risk contribution weights by cyclical coordinate descent.
///
/// Each pass solves `x_i (Σx)_i = 1/N` for one coordinate at a time; the
/// positive root keeps every weight strictly positive. Convergence is measured
/// on the normalized weights as the largest relative deviation of a risk
/// contribution from the equal share.
pub fn risk_parity(
    info: &InformationSet,
    tolerance: f64,
    max_iterations: usize,
) -> Result<Portfolio, EngineError> {
    let n = info.dimension();
    let cov = &info.covariance_matrix;
    if n == 0 {
        return Err(EngineError::Optimization {
            reason: "empty covariance matrix".into(),
        });
    }
    if let Some(i) = (0..n).find(|&i| !(cov[[i, i]] > 0.0) || !cov[[i, i]].is_finite()) {
        return Err(EngineError::Optimization {
            reason: format!("{} has non-positive variance", info.assets[i]),
        });
    }

    let budget = 1.0 / n as f64;
    let mut x: Array1<f64> = (0..n).map(|i| 1.0 / cov[[i, i]].sqrt()).collect();
    let mut residual = f64::INFINITY;

    for _ in 0..max_iterations {
        for i in 0..n {
            let a = cov[[i, i]];
            let c: f64 = (0..n).filter(|&j| j != i).map(|j| cov[[i, j]] * x[j]).sum();
            x[i] = (-c + (c * c + 4.0 * a * budget).sqrt()) / (2.0 * a);
        }

        let w = &x / x.sum();
        residual = contribution_residual(cov, &w)?;
        if residual <= tolerance {
            return weights_to_portfolio(info, w);
        }
    }

    Err(EngineError::Convergence {
        iterations: max_iterations,
        residual,
    })
}

/// Risk contribution shares `w_i (Σw)_i / wᵀΣw`.
pub fn risk_contributions(cov: &Array2<f64>, w: &Array1<f64>) -> Array1<f64> {
    let marginal = cov.dot(w);
    let variance = w.dot(&marginal);
    (w * &marginal) / variance
}

fn contribution_residual(cov: &Array2<f64>, w: &Array1<f64>) -> Result<f64, EngineError> {
    let variance = w.dot(&cov.dot(w));
    if !(variance > 0.0) {
        return Err(EngineError::Optimization {
            reason: "portfolio variance is not positive".into(),
        });
    }
    let n = w.len() as f64;
    Ok(risk_contributions(cov, w)
        .iter()
        .map(|rc| (rc * n - 1.0).abs())
        .fold(0.0, f64::max))
}

fn normalized(
    info: &InformationSet,
    mut raw: Array1<f64>,
    long_only: bool,
) -> Result<Portfolio, EngineError> {
    if long_only {
        raw.mapv_inplace(|w| w.max(0.0));
    }
    let total = raw.sum();
    if !total.is_finite() || total.abs() < ZERO_SUM_FLOOR {
        return Err(EngineError::Optimization {
            reason: format!("unnormalized weights sum to {total:.3e}"),
        });
    }
    weights_to_portfolio(info, raw / total)
}

fn weights_to_portfolio(info: &InformationSet, w: Array1<f64>) -> Result<Portfolio, EngineError> {
    let weights: BTreeMap<String, f64> =
        info.assets.iter().cloned().zip(w.iter().copied()).collect();
    Portfolio::fully_invested(weights)
}
