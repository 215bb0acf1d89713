//! Target allocation: asset -> fraction of total portfolio value.

use std::collections::BTreeMap;

use super::error::EngineError;

/// Tolerance for a fully invested portfolio's weights to sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Portfolio {
    weights: BTreeMap<String, f64>,
}

impl Portfolio {
    /// Weights with an explicit cash residual (`1 - sum`). Only finiteness is enforced.
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self, EngineError> {
        if let Some((asset, w)) = weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(EngineError::InvalidPortfolio {
                reason: format!("weight for {asset} is {w}"),
            });
        }
        Ok(Self { weights })
    }

    /// Weights that must sum to one within [`WEIGHT_SUM_TOLERANCE`].
    pub fn fully_invested(weights: BTreeMap<String, f64>) -> Result<Self, EngineError> {
        let portfolio = Self::new(weights)?;
        let total = portfolio.total_weight();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::InvalidPortfolio {
                reason: format!("weights sum to {total}, expected 1"),
            });
        }
        Ok(portfolio)
    }

    /// Hold everything in cash.
    pub fn cash_only() -> Self {
        Self::default()
    }

    pub fn weight(&self, asset: &str) -> f64 {
        self.weights.get(asset).copied().unwrap_or(0.0)
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn assets(&self) -> impl Iterator<Item = &String> {
        self.weights.keys()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn cash_weight(&self) -> f64 {
        1.0 - self.total_weight()
    }

    pub fn has_short(&self) -> bool {
        self.weights.values().any(|w| *w < 0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Drop an asset; its weight becomes cash.
    pub fn without(&self, asset: &str) -> Portfolio {
        let mut weights = self.weights.clone();
        weights.remove(asset);
        Portfolio { weights }
    }
}
