//! Core domain types and logic.

pub mod backtest;
pub mod broker;
pub mod config_validation;
pub mod error;
pub mod information;
pub mod linalg;
pub mod metrics;
pub mod portfolio;
pub mod position;
pub mod price_series;
pub mod risk_metrics;
pub mod strategy;
pub mod universe;
