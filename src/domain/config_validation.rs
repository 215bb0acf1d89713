//! Configuration validation.
//!
//! Every range check on user input happens here, before a backtest is
//! assembled; the engine trusts its configuration.

use crate::domain::broker::{FundingPolicy, LogMode};
use crate::domain::error::AllocbtError;
use crate::domain::strategy::StrategyKind;
use crate::domain::universe::parse_tickers;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const MIN_INITIAL_CASH: f64 = 1_000.0;
pub const MAX_TRANSACTION_COST: f64 = 0.05;
pub const MIN_CONFIDENCE_LEVEL: f64 = 0.90;
pub const MAX_CONFIDENCE_LEVEL: f64 = 0.99;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    validate_data_path(config)?;
    validate_initial_cash(config)?;
    validate_transaction_cost(config)?;
    validate_dates(config)?;
    validate_tickers(config)?;
    validate_policies(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    validate_strategy_name(config)?;
    validate_risk_free_rate(config)?;
    validate_risk_parity_settings(config)?;
    Ok(())
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    validate_fraction(config, "risk", "stop_loss")?;
    validate_fraction(config, "risk", "take_profit")?;
    validate_confidence_level(config)?;
    validate_estimator(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> AllocbtError {
    AllocbtError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// A present key must hold a number; an absent key yields `None`.
fn number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, AllocbtError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

fn validate_data_path(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    match config.get_string("data", "path") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(AllocbtError::ConfigMissing {
            section: "data".to_string(),
            key: "path".to_string(),
        }),
    }
}

fn validate_initial_cash(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    if let Some(value) = number(config, "backtest", "initial_cash")? {
        if value < MIN_INITIAL_CASH {
            return Err(invalid(
                "backtest",
                "initial_cash",
                format!("initial_cash must be at least {MIN_INITIAL_CASH}"),
            ));
        }
    }
    Ok(())
}

fn validate_transaction_cost(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    if let Some(value) = number(config, "backtest", "transaction_cost")? {
        if !(0.0..=MAX_TRANSACTION_COST).contains(&value) {
            return Err(invalid(
                "backtest",
                "transaction_cost",
                format!("transaction_cost must be between 0 and {MAX_TRANSACTION_COST}"),
            ));
        }
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, AllocbtError> {
    match value {
        None => Err(AllocbtError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                format!("invalid {field} format, expected YYYY-MM-DD"),
            )
        }),
    }
}

/// Tickers may come from the command line instead, so only a present list is checked.
fn validate_tickers(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    match config.get_string("backtest", "tickers") {
        None => Ok(()),
        Some(list) => parse_tickers(&list)
            .map(|_| ())
            .map_err(|e| invalid("backtest", "tickers", e.to_string())),
    }
}

fn validate_policies(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    if let Some(raw) = config.get_string("backtest", "funding") {
        raw.parse::<FundingPolicy>()
            .map_err(|e| invalid("backtest", "funding", e))?;
    }
    if let Some(raw) = config.get_string("backtest", "log_mode") {
        raw.parse::<LogMode>()
            .map_err(|e| invalid("backtest", "log_mode", e))?;
    }
    Ok(())
}

/// A missing name selects equal weighting.
fn validate_strategy_name(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    match config.get_string("strategy", "name") {
        Some(name) if !name.trim().is_empty() => name
            .parse::<StrategyKind>()
            .map(|_| ())
            .map_err(|e| invalid("strategy", "name", e)),
        _ => Ok(()),
    }
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    if let Some(value) = number(config, "strategy", "risk_free_rate")? {
        if !(0.0..1.0).contains(&value) {
            return Err(invalid(
                "strategy",
                "risk_free_rate",
                "risk_free_rate must be in [0, 1)",
            ));
        }
    }
    Ok(())
}

fn validate_risk_parity_settings(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    if let Some(value) = number(config, "strategy", "tolerance")? {
        if value <= 0.0 {
            return Err(invalid("strategy", "tolerance", "tolerance must be positive"));
        }
    }
    if let Some(value) = number(config, "strategy", "max_iterations")? {
        if value < 1.0 || value.fract() != 0.0 {
            return Err(invalid(
                "strategy",
                "max_iterations",
                "max_iterations must be a positive integer",
            ));
        }
    }
    Ok(())
}

fn validate_fraction(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), AllocbtError> {
    if let Some(value) = number(config, section, key)? {
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(section, key, format!("{key} must be between 0 and 1")));
        }
    }
    Ok(())
}

fn validate_confidence_level(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    if let Some(value) = number(config, "risk", "confidence_level")? {
        if !(MIN_CONFIDENCE_LEVEL..=MAX_CONFIDENCE_LEVEL).contains(&value) {
            return Err(invalid(
                "risk",
                "confidence_level",
                format!(
                    "confidence_level must be between {MIN_CONFIDENCE_LEVEL} and {MAX_CONFIDENCE_LEVEL}"
                ),
            ));
        }
    }
    Ok(())
}

fn validate_estimator(config: &dyn ConfigPort) -> Result<(), AllocbtError> {
    let window = number(config, "estimator", "window")?;
    let min_obs = number(config, "estimator", "min_observations")?;

    if let Some(w) = window {
        if w < 2.0 || w.fract() != 0.0 {
            return Err(invalid("estimator", "window", "window must be an integer of at least 2"));
        }
    }
    if let Some(m) = min_obs {
        if m < 2.0 || m.fract() != 0.0 {
            return Err(invalid(
                "estimator",
                "min_observations",
                "min_observations must be an integer of at least 2",
            ));
        }
        let w = window.unwrap_or(crate::domain::information::DEFAULT_WINDOW as f64);
        if m > w {
            return Err(invalid(
                "estimator",
                "min_observations",
                "min_observations cannot exceed window",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const BASE: &str = "[data]\npath = data\n[backtest]\ntickers = AAPL,MSFT\nstart_date = 2020-01-01\nend_date = 2024-12-31\n";

    fn backtest_with(extra: &str) -> FileConfigAdapter {
        make_config(&format!("{BASE}{extra}"))
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[data]
path = ./prices

[backtest]
tickers = AAPL, MSFT, GOOG
initial_cash = 100000
start_date = 2020-01-01
end_date = 2024-12-31
transaction_cost = 0.001
allow_shorting = false
funding = reject
log_mode = cumulative
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_backtest_config(&backtest_with("")).is_ok());
    }

    #[test]
    fn missing_data_path_fails() {
        let config = make_config("[backtest]\ntickers = A\nstart_date = 2020-01-01\nend_date = 2021-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigMissing { key, .. } if key == "path"));
    }

    #[test]
    fn initial_cash_below_minimum_fails() {
        let err = validate_backtest_config(&backtest_with("initial_cash = 999\n")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "initial_cash"));
    }

    #[test]
    fn initial_cash_not_a_number_fails() {
        let err = validate_backtest_config(&backtest_with("initial_cash = lots\n")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "initial_cash"));
    }

    #[test]
    fn transaction_cost_above_cap_fails() {
        let err = validate_backtest_config(&backtest_with("transaction_cost = 0.06\n")).unwrap_err();
        assert!(
            matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "transaction_cost")
        );
    }

    #[test]
    fn transaction_cost_negative_fails() {
        let err =
            validate_backtest_config(&backtest_with("transaction_cost = -0.001\n")).unwrap_err();
        assert!(
            matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "transaction_cost")
        );
    }

    #[test]
    fn invalid_start_date_format_fails() {
        let config = make_config("[data]\npath = d\n[backtest]\ntickers = A\nstart_date = 2020/01/01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn missing_end_date_fails() {
        let config = make_config("[data]\npath = d\n[backtest]\ntickers = A\nstart_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[data]\npath = d\n[backtest]\ntickers = A\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn missing_tickers_left_to_command_line() {
        let config = make_config("[data]\npath = d\n[backtest]\nstart_date = 2020-01-01\nend_date = 2024-12-31\n");
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn blank_ticker_list_fails() {
        let config = make_config("[data]\npath = d\n[backtest]\ntickers = , ,\nstart_date = 2020-01-01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "tickers"));
    }

    #[test]
    fn unknown_funding_policy_fails() {
        let err = validate_backtest_config(&backtest_with("funding = borrow\n")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "funding"));
    }

    #[test]
    fn unknown_log_mode_fails() {
        let err = validate_backtest_config(&backtest_with("log_mode = sometimes\n")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "log_mode"));
    }

    #[test]
    fn valid_strategy_config_passes() {
        let config = make_config(
            r#"
[strategy]
name = Maximum Sharpe Ratio
risk_free_rate = 0.02
long_only = true
"#,
        );
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn missing_strategy_name_is_allowed() {
        assert!(validate_strategy_config(&make_config("[strategy]\n")).is_ok());
    }

    #[test]
    fn unknown_strategy_name_fails() {
        let err =
            validate_strategy_config(&make_config("[strategy]\nname = momentum\n")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "name"));
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        let config = make_config("[strategy]\nname = equal_weight\nrisk_free_rate = 1.0\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "risk_free_rate"));
    }

    #[test]
    fn risk_parity_tolerance_must_be_positive() {
        let config = make_config("[strategy]\nname = risk_parity\ntolerance = 0\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "tolerance"));
    }

    #[test]
    fn risk_parity_iterations_must_be_integral() {
        let config = make_config("[strategy]\nname = risk_parity\nmax_iterations = 2.5\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "max_iterations"));
    }

    #[test]
    fn valid_risk_config_passes() {
        let config = make_config(
            "[risk]\nstop_loss = 0.1\ntake_profit = 0.2\nconfidence_level = 0.95\n[estimator]\nwindow = 60\nmin_observations = 20\n",
        );
        assert!(validate_risk_config(&config).is_ok());
    }

    #[test]
    fn stop_loss_above_one_fails() {
        let err = validate_risk_config(&make_config("[risk]\nstop_loss = 1.5\n")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "stop_loss"));
    }

    #[test]
    fn take_profit_negative_fails() {
        let err = validate_risk_config(&make_config("[risk]\ntake_profit = -0.1\n")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "take_profit"));
    }

    #[test]
    fn confidence_level_outside_band_fails() {
        for value in ["0.85", "0.995"] {
            let config = make_config(&format!("[risk]\nconfidence_level = {value}\n"));
            let err = validate_risk_config(&config).unwrap_err();
            assert!(
                matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "confidence_level")
            );
        }
    }

    #[test]
    fn min_observations_cannot_exceed_window() {
        let config = make_config("[estimator]\nwindow = 10\nmin_observations = 11\n");
        let err = validate_risk_config(&config).unwrap_err();
        assert!(
            matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "min_observations")
        );
    }

    #[test]
    fn min_observations_checked_against_default_window() {
        let config = make_config("[estimator]\nmin_observations = 61\n");
        assert!(validate_risk_config(&config).is_err());
    }

    #[test]
    fn window_below_two_fails() {
        let err = validate_risk_config(&make_config("[estimator]\nwindow = 1\n")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "window"));
    }
}
