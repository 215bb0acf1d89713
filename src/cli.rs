//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig};
use crate::domain::broker::{FundingPolicy, LogMode};
use crate::domain::config_validation::{
    parse_date, validate_backtest_config, validate_risk_config, validate_strategy_config,
};
use crate::domain::error::AllocbtError;
use crate::domain::information::{
    DEFAULT_MIN_OBSERVATIONS, DEFAULT_WINDOW, EstimatorConfig, InformationEstimator,
    InformationSet,
};
use crate::domain::metrics::{Metrics, ReturnStats, TRADING_DAYS_PER_YEAR};
use crate::domain::price_series::{PriceSeries, preprocess_data};
use crate::domain::strategy::{
    DEFAULT_RISK_PARITY_MAX_ITERATIONS, DEFAULT_RISK_PARITY_TOLERANCE, Strategy, StrategyKind,
};
use crate::domain::universe::{get_stocks_data, parse_tickers};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportPort, RunReport};

pub const DEFAULT_INITIAL_CASH: f64 = 100_000.0;
pub const DEFAULT_TRANSACTION_COST: f64 = 0.001;
pub const DEFAULT_STOP_LOSS: f64 = 0.10;
pub const DEFAULT_TAKE_PROFIT: f64 = 0.10;
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Parser, Debug)]
#[command(name = "allocbt", about = "Portfolio allocation backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for the CSV report (overrides [report] output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated tickers (overrides [backtest] tickers)
        #[arg(long)]
        tickers: Option<String>,
        /// Allocation strategy (overrides [strategy] name)
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for ticker(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
    },
    /// List tickers available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            tickers,
            strategy,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, tickers.as_deref(), strategy.as_deref())
            } else {
                run_backtest(
                    &config,
                    output.as_ref(),
                    tickers.as_deref(),
                    strategy.as_deref(),
                )
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, ticker } => run_info(&config, ticker.as_deref()),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = AllocbtError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn report_error(e: AllocbtError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

fn validate_all(adapter: &dyn ConfigPort) -> Result<(), AllocbtError> {
    validate_backtest_config(adapter)?;
    validate_strategy_config(adapter)?;
    validate_risk_config(adapter)?;
    Ok(())
}

/// Settings the pipeline needs beyond the engine's own configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub backtest: BacktestConfig,
    pub estimator: EstimatorConfig,
    pub dropna: bool,
    pub confidence_level: f64,
    /// Annual rate, used for the Sharpe and Sortino ratios of the summary.
    pub risk_free_rate: f64,
}

pub fn build_pipeline_settings(adapter: &dyn ConfigPort) -> Result<PipelineSettings, AllocbtError> {
    Ok(PipelineSettings {
        backtest: build_backtest_config(adapter)?,
        estimator: build_estimator_config(adapter),
        dropna: adapter.get_bool("data", "dropna", true),
        confidence_level: adapter.get_double("risk", "confidence_level", DEFAULT_CONFIDENCE_LEVEL),
        risk_free_rate: adapter.get_double("strategy", "risk_free_rate", 0.0),
    })
}

fn run_backtest(
    config_path: &PathBuf,
    output_dir: Option<&PathBuf>,
    tickers_override: Option<&str>,
    strategy_override: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_all(&adapter) {
        return report_error(e);
    }

    let settings = match build_pipeline_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return report_error(e),
    };
    let strategy = match build_strategy(&adapter, strategy_override) {
        Ok(s) => s,
        Err(e) => return report_error(e),
    };
    let tickers = match resolve_tickers(tickers_override, &adapter) {
        Ok(t) => t,
        Err(e) => return report_error(e),
    };
    let data_port = match data_adapter(&adapter) {
        Ok(p) => p,
        Err(e) => return report_error(e),
    };

    let output = output_dir
        .cloned()
        .or_else(|| adapter.get_string("report", "output_dir").map(PathBuf::from));

    eprintln!("Strategy: {}", strategy.kind());
    run_backtest_pipeline(&data_port, &strategy, &settings, &tickers, output.as_deref())
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, AllocbtError> {
    let start_date = parse_date(
        adapter.get_string("backtest", "start_date").as_deref(),
        "start_date",
    )?;
    let end_date = parse_date(
        adapter.get_string("backtest", "end_date").as_deref(),
        "end_date",
    )?;

    let funding = match adapter.get_string("backtest", "funding") {
        Some(raw) => raw.parse::<FundingPolicy>().map_err(|reason| AllocbtError::ConfigInvalid {
            section: "backtest".into(),
            key: "funding".into(),
            reason,
        })?,
        None => FundingPolicy::default(),
    };
    let log_mode = match adapter.get_string("backtest", "log_mode") {
        Some(raw) => raw.parse::<LogMode>().map_err(|reason| AllocbtError::ConfigInvalid {
            section: "backtest".into(),
            key: "log_mode".into(),
            reason,
        })?,
        None => LogMode::default(),
    };

    Ok(BacktestConfig {
        start_date,
        end_date,
        initial_cash: adapter.get_double("backtest", "initial_cash", DEFAULT_INITIAL_CASH),
        transaction_cost: adapter.get_double(
            "backtest",
            "transaction_cost",
            DEFAULT_TRANSACTION_COST,
        ),
        stop_loss: adapter.get_double("risk", "stop_loss", DEFAULT_STOP_LOSS),
        take_profit: adapter.get_double("risk", "take_profit", DEFAULT_TAKE_PROFIT),
        allow_shorting: adapter.get_bool("backtest", "allow_shorting", false),
        allow_reentry: adapter.get_bool("backtest", "allow_reentry", false),
        funding,
        log_mode,
    })
}

/// Strategy from `[strategy]`, or from `name_override` when given.
///
/// `risk_free_rate` is configured as an annual rate and converted to the
/// daily rate the estimator's returns are measured in.
pub fn build_strategy(
    adapter: &dyn ConfigPort,
    name_override: Option<&str>,
) -> Result<Strategy, AllocbtError> {
    let kind = match name_override
        .map(str::to_string)
        .or_else(|| adapter.get_string("strategy", "name"))
        .filter(|s| !s.trim().is_empty())
    {
        Some(name) => name
            .parse::<StrategyKind>()
            .map_err(|reason| AllocbtError::ConfigInvalid {
                section: "strategy".into(),
                key: "name".into(),
                reason,
            })?,
        None => StrategyKind::EqualWeight,
    };

    let allow_shorting = adapter.get_bool("backtest", "allow_shorting", false);
    let long_only = adapter.get_bool("strategy", "long_only", !allow_shorting);
    Ok(match kind {
        StrategyKind::EqualWeight => Strategy::EqualWeight,
        StrategyKind::MinimumVariance => Strategy::MinimumVariance { long_only },
        StrategyKind::MaximumSharpe => Strategy::MaximumSharpe {
            risk_free_rate: adapter.get_double("strategy", "risk_free_rate", 0.0)
                / TRADING_DAYS_PER_YEAR,
            long_only,
        },
        StrategyKind::RiskParity => Strategy::RiskParity {
            tolerance: adapter.get_double("strategy", "tolerance", DEFAULT_RISK_PARITY_TOLERANCE),
            max_iterations: adapter
                .get_int(
                    "strategy",
                    "max_iterations",
                    DEFAULT_RISK_PARITY_MAX_ITERATIONS as i64,
                )
                .max(1) as usize,
        },
    })
}

pub fn build_estimator_config(adapter: &dyn ConfigPort) -> EstimatorConfig {
    EstimatorConfig {
        window: adapter.get_int("estimator", "window", DEFAULT_WINDOW as i64).max(2) as usize,
        min_observations: adapter
            .get_int("estimator", "min_observations", DEFAULT_MIN_OBSERVATIONS as i64)
            .max(2) as usize,
    }
}

pub fn resolve_tickers(
    tickers_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, AllocbtError> {
    let list = match tickers_override {
        Some(t) => t.to_string(),
        None => config
            .get_string("backtest", "tickers")
            .ok_or_else(|| AllocbtError::ConfigMissing {
                section: "backtest".into(),
                key: "tickers".into(),
            })?,
    };
    parse_tickers(&list).map_err(|e| AllocbtError::ConfigInvalid {
        section: "backtest".into(),
        key: "tickers".into(),
        reason: e.to_string(),
    })
}

pub fn data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, AllocbtError> {
    config
        .get_string("data", "path")
        .filter(|p| !p.trim().is_empty())
        .map(|p| CsvAdapter::new(PathBuf::from(p.trim())))
        .ok_or_else(|| AllocbtError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    strategy: &Strategy,
    settings: &PipelineSettings,
    tickers: &[String],
    output_dir: Option<&Path>,
) -> ExitCode {
    let bt_config = &settings.backtest;

    // Fetch and align prices
    let raw = match get_stocks_data(data_port, tickers, bt_config.start_date, bt_config.end_date) {
        Ok(series) => series,
        Err(e) => return report_error(e),
    };
    let mut prices = preprocess_data(&raw);
    if settings.dropna {
        prices = prices.drop_incomplete();
    }
    if prices.len() < 2 {
        return report_error(AllocbtError::RunFailed {
            reason: format!("{} aligned dates, need at least 2", prices.len()),
        });
    }
    if prices.assets().len() < tickers.len() {
        eprintln!(
            "Backtesting {} of {} tickers",
            prices.assets().len(),
            tickers.len()
        );
    }

    eprintln!(
        "Running backtest: {} tickers, {} to {}",
        prices.assets().len(),
        bt_config.start_date,
        bt_config.end_date,
    );
    eprintln!("  Processing: {} dates", prices.len() - 1);

    let estimator = InformationEstimator::new(&prices, settings.estimator.clone());
    let result = backtest_engine::run_backtest(&prices, strategy, &estimator, bt_config);

    let metrics = Metrics::compute(
        &result.values,
        &result.transactions,
        bt_config.initial_cash,
        settings.risk_free_rate,
    );

    eprintln!("\n=== Results ===");
    eprintln!("Final Value:      {:.2}", metrics.final_value);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!(
        "Annualized:       {:.2}%",
        metrics.annualized_return * 100.0
    );
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", metrics.trades);
    eprintln!(
        "Risk Exits:       {} stop-loss, {} take-profit",
        metrics.stop_loss_exits, metrics.take_profit_exits
    );
    eprintln!("Costs Paid:       {:.2}", metrics.total_costs);
    eprintln!(
        "Dates:            {} executed, {} skipped",
        result.executed_dates(),
        result.skipped_dates()
    );

    if let Some(stats) = ReturnStats::describe(&result.returns()) {
        eprintln!("\n=== Daily Returns ===");
        eprintln!("count {}  mean {:.6}  std {:.6}", stats.count, stats.mean, stats.std);
        eprintln!(
            "min {:.6}  25% {:.6}  50% {:.6}  75% {:.6}  max {:.6}",
            stats.min, stats.q25, stats.median, stats.q75, stats.max
        );
    }

    let correlation = full_sample_estimate(&prices, &settings.estimator);
    if let Some(info) = &correlation {
        print_correlation(info);
    }

    let (risk, failure) = match result.risk_report(settings.confidence_level) {
        Ok(r) => (Some(r), None),
        Err(e) => (None, Some(e)),
    };
    if let Some(risk) = &risk {
        eprintln!(
            "\n=== Risk ({:.0}% confidence) ===",
            risk.confidence_level * 100.0
        );
        eprintln!("Value at Risk:      {:.2}", risk.var);
        eprintln!("Expected Shortfall: {:.2}", risk.expected_shortfall);
    }

    if let Some(dir) = output_dir {
        let report = RunReport {
            strategy,
            config: bt_config,
            result: &result,
            metrics: &metrics,
            risk: risk.as_ref(),
            information: correlation.as_ref(),
        };
        match CsvReportAdapter::new(dir.to_path_buf()).write(&report) {
            Ok(files) => {
                eprintln!("\nReport written to: {}", dir.display());
                for file in files {
                    eprintln!("  {}", file.display());
                }
            }
            Err(e) => return report_error(e),
        }
    }

    match failure {
        Some(e) => report_error(e),
        None => ExitCode::SUCCESS,
    }
}

/// Mean and covariance over every complete row of the processed prices.
fn full_sample_estimate(prices: &PriceSeries, config: &EstimatorConfig) -> Option<InformationSet> {
    let complete = prices.drop_incomplete();
    match InformationEstimator::new(&complete, config.clone()).full_sample() {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(error = %e, "no full-sample estimate, correlation omitted");
            None
        }
    }
}

fn print_correlation(info: &InformationSet) {
    let corr = info.correlation_matrix();
    eprintln!("\n=== Correlation ({} returns) ===", info.observations);
    eprintln!(
        "{:>10}{}",
        "",
        info.assets
            .iter()
            .map(|a| format!("{a:>10}"))
            .collect::<String>()
    );
    for (i, asset) in info.assets.iter().enumerate() {
        eprintln!(
            "{asset:>10}{}",
            corr.row(i)
                .iter()
                .map(|c| format!("{c:>10.3}"))
                .collect::<String>()
        );
    }
}

pub fn run_dry_run(
    config_path: &PathBuf,
    tickers_override: Option<&str>,
    strategy_override: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_all(&adapter) {
        return report_error(e);
    }
    eprintln!("Config validated successfully");

    let settings = match build_pipeline_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return report_error(e),
    };
    let strategy = match build_strategy(&adapter, strategy_override) {
        Ok(s) => s,
        Err(e) => return report_error(e),
    };
    let tickers = match resolve_tickers(tickers_override, &adapter) {
        Ok(t) => t,
        Err(e) => return report_error(e),
    };

    let bt = &settings.backtest;
    eprintln!("\nStrategy:");
    eprintln!("  {}", strategy.kind());
    eprintln!("\nUniverse:");
    eprintln!("  tickers: {}", tickers.join(", "));
    eprintln!("  period:  {} to {}", bt.start_date, bt.end_date);
    eprintln!("\nBroker:");
    eprintln!("  initial cash:     {:.2}", bt.initial_cash);
    eprintln!("  transaction cost: {:.3}%", bt.transaction_cost * 100.0);
    eprintln!(
        "  stop-loss / take-profit: {:.1}% / {:.1}%",
        bt.stop_loss * 100.0,
        bt.take_profit * 100.0
    );
    eprintln!(
        "  shorting: {}, re-entry: {}, funding: {:?}",
        bt.allow_shorting, bt.allow_reentry, bt.funding
    );
    eprintln!("\nEstimator:");
    eprintln!(
        "  window {} (min {} observations)",
        settings.estimator.window, settings.estimator.min_observations
    );

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_all(&adapter) {
        return report_error(e);
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(config_path: &PathBuf, ticker: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match data_adapter(&config) {
        Ok(p) => p,
        Err(e) => return report_error(e),
    };

    let tickers = match ticker {
        Some(t) => vec![t.trim().to_uppercase()],
        None => match resolve_tickers(None, &config) {
            Ok(t) => t,
            Err(e) => return report_error(e),
        },
    };

    for t in &tickers {
        match data_port.get_data_range(t) {
            Ok(Some((first, last, count))) => {
                println!("{}: {} prices, {} to {}", t, count, first, last);
            }
            Ok(None) => {
                eprintln!("{}: no data found", t);
            }
            Err(e) => {
                eprintln!("error reading {}: {}", t, e);
            }
        }
    }
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match data_adapter(&config) {
        Ok(p) => p,
        Err(e) => return report_error(e),
    };

    let symbols = match data_port.list_symbols() {
        Ok(s) => s,
        Err(e) => return report_error(e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const CONFIG: &str = r#"
[data]
path = ./prices

[backtest]
tickers = aapl, msft
initial_cash = 50000
start_date = 2021-01-04
end_date = 2021-12-31
transaction_cost = 0.002
allow_shorting = false
funding = reject
log_mode = cumulative

[strategy]
name = Maximum Sharpe Ratio
risk_free_rate = 0.0252
long_only = true

[risk]
stop_loss = 0.05
take_profit = 0.25
confidence_level = 0.99

[estimator]
window = 30
min_observations = 10
"#;

    #[test]
    fn build_backtest_config_reads_all_sections() {
        let bt = build_backtest_config(&make_config(CONFIG)).unwrap();
        assert_eq!(bt.start_date.to_string(), "2021-01-04");
        assert_eq!(bt.end_date.to_string(), "2021-12-31");
        assert_eq!(bt.initial_cash, 50_000.0);
        assert_eq!(bt.transaction_cost, 0.002);
        assert_eq!(bt.stop_loss, 0.05);
        assert_eq!(bt.take_profit, 0.25);
        assert!(!bt.allow_shorting);
        assert!(!bt.allow_reentry);
        assert_eq!(bt.funding, FundingPolicy::Reject);
        assert_eq!(bt.log_mode, LogMode::Cumulative);
    }

    #[test]
    fn build_backtest_config_defaults() {
        let bt = build_backtest_config(&make_config(
            "[backtest]\nstart_date = 2021-01-04\nend_date = 2021-12-31\n",
        ))
        .unwrap();
        assert_eq!(bt.initial_cash, DEFAULT_INITIAL_CASH);
        assert_eq!(bt.transaction_cost, DEFAULT_TRANSACTION_COST);
        assert_eq!(bt.stop_loss, DEFAULT_STOP_LOSS);
        assert_eq!(bt.take_profit, DEFAULT_TAKE_PROFIT);
        assert!(!bt.allow_shorting);
        assert_eq!(bt.funding, FundingPolicy::PartialFill);
        assert_eq!(bt.log_mode, LogMode::Incremental);
    }

    #[test]
    fn long_only_follows_shorting_by_default() {
        let strategy = build_strategy(
            &make_config("[strategy]\nname = minimum_variance\n"),
            None,
        )
        .unwrap();
        assert_eq!(strategy, Strategy::MinimumVariance { long_only: true });

        let strategy = build_strategy(
            &make_config(
                "[backtest]\nallow_shorting = true\n[strategy]\nname = minimum_variance\n",
            ),
            None,
        )
        .unwrap();
        assert_eq!(strategy, Strategy::MinimumVariance { long_only: false });
    }

    #[test]
    fn build_backtest_config_requires_dates() {
        let err = build_backtest_config(&make_config("[backtest]\nstart_date = 2021-01-04\n"))
            .unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn build_strategy_converts_annual_risk_free_rate() {
        let strategy = build_strategy(&make_config(CONFIG), None).unwrap();
        match strategy {
            Strategy::MaximumSharpe {
                risk_free_rate,
                long_only,
            } => {
                assert!((risk_free_rate - 0.0001).abs() < 1e-15);
                assert!(long_only);
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn build_strategy_override_wins() {
        let strategy = build_strategy(&make_config(CONFIG), Some("risk-parity")).unwrap();
        assert_eq!(
            strategy,
            Strategy::RiskParity {
                tolerance: DEFAULT_RISK_PARITY_TOLERANCE,
                max_iterations: DEFAULT_RISK_PARITY_MAX_ITERATIONS,
            }
        );
    }

    #[test]
    fn build_strategy_defaults_to_equal_weight() {
        let strategy = build_strategy(&make_config("[strategy]\n"), None).unwrap();
        assert_eq!(strategy, Strategy::EqualWeight);
    }

    #[test]
    fn build_strategy_rejects_unknown_name() {
        let err = build_strategy(&make_config(CONFIG), Some("momentum")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigInvalid { key, .. } if key == "name"));
    }

    #[test]
    fn build_estimator_config_reads_window() {
        let est = build_estimator_config(&make_config(CONFIG));
        assert_eq!(est.window, 30);
        assert_eq!(est.min_observations, 10);
        assert_eq!(
            build_estimator_config(&make_config("[estimator]\n")),
            EstimatorConfig::default()
        );
    }

    #[test]
    fn pipeline_settings_read_risk_and_data_options() {
        let settings = build_pipeline_settings(&make_config(CONFIG)).unwrap();
        assert_eq!(settings.confidence_level, 0.99);
        assert_eq!(settings.risk_free_rate, 0.0252);
        assert!(settings.dropna);
    }

    #[test]
    fn resolve_tickers_from_config_and_override() {
        let config = make_config(CONFIG);
        assert_eq!(resolve_tickers(None, &config).unwrap(), vec!["AAPL", "MSFT"]);
        assert_eq!(
            resolve_tickers(Some("goog"), &config).unwrap(),
            vec!["GOOG"]
        );
        let err = resolve_tickers(None, &make_config("[backtest]\n")).unwrap_err();
        assert!(matches!(err, AllocbtError::ConfigMissing { key, .. } if key == "tickers"));
    }

    #[test]
    fn data_adapter_requires_path() {
        assert!(data_adapter(&make_config(CONFIG)).is_ok());
        let err = data_adapter(&make_config("[data]\n")).err().unwrap();
        assert!(matches!(err, AllocbtError::ConfigMissing { key, .. } if key == "path"));
    }

    #[test]
    fn full_config_validates() {
        assert!(validate_all(&make_config(CONFIG)).is_ok());
    }

    #[test]
    fn cli_parses_backtest_overrides() {
        let cli = Cli::try_parse_from([
            "allocbt",
            "backtest",
            "-c",
            "run.ini",
            "--tickers",
            "AAPL,MSFT",
            "--strategy",
            "minimum_variance",
            "-o",
            "out",
        ])
        .unwrap();
        match cli.command {
            Command::Backtest {
                config,
                output,
                tickers,
                strategy,
                dry_run,
            } => {
                assert_eq!(config, PathBuf::from("run.ini"));
                assert_eq!(output, Some(PathBuf::from("out")));
                assert_eq!(tickers.as_deref(), Some("AAPL,MSFT"));
                assert_eq!(strategy.as_deref(), Some("minimum_variance"));
                assert!(!dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_requires_config_for_list_symbols() {
        assert!(Cli::try_parse_from(["allocbt", "list-symbols"]).is_err());
    }
}
