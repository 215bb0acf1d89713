//! Domain error types.
//!
//! [`EngineError`] is the failure taxonomy of the simulation core. Per-date
//! engine failures are recorded by the simulation loop and never abort a run;
//! [`AllocbtError`] covers everything at the boundary (config, data, I/O) plus
//! the one terminal run failure.

/// Failures raised by the estimator, strategies, broker and risk metrics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("insufficient data for estimation: {reason}")]
    DataInsufficiency { reason: String },

    #[error("optimization failed: {reason}")]
    Optimization { reason: String },

    #[error("risk parity did not converge after {iterations} iterations (residual {residual:.3e})")]
    Convergence { iterations: usize, residual: f64 },

    #[error("insufficient funds for {asset}: need {required:.2}, have {available:.2}")]
    InsufficientFunds {
        asset: String,
        required: f64,
        available: f64,
    },

    #[error("invalid portfolio: {reason}")]
    InvalidPortfolio { reason: String },

    #[error("insufficient data: have {have} observations, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
}

/// Top-level error type for allocbt.
#[derive(Debug, thiserror::Error)]
pub enum AllocbtError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("price data error: {reason}")]
    PriceData { reason: String },

    #[error("invalid price series: {reason}")]
    InvalidSeries { reason: String },

    #[error("no data found for tickers: {tickers}")]
    NoData { tickers: String },

    #[error("backtest produced no usable result: {reason}")]
    RunFailed { reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&AllocbtError> for std::process::ExitCode {
    fn from(err: &AllocbtError) -> Self {
        let code: u8 = match err {
            AllocbtError::Io(_) => 1,
            AllocbtError::ConfigParse { .. }
            | AllocbtError::ConfigMissing { .. }
            | AllocbtError::ConfigInvalid { .. } => 2,
            AllocbtError::PriceData { .. } | AllocbtError::InvalidSeries { .. } => 3,
            AllocbtError::Engine(_) => 4,
            AllocbtError::NoData { .. } | AllocbtError::RunFailed { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
