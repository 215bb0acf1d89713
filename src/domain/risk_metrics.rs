//! Historical Value-at-Risk and Expected Shortfall.
//!
//! Both measures are reported as positive loss amounts in currency units:
//! `VaR = -q * value`, where `q` is the `(1 - confidence)` empirical quantile of
//! the returns (linear interpolation between order statistics), and
//! `ES = -mean(r <= q) * value`. A sample whose tail is all gains yields
//! negative figures.

use super::error::EngineError;

/// Sorted finite copy of the sample, validated for use by both measures.
fn prepare(returns: &[f64], confidence_level: f64) -> Result<Vec<f64>, EngineError> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(EngineError::InvalidParameter {
            name: "confidence_level".into(),
            reason: format!("{confidence_level} is not in (0, 1)"),
        });
    }
    let mut sorted: Vec<f64> = returns.iter().copied().filter(|r| r.is_finite()).collect();
    if sorted.is_empty() {
        return Err(EngineError::InsufficientData { have: 0, need: 1 });
    }
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

/// Linearly interpolated quantile of an ascending sample.
pub(crate) fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn calculate_var(
    returns: &[f64],
    current_value: f64,
    confidence_level: f64,
) -> Result<f64, EngineError> {
    let sorted = prepare(returns, confidence_level)?;
    Ok(-quantile(&sorted, 1.0 - confidence_level) * current_value)
}

pub fn calculate_expected_shortfall(
    returns: &[f64],
    current_value: f64,
    confidence_level: f64,
) -> Result<f64, EngineError> {
    let sorted = prepare(returns, confidence_level)?;
    let cutoff = quantile(&sorted, 1.0 - confidence_level);
    // The minimum is always at or below the cutoff, so the tail is never empty.
    let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= cutoff).collect();
    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
    Ok(-mean * current_value)
}
