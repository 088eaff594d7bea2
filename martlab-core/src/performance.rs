//! Performance calculator — pure functions over a balance series.
//!
//! Degenerate input never errors: a series too short for a statistic yields NaN.

use serde::{Deserialize, Serialize};

/// How per-step returns are derived from consecutive balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    /// `b[i] - b[i-1]`
    #[default]
    Arithmetic,
    /// `b[i] / b[i-1] - 1`
    Percentage,
}

/// Summary statistics for one balance series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub mean_return: f64,
    /// Population standard deviation of the returns.
    pub return_std_dev: f64,
    /// One entry per balance point, non-decreasing.
    pub drawdown: Vec<f64>,
    pub max_drawdown: f64,
}

/// Summarize a balance series.
pub fn summarize(balances: &[f64], mode: ReturnMode) -> PerformanceSummary {
    let returns = returns(balances, mode);
    let drawdown = drawdown_series(balances);
    let max_drawdown = drawdown.last().copied().unwrap_or(f64::NAN);
    PerformanceSummary {
        mean_return: mean(&returns),
        return_std_dev: population_std(&returns),
        drawdown,
        max_drawdown,
    }
}

// ─── Individual functions ───────────────────────────────────────────

/// Balance series from a starting balance and a run of increments:
/// `n` values give `n + 1` points.
pub fn balance_series(start: f64, values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len() + 1);
    let mut balance = start;
    out.push(balance);
    for v in values {
        balance += v;
        out.push(balance);
    }
    out
}

/// Step returns between consecutive balances.
pub fn returns(balances: &[f64], mode: ReturnMode) -> Vec<f64> {
    balances
        .windows(2)
        .map(|w| match mode {
            ReturnMode::Arithmetic => w[1] - w[0],
            ReturnMode::Percentage => w[1] / w[0] - 1.0,
        })
        .collect()
}

/// Running-maxed drawdown: `dd[i] = max_{j<=i} (1 - b[j] / peak[j])`.
pub fn drawdown_series(balances: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = f64::NEG_INFINITY;
    balances
        .iter()
        .map(|&b| {
            peak = peak.max(b);
            worst = worst.max(1.0 - b / peak);
            worst
        })
        .collect()
}

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; NaN for an empty slice.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Fraction of strictly positive values; NaN for an empty slice.
pub fn win_ratio(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().filter(|v| **v > 0.0).count() as f64 / values.len() as f64
}

/// Gross profit over gross loss. Infinite when nothing lost.
pub fn profit_loss_ratio(values: &[f64]) -> f64 {
    let profit: f64 = values.iter().filter(|v| **v > 0.0).sum();
    let loss: f64 = values.iter().filter(|v| **v < 0.0).sum();
    if !values.iter().any(|v| *v < 0.0) {
        return f64::INFINITY;
    }
    -profit / loss
}
