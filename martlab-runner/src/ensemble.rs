//! Strategy ensembles — several independent players of the same policy.
//!
//! Each strategy plays games back to back against its own seeded market
//! until `rows` trades are realized; its curve is the balance over those
//! trades. The combined strategy is the point-wise mean of all curves.

use serde::{Deserialize, Serialize};

use martlab_core::performance::{self, PerformanceSummary};
use martlab_core::rng::RngHierarchy;
use martlab_core::TrialObserver;

use crate::config::ExperimentConfig;
use crate::runner::RunError;

/// Output of an ensemble run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    /// One balance curve per strategy, each `rows + 1` points long.
    pub curves: Vec<Vec<f64>>,
    /// Point-wise mean of `curves`.
    pub combined: Vec<f64>,
    pub summaries: Vec<PerformanceSummary>,
    pub combined_summary: PerformanceSummary,
}

impl Ensemble {
    /// Pearson correlation between every pair of strategy curves.
    pub fn correlation(&self) -> Vec<Vec<f64>> {
        self.curves
            .iter()
            .map(|a| self.curves.iter().map(|b| pearson(a, b)).collect())
            .collect()
    }
}

/// Play `strategies` independent strategies for `rows` trades each.
pub fn run_ensemble(
    config: &ExperimentConfig,
    strategies: usize,
    rows: usize,
    observer: &dyn TrialObserver,
) -> Result<Ensemble, RunError> {
    config.validate()?;
    let simulation = config.simulation()?;
    let policy = config.policy()?;
    let hierarchy = RngHierarchy::new(config.simulation.seed);
    let initial = config.simulation.initial_balance;

    let span = tracing::info_span!("ensemble", policy = policy.name(), strategies, rows);
    let _guard = span.enter();

    let mut curves = Vec::with_capacity(strategies);
    for strategy in 0..strategies {
        let mut generator = config
            .returns
            .build(hierarchy.sub_seed("ensemble", strategy as u64))?;
        let mut pnl = simulation.run_until_trades(&policy, &mut generator, observer, rows)?;
        pnl.truncate(rows);
        curves.push(performance::balance_series(initial, &pnl));
    }

    let combined = mean_columns(&curves);
    let mode = config.return_mode;
    let summaries = curves
        .iter()
        .map(|c| performance::summarize(c, mode))
        .collect();
    let combined_summary = performance::summarize(&combined, mode);
    tracing::info!(
        max_drawdown = combined_summary.max_drawdown,
        "ensemble finished"
    );

    Ok(Ensemble {
        curves,
        combined,
        summaries,
        combined_summary,
    })
}

fn mean_columns(curves: &[Vec<f64>]) -> Vec<f64> {
    let len = curves.iter().map(Vec::len).min().unwrap_or(0);
    (0..len)
        .map(|i| curves.iter().map(|c| c[i]).sum::<f64>() / curves.len() as f64)
        .collect()
}

/// Pearson correlation; NaN when either side is constant.
fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return f64::NAN;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let ma = performance::mean(a);
    let mb = performance::mean(b);
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    cov / (va.sqrt() * vb.sqrt())
}
