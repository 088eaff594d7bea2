//! Reporting and export — JSON manifests and CSV series.
//!
//! Provides the artifacts a plotting tool consumes:
//! - **CSV**: `index,balance,drawdown` for each balance series, side-by-side
//!   comparison curves and ensemble curves
//! - **JSON**: a run manifest with config, scalar summaries and schema version
//!
//! Manifests carry a `schema_version`; newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use martlab_core::performance::{drawdown_series, PerformanceSummary};

use crate::config::ExperimentConfig;
use crate::ensemble::Ensemble;
use crate::runner::{ExperimentResult, SCHEMA_VERSION};

// ─── Manifest ───────────────────────────────────────────────────────

/// Scalar statistics for one balance series. Non-finite values are stored
/// as `None` so the manifest survives a JSON round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub series: String,
    pub points: usize,
    pub mean_return: Option<f64>,
    pub return_std_dev: Option<f64>,
    pub max_drawdown: Option<f64>,
}

impl SeriesStats {
    fn new(series: &str, summary: &PerformanceSummary) -> Self {
        Self {
            series: series.to_string(),
            points: summary.drawdown.len(),
            mean_return: finite(summary.mean_return),
            return_std_dev: finite(summary.return_std_dev),
            max_drawdown: finite(summary.max_drawdown),
        }
    }
}

/// Everything needed to identify and reproduce a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub config: ExperimentConfig,
    pub trials: usize,
    pub trades: usize,
    pub waiting_steps: usize,
    pub stats: Vec<SeriesStats>,
    pub batch_win_ratio: Option<f64>,
    pub batch_profit_loss_ratio: Option<f64>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

impl RunManifest {
    pub fn new(result: &ExperimentResult) -> Self {
        let report = result.report();
        Self {
            schema_version: SCHEMA_VERSION,
            label: result.label.clone(),
            created_at: Utc::now(),
            config: ExperimentConfig {
                return_mode: result.return_mode,
                simulation: result.simulation.clone(),
                returns: result.returns.clone(),
                policy: result.policy.clone(),
                sweep: None,
            },
            trials: result.run.trial_count(),
            trades: report.trade_count,
            waiting_steps: result.run.total_waiting_steps(),
            stats: vec![
                SeriesStats::new("per_trade", &report.per_trade),
                SeriesStats::new("per_trial", &report.per_trial),
                SeriesStats::new("per_batch", &report.per_batch),
            ],
            batch_win_ratio: finite(report.batch_win_ratio),
            batch_profit_loss_ratio: finite(report.batch_profit_loss_ratio),
        }
    }
}

/// Serialize a manifest to pretty JSON.
pub fn export_manifest(manifest: &RunManifest) -> Result<String> {
    serde_json::to_string_pretty(manifest).context("failed to serialize RunManifest to JSON")
}

/// Deserialize a manifest, rejecting unknown schema versions.
pub fn import_manifest(json: &str) -> Result<RunManifest> {
    let manifest: RunManifest =
        serde_json::from_str(json).context("failed to deserialize RunManifest from JSON")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Balance series as CSV: `index,balance,drawdown`.
pub fn export_series_csv(balances: &[f64]) -> Result<String> {
    let drawdown = drawdown_series(balances);
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["index", "balance", "drawdown"])?;
    for (i, (b, dd)) in balances.iter().zip(&drawdown).enumerate() {
        wtr.write_record([i.to_string(), b.to_string(), dd.to_string()])?;
    }
    finish(wtr)
}

/// Named curves side by side: `index,<name>...`. Rows stop at the shortest curve.
pub fn export_curves_csv(names: &[&str], curves: &[&[f64]]) -> Result<String> {
    if names.len() != curves.len() {
        bail!("{} names for {} curves", names.len(), curves.len());
    }
    let rows = curves.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["index".to_string()];
    header.extend(names.iter().map(|n| n.to_string()));
    wtr.write_record(&header)?;
    for i in 0..rows {
        let mut row = vec![i.to_string()];
        row.extend(curves.iter().map(|c| c[i].to_string()));
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

/// Ensemble curves: `index,strategy0..strategyN-1,strategyM`.
pub fn export_ensemble_csv(ensemble: &Ensemble) -> Result<String> {
    let mut names: Vec<String> = (0..ensemble.curves.len())
        .map(|i| format!("strategy{i}"))
        .collect();
    names.push("strategyM".to_string());
    let mut curves: Vec<&[f64]> = ensemble.curves.iter().map(Vec::as_slice).collect();
    curves.push(&ensemble.combined);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    export_curves_csv(&names, &curves)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for one experiment.
///
/// Creates `{label}_{timestamp}/` under `output_dir` containing:
/// - `manifest.json`
/// - `per_trade.csv`, `per_trial.csv`, `per_batch.csv`
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &ExperimentResult, output_dir: &Path) -> Result<PathBuf> {
    let manifest = RunManifest::new(result);
    let dirname = format!(
        "{}_{}",
        result.label,
        manifest.created_at.format("%Y%m%d_%H%M%S%.3f")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_manifest(&manifest)?)?;

    let series = [
        ("per_trade.csv", result.run.per_trade_balances()),
        ("per_trial.csv", result.run.per_trial_balances()),
        ("per_batch.csv", result.run.per_batch_balances()),
    ];
    for (file, balances) in series {
        std::fs::write(run_dir.join(file), export_series_csv(&balances)?)
            .with_context(|| format!("failed to write {file}"))?;
    }

    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

/// Load a manifest from an artifact directory.
pub fn load_artifacts(dir: &Path) -> Result<RunManifest> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_manifest(&json)
}
