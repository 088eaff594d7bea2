//! Result persistence — labelled run records as JSON.
//!
//! A [`ResultSet`] maps a configuration label (`"streak_limit=15"`) to the
//! records of every seed run under it. Each record keeps the per-trade
//! balance history and its drawdown history plus their lengths, which are
//! used to align variable-length runs before averaging.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use martlab_core::performance::drawdown_series;
use martlab_core::SimulationRun;

/// Errors reading or writing result sets.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid result JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record length mismatch: {field} is {actual} but {field}_c says {declared}")]
    LengthMismatch {
        field: &'static str,
        declared: usize,
        actual: usize,
    },
}

/// One seeded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Per-trade balance history.
    pub balance: Vec<f64>,
    /// Drawdown history, one entry per balance point.
    pub back: Vec<f64>,
    pub balance_c: usize,
    pub back_c: usize,
}

impl RunRecord {
    pub fn new(balance: Vec<f64>, back: Vec<f64>) -> Self {
        Self {
            balance_c: balance.len(),
            back_c: back.len(),
            balance,
            back,
        }
    }

    /// Record the per-trade series of a simulation run.
    pub fn from_run(run: &SimulationRun) -> Self {
        let balance = run.per_trade_balances();
        let back = drawdown_series(&balance);
        Self::new(balance, back)
    }

    /// Check the stored counts against the series.
    pub fn validate(&self) -> Result<(), PersistError> {
        if self.balance.len() != self.balance_c {
            return Err(PersistError::LengthMismatch {
                field: "balance",
                declared: self.balance_c,
                actual: self.balance.len(),
            });
        }
        if self.back.len() != self.back_c {
            return Err(PersistError::LengthMismatch {
                field: "back",
                declared: self.back_c,
                actual: self.back.len(),
            });
        }
        Ok(())
    }

    pub fn series(&self, series: Series) -> &[f64] {
        match series {
            Series::Balance => &self.balance,
            Series::Back => &self.back,
        }
    }
}

/// Which history of a record to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    Balance,
    Back,
}

/// Label → records, ordered by label.
pub type ResultSet = BTreeMap<String, Vec<RunRecord>>;

/// Write a result set as JSON.
pub fn save(path: &Path, results: &ResultSet) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PersistError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string(results)?;
    std::fs::write(path, json).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), labels = results.len(), "saved result set");
    Ok(())
}

/// Read a result set and check every record's counts.
pub fn load(path: &Path) -> Result<ResultSet, PersistError> {
    let json = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let results: ResultSet = serde_json::from_str(&json)?;
    for record in results.values().flatten() {
        record.validate()?;
    }
    Ok(results)
}

/// Shortest length of `series` across `records`.
pub fn aligned_len<'a>(records: impl IntoIterator<Item = &'a RunRecord>, series: Series) -> Option<usize> {
    records
        .into_iter()
        .map(|r| match series {
            Series::Balance => r.balance_c,
            Series::Back => r.back_c,
        })
        .min()
}

/// Point-wise mean of `series` over `records`, truncated to `len` points.
pub fn mean_curve_to(records: &[RunRecord], series: Series, len: usize) -> Vec<f64> {
    if records.is_empty() {
        return Vec::new();
    }
    let mut sum = vec![0.0; len];
    for record in records {
        for (acc, v) in sum.iter_mut().zip(record.series(series)) {
            *acc += v;
        }
    }
    let n = records.len() as f64;
    sum.into_iter().map(|s| s / n).collect()
}

/// Point-wise mean of `series`, aligned to the shortest record.
pub fn mean_curve(records: &[RunRecord], series: Series) -> Vec<f64> {
    let len = aligned_len(records, series).unwrap_or(0);
    mean_curve_to(records, series, len)
}

/// Mean curves of two record groups, both aligned to the shortest record
/// across the two.
pub fn compare(a: &[RunRecord], b: &[RunRecord], series: Series) -> (Vec<f64>, Vec<f64>) {
    let len = aligned_len(a.iter().chain(b), series).unwrap_or(0);
    (
        mean_curve_to(a, series, len),
        mean_curve_to(b, series, len),
    )
}
