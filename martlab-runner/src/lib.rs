//! MartLab Runner — experiment orchestration on top of `martlab-core`.
//!
//! This crate provides:
//! - TOML experiment configs with an optional parameter sweep
//! - Single-experiment runner producing the three balance series and reports
//! - Parameter × seed sweeps, parallel with rayon
//! - JSON persistence of labelled run records and aligned averaging
//! - Strategy ensembles with a combined mean curve
//! - CSV/JSON artifact export

pub mod config;
pub mod ensemble;
pub mod export;
pub mod persistence;
pub mod runner;
pub mod sweep;

pub use config::{ExperimentConfig, ExperimentError, SweepConfig, SweepParameter};
pub use ensemble::{run_ensemble, Ensemble};
pub use export::{save_artifacts, RunManifest};
pub use persistence::{mean_curve, PersistError, ResultSet, RunRecord, Series};
pub use runner::{run_experiment, run_with, ExperimentResult, RunError, SCHEMA_VERSION};
pub use sweep::{ParamSweep, SweepPoint};
