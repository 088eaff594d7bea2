//! Experiment runner — wires config, driver and performance calculator.
//!
//! Two entry points:
//! - `run_experiment()`: builds everything from an [`ExperimentConfig`].
//! - `run_with()`: takes an already-built simulation and policy. Used by sweeps.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use martlab_core::policy::{ConfigError, Policy};
use martlab_core::{
    PolicyConfig, ReturnMode, ReturnModel, SimError, Simulation, SimulationConfig,
    SimulationReport, SimulationRun, TrialObserver,
};

use crate::config::{ExperimentConfig, ExperimentError};
use crate::persistence::RunRecord;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("experiment error: {0}")]
    Experiment(#[from] ExperimentError),
    #[error("simulation failed: {0}")]
    Simulation(#[from] SimError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of one experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub label: String,
    pub return_mode: ReturnMode,
    pub simulation: SimulationConfig,
    pub returns: ReturnModel,
    /// Policy as bound for the run (Kelly fraction filled in).
    pub policy: PolicyConfig,
    pub run: SimulationRun,
}

impl ExperimentResult {
    pub fn report(&self) -> SimulationReport {
        self.run.report(self.return_mode)
    }

    pub fn record(&self) -> RunRecord {
        RunRecord::from_run(&self.run)
    }
}

/// Run one experiment from its config.
pub fn run_experiment(
    config: &ExperimentConfig,
    observer: &dyn TrialObserver,
) -> Result<ExperimentResult, RunError> {
    config.validate()?;
    let simulation = config.simulation()?;
    let policy = config.policy()?;
    let result = run_with(
        &simulation,
        &policy,
        &config.returns,
        config.return_mode,
        observer,
    )?;
    Ok(result)
}

/// Run with a pre-built simulation and policy. Used by sweeps.
pub fn run_with(
    simulation: &Simulation,
    policy: &Policy,
    returns: &ReturnModel,
    return_mode: ReturnMode,
    observer: &dyn TrialObserver,
) -> Result<ExperimentResult, RunError> {
    let span = tracing::info_span!("experiment", policy = policy.name(), seed = simulation.config().seed);
    let _guard = span.enter();

    let run = simulation.run_seeded(policy, returns, observer)?;
    tracing::info!(
        trials = run.trial_count(),
        trades = run.trade_count(),
        waiting = run.total_waiting_steps(),
        "experiment finished"
    );

    Ok(ExperimentResult {
        label: policy.name().to_string(),
        return_mode,
        simulation: simulation.config().clone(),
        returns: returns.clone(),
        policy: policy.config().clone(),
        run,
    })
}
