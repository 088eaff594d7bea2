//! Simulation driver — runs N independent games and aggregates their PnL.
//!
//! Two entry points:
//! - [`Simulation::run`]: sequential, one shared generator.
//! - [`Simulation::run_seeded`]: one generator per trial, seeded through the
//!   [`RngHierarchy`]; parallel across trials when `parallel` is set. Results
//!   are collected by trial index, so output does not depend on thread count.
//!
//! A run yields three balance series: per trade, per trial and per batch of
//! `batch_size` trades.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generator::{ReturnGenerator, ReturnModel};
use crate::observer::TrialObserver;
use crate::performance::{self, PerformanceSummary, ReturnMode};
use crate::policy::{ConfigError, Policy, PolicyConfig, TrialError};
use crate::rng::RngHierarchy;

/// Driver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub initial_balance: f64,
    pub initial_position: f64,
    /// Number of independent trials (N).
    pub trials: usize,
    /// Trades per batch (K) for the batch series.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Step ceiling per trial; unbounded policies stop here with an error.
    #[serde(default = "default_max_steps")]
    pub max_steps_per_trial: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub parallel: bool,
}

fn default_batch_size() -> usize {
    100
}

fn default_max_steps() -> usize {
    1_000_000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            initial_position: 0.002,
            trials: 1000,
            batch_size: default_batch_size(),
            max_steps_per_trial: default_max_steps(),
            seed: 0,
            parallel: false,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return Err(ConfigError::InvalidBalance(self.initial_balance));
        }
        if !(self.initial_position.is_finite() && self.initial_position > 0.0) {
            return Err(ConfigError::InvalidPosition(self.initial_position));
        }
        let counts = [
            ("trials", self.trials),
            ("batch_size", self.batch_size),
            ("max_steps_per_trial", self.max_steps_per_trial),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ConfigError::ZeroCount { name });
            }
        }
        Ok(())
    }
}

/// Errors fatal to a simulation run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("trial {trial} failed: {source}")]
    Trial {
        trial: usize,
        #[source]
        source: TrialError,
    },
}

/// Output of one finished game.
#[derive(Debug, Clone, PartialEq)]
struct TrialRecord {
    pnl: Vec<f64>,
    waiting: usize,
}

/// A validated simulation.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Bind `policy` to this simulation's balance and position. A Kelly
    /// policy without a fraction takes the estimate from `returns`.
    pub fn policy(
        &self,
        policy: PolicyConfig,
        returns: &ReturnModel,
    ) -> Result<Policy, ConfigError> {
        Policy::for_returns(
            policy,
            self.config.initial_balance,
            self.config.initial_position,
            returns,
        )
    }

    /// Run all trials sequentially against one shared generator.
    pub fn run<G>(
        &self,
        policy: &Policy,
        generator: &mut G,
        observer: &dyn TrialObserver,
    ) -> Result<SimulationRun, SimError>
    where
        G: ReturnGenerator + ?Sized,
    {
        tracing::debug!(policy = policy.name(), trials = self.config.trials, "sequential run");
        let records = (0..self.config.trials)
            .map(|trial| {
                play(policy, trial, &mut *generator, observer, self.config.max_steps_per_trial)
                    .map_err(|source| SimError::Trial { trial, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.collect(records))
    }

    /// Play games back to back against one generator until at least
    /// `min_trades` trades are realized; returns every realized trade.
    ///
    /// Every game realizes at least one trade, so this always terminates.
    pub fn run_until_trades<G>(
        &self,
        policy: &Policy,
        generator: &mut G,
        observer: &dyn TrialObserver,
        min_trades: usize,
    ) -> Result<Vec<f64>, SimError>
    where
        G: ReturnGenerator + ?Sized,
    {
        let mut pnl = Vec::with_capacity(min_trades);
        let mut trial = 0usize;
        while pnl.len() < min_trades {
            let record = play(
                policy,
                trial,
                &mut *generator,
                observer,
                self.config.max_steps_per_trial,
            )
            .map_err(|source| SimError::Trial { trial, source })?;
            pnl.extend(record.pnl);
            trial += 1;
        }
        Ok(pnl)
    }

    /// Run every trial with its own generator, seeded from
    /// `(seed, policy name, trial index)`.
    pub fn run_seeded(
        &self,
        policy: &Policy,
        model: &ReturnModel,
        observer: &dyn TrialObserver,
    ) -> Result<SimulationRun, SimError> {
        model.validate()?;
        let hierarchy = RngHierarchy::new(self.config.seed);
        let label = policy.name();
        let max_steps = self.config.max_steps_per_trial;

        tracing::debug!(
            policy = label,
            trials = self.config.trials,
            seed = self.config.seed,
            parallel = self.config.parallel,
            "seeded run"
        );

        let run_one = |trial: usize| -> Result<TrialRecord, SimError> {
            let mut generator = model.build(hierarchy.sub_seed(label, trial as u64))?;
            play(policy, trial, &mut generator, observer, max_steps)
                .map_err(|source| SimError::Trial { trial, source })
        };

        let records = if self.config.parallel {
            (0..self.config.trials)
                .into_par_iter()
                .map(run_one)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            (0..self.config.trials)
                .map(run_one)
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(self.collect(records))
    }

    fn collect(&self, records: Vec<TrialRecord>) -> SimulationRun {
        let mut per_trade_pnl = Vec::with_capacity(records.len());
        let mut waiting_steps = Vec::with_capacity(records.len());
        for record in records {
            per_trade_pnl.push(record.pnl);
            waiting_steps.push(record.waiting);
        }
        let per_trial_totals: Vec<f64> = per_trade_pnl.iter().map(|p| p.iter().sum::<f64>()).collect();
        SimulationRun {
            per_trade_pnl,
            per_trial_totals,
            waiting_steps,
            initial_balance: self.config.initial_balance,
            batch_size: self.config.batch_size,
        }
    }
}

/// Play one game to completion.
fn play<G>(
    policy: &Policy,
    trial: usize,
    generator: &mut G,
    observer: &dyn TrialObserver,
    max_steps: usize,
) -> Result<TrialRecord, TrialError>
where
    G: ReturnGenerator + ?Sized,
{
    observer.on_trial_start(trial);
    let mut game = policy.new_game();
    let mut steps = 0usize;
    while !game.is_finished() {
        if steps >= max_steps {
            return Err(TrialError::NonTerminating { steps });
        }
        let sample = generator.sample()?;
        let outcome = game.step(sample)?;
        observer.on_step(trial, &outcome);
        steps += 1;
    }
    let waiting = game.waiting_steps();
    let pnl = game.into_pnl();
    observer.on_trial_end(trial, pnl.len(), pnl.iter().sum());
    Ok(TrialRecord { pnl, waiting })
}

/// Raw output of a simulation plus the derived balance series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    /// Realized PnL per trial, in trial order.
    pub per_trade_pnl: Vec<Vec<f64>>,
    pub per_trial_totals: Vec<f64>,
    /// Waiting steps per trial.
    pub waiting_steps: Vec<usize>,
    pub initial_balance: f64,
    pub batch_size: usize,
}

/// Summaries of the three balance series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub per_trade: PerformanceSummary,
    pub per_trial: PerformanceSummary,
    pub per_batch: PerformanceSummary,
    pub trade_count: usize,
    pub batch_win_ratio: f64,
    pub batch_profit_loss_ratio: f64,
}

impl SimulationRun {
    pub fn trial_count(&self) -> usize {
        self.per_trade_pnl.len()
    }

    pub fn trade_count(&self) -> usize {
        self.per_trade_pnl.iter().map(Vec::len).sum()
    }

    pub fn total_waiting_steps(&self) -> usize {
        self.waiting_steps.iter().sum()
    }

    /// Every realized trade, trials concatenated in order.
    pub fn flattened_pnl(&self) -> Vec<f64> {
        self.per_trade_pnl.iter().flatten().copied().collect()
    }

    pub fn per_trade_balances(&self) -> Vec<f64> {
        performance::balance_series(self.initial_balance, &self.flattened_pnl())
    }

    pub fn per_trial_balances(&self) -> Vec<f64> {
        performance::balance_series(self.initial_balance, &self.per_trial_totals)
    }

    /// Mean PnL of each full batch of `batch_size` trades. A trailing
    /// partial batch is dropped.
    pub fn batch_means(&self) -> Vec<f64> {
        self.flattened_pnl()
            .chunks_exact(self.batch_size.max(1))
            .map(performance::mean)
            .collect()
    }

    pub fn per_batch_balances(&self) -> Vec<f64> {
        performance::balance_series(self.initial_balance, &self.batch_means())
    }

    pub fn batch_win_ratio(&self) -> f64 {
        performance::win_ratio(&self.batch_means())
    }

    pub fn batch_profit_loss_ratio(&self) -> f64 {
        performance::profit_loss_ratio(&self.batch_means())
    }

    pub fn report(&self, mode: ReturnMode) -> SimulationReport {
        let batch_means = self.batch_means();
        SimulationReport {
            per_trade: performance::summarize(&self.per_trade_balances(), mode),
            per_trial: performance::summarize(&self.per_trial_balances(), mode),
            per_batch: performance::summarize(
                &performance::balance_series(self.initial_balance, &batch_means),
                mode,
            ),
            trade_count: self.trade_count(),
            batch_win_ratio: performance::win_ratio(&batch_means),
            batch_profit_loss_ratio: performance::profit_loss_ratio(&batch_means),
        }
    }
}
