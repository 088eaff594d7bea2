//! Trial observers — hooks the driver calls as games progress.
//!
//! Observers take `&self` so one instance can be shared across the rayon
//! workers of a parallel run.

use crate::policy::StepOutcome;

/// Callbacks for trial progress. Every method defaults to a no-op.
pub trait TrialObserver: Send + Sync {
    fn on_trial_start(&self, _trial: usize) {}

    /// A trade was realized.
    fn on_trade(&self, _trial: usize, _pnl: f64, _position: f64, _balance: f64) {}

    fn on_waiting(&self, _trial: usize, _remaining: u32) {}

    /// The game finished after `trades` realized trades netting `total`.
    fn on_trial_end(&self, _trial: usize, _trades: usize, _total: f64) {}

    /// Dispatch a step outcome to the matching callback.
    fn on_step(&self, trial: usize, outcome: &StepOutcome) {
        match *outcome {
            StepOutcome::Traded {
                pnl,
                position,
                balance,
            } => self.on_trade(trial, pnl, position, balance),
            StepOutcome::Waiting { remaining } => self.on_waiting(trial, remaining),
            StepOutcome::Finished => {}
        }
    }
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl TrialObserver for NullObserver {}

/// Emits `tracing` events: trades at DEBUG, waiting steps at TRACE, trial
/// ends at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TrialObserver for TracingObserver {
    fn on_trial_start(&self, trial: usize) {
        tracing::trace!(trial, "trial started");
    }

    fn on_trade(&self, trial: usize, pnl: f64, position: f64, balance: f64) {
        tracing::debug!(trial, pnl, position, balance, "trade");
    }

    fn on_waiting(&self, trial: usize, remaining: u32) {
        tracing::trace!(trial, remaining, "cooling down");
    }

    fn on_trial_end(&self, trial: usize, trades: usize, total: f64) {
        tracing::info!(trial, trades, total, "trial finished");
    }
}
