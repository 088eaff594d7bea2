//! Game policies — position-sizing state machines.
//!
//! Every variant shares one transition loop (see [`Trial`]): realize the
//! sample, apply the variant's escalation/reset/termination rule, record the
//! PnL. The [`Trigger`] flag decides which sign escalates, so each rule works
//! in both directions.

pub mod config;
pub mod pool;
pub mod trial;

pub use config::{ConfigError, PolicyConfig, RebornMode};
pub use pool::CooldownPool;
pub use trial::Trial;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generator::{ReturnModel, SampleError};
use crate::position::PositionError;

/// Which trade outcome escalates the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Escalate after losing trades (classic martingale).
    #[default]
    FavorLosses,
    /// Escalate after winning trades (anti-martingale).
    FavorWins,
}

impl Trigger {
    /// Does this realized PnL count as a match?
    pub fn matches(self, pnl: f64) -> bool {
        match self {
            Trigger::FavorLosses => pnl < 0.0,
            Trigger::FavorWins => pnl > 0.0,
        }
    }

    /// Has the balance moved back past the starting balance, away from the
    /// direction this trigger escalates on?
    pub fn recovered(self, balance: f64, start: f64) -> bool {
        match self {
            Trigger::FavorLosses => balance > start,
            Trigger::FavorWins => balance < start,
        }
    }
}

/// Errors that abort a trial (and with it the whole run).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrialError {
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    State(#[from] PositionError),
    #[error("trial did not terminate within {steps} steps")]
    NonTerminating { steps: usize },
}

/// What a single step did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// A trade was realized at `position`, leaving the trial at `balance`.
    Traded {
        pnl: f64,
        position: f64,
        balance: f64,
    },
    /// Cooling down; nothing realized.
    Waiting { remaining: u32 },
    /// The trial had already terminated.
    Finished,
}

/// A validated policy bound to its starting balance and position.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    config: PolicyConfig,
    initial_balance: f64,
    initial_position: f64,
}

impl Policy {
    /// Validate and bind a policy.
    ///
    /// A Kelly policy must carry an explicit fraction here; use
    /// [`Policy::for_returns`] to derive it from the return model.
    pub fn new(
        config: PolicyConfig,
        initial_balance: f64,
        initial_position: f64,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if !(initial_balance.is_finite() && initial_balance > 0.0) {
            return Err(ConfigError::InvalidBalance(initial_balance));
        }
        let initial_position = match &config {
            PolicyConfig::Kelly { fraction, .. } => fraction.ok_or(ConfigError::KellyUndefined)?,
            _ => {
                if !(initial_position.is_finite() && initial_position > 0.0) {
                    return Err(ConfigError::InvalidPosition(initial_position));
                }
                initial_position
            }
        };
        Ok(Self {
            config,
            initial_balance,
            initial_position,
        })
    }

    /// Like [`Policy::new`], filling a missing Kelly fraction from `returns`.
    pub fn for_returns(
        mut config: PolicyConfig,
        initial_balance: f64,
        initial_position: f64,
        returns: &ReturnModel,
    ) -> Result<Self, ConfigError> {
        if let PolicyConfig::Kelly { fraction, .. } = &mut config {
            if fraction.is_none() {
                let estimate = returns.kelly_fraction().ok_or(ConfigError::KellyUndefined)?;
                config::check_fraction(estimate)?;
                *fraction = Some(estimate);
            }
        }
        Self::new(config, initial_balance, initial_position)
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Position every trial starts from.
    pub fn initial_position(&self) -> f64 {
        self.initial_position
    }

    pub fn name(&self) -> &'static str {
        self.config.name()
    }

    /// Start a new game: a single trial, or a cooldown pool for pooled
    /// cooldown-reborn policies.
    pub fn new_game(&self) -> Game<'_> {
        match &self.config {
            PolicyConfig::CooldownReborn { mode, .. } if *mode != RebornMode::Wait => {
                Game::Pooled(CooldownPool::new(self, *mode))
            }
            _ => Game::Single(Trial::new(self)),
        }
    }
}

/// One independent game as seen by the driver.
#[derive(Debug, Clone)]
pub enum Game<'p> {
    Single(Trial<'p>),
    Pooled(CooldownPool<'p>),
}

impl<'p> Game<'p> {
    /// Advance by one market sample.
    pub fn step(&mut self, sample: f64) -> Result<StepOutcome, TrialError> {
        match self {
            Game::Single(t) => t.step(sample),
            Game::Pooled(p) => p.step(sample),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Game::Single(t) => t.is_finished(),
            Game::Pooled(p) => p.is_finished(),
        }
    }

    /// Realized PnL so far, in chronological order.
    pub fn pnl(&self) -> &[f64] {
        match self {
            Game::Single(t) => t.pnl(),
            Game::Pooled(p) => p.pnl(),
        }
    }

    /// Steps on which the game realized nothing.
    pub fn waiting_steps(&self) -> usize {
        match self {
            Game::Single(t) => t.waiting_steps(),
            Game::Pooled(p) => p.waiting_steps(),
        }
    }

    pub fn into_pnl(self) -> Vec<f64> {
        match self {
            Game::Single(t) => t.into_pnl(),
            Game::Pooled(p) => p.into_pnl(),
        }
    }
}
