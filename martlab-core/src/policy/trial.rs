//! Trial — one game from a fresh position state to termination.
//!
//! All policy variants run through the same `step`: realize the sample,
//! then apply the variant's rule from [`PolicyConfig`]. Counters:
//! - `streak`: consecutive matches since the last reset
//! - `matches`: matches accumulated over the whole trial
//! - `escalations`: position multiplications applied
//! - `trades`: realized trades

use crate::position::PositionState;

use super::{Policy, PolicyConfig, StepOutcome, TrialError};

/// A single running trial.
#[derive(Debug, Clone)]
pub struct Trial<'p> {
    policy: &'p Policy,
    state: PositionState,
    streak: u32,
    matches: u32,
    escalations: u32,
    trades: u32,
    steps: usize,
    waiting: usize,
    finished: bool,
    pnl: Vec<f64>,
}

impl<'p> Trial<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        let mut state = PositionState::new(policy.initial_balance(), policy.initial_position());
        if let PolicyConfig::CooldownReborn { reawaken, .. } = policy.config() {
            state = state.with_reawaken(*reawaken);
        }
        Self {
            policy,
            state,
            streak: 0,
            matches: 0,
            escalations: 0,
            trades: 0,
            steps: 0,
            waiting: 0,
            finished: false,
            pnl: Vec::new(),
        }
    }

    /// Feed one market sample through the position state and the policy rule.
    pub fn step(&mut self, sample: f64) -> Result<StepOutcome, TrialError> {
        if self.finished {
            return Ok(StepOutcome::Finished);
        }

        let position = self.state.position();
        let tick = self.state.realize(sample)?;
        self.steps += 1;

        let pnl = match tick {
            crate::position::Tick::Waiting { remaining } => {
                self.waiting += 1;
                return Ok(StepOutcome::Waiting { remaining });
            }
            crate::position::Tick::Realized(pnl) => pnl,
        };

        self.trades += 1;
        self.pnl.push(pnl);
        self.apply_rule(pnl)?;

        Ok(StepOutcome::Traded {
            pnl,
            position,
            balance: self.state.balance(),
        })
    }

    fn apply_rule(&mut self, pnl: f64) -> Result<(), TrialError> {
        let initial = self.policy.initial_position();
        match self.policy.config() {
            PolicyConfig::BoundedStreak {
                max_escalations,
                streak_limit,
                multiplier,
                trigger,
            } => {
                if !trigger.matches(pnl) {
                    self.finished = true;
                    return Ok(());
                }
                self.streak += 1;
                if self.streak >= streak_limit.unwrap_or(*max_escalations) {
                    self.finished = true;
                } else if self.escalations < *max_escalations {
                    self.escalate(*multiplier);
                }
            }

            PolicyConfig::CooldownReborn {
                max_escalations,
                multiplier,
                cooldown,
                streak_limit,
                trigger,
                ..
            } => {
                if !trigger.matches(pnl) {
                    self.finished = true;
                    return Ok(());
                }
                self.matches += 1;
                if self.matches >= *streak_limit {
                    self.finished = true;
                    return Ok(());
                }
                self.streak += 1;
                self.escalate(*multiplier);
                if self.streak >= *max_escalations {
                    // Rebirth: sit out the cooldown, then start over.
                    self.state.enter_cooldown(i64::from(*cooldown))?;
                    self.streak = 0;
                    self.state.set_position(initial);
                }
            }

            PolicyConfig::StreakReset {
                max_escalations,
                multiplier,
                trigger,
                reset_position,
            } => {
                self.streak_with_reset(pnl, *multiplier, *trigger, *reset_position);
                if self.streak > *max_escalations {
                    self.finished = true;
                }
            }

            PolicyConfig::BoundedAttempts {
                max_escalations,
                max_attempts,
                multiplier,
                trigger,
            } => {
                self.streak_with_reset(pnl, *multiplier, *trigger, true);
                if self.streak > *max_escalations || self.trades >= *max_attempts {
                    self.finished = true;
                }
            }

            PolicyConfig::EscalateUntilRecovery {
                multiplier,
                trigger,
            } => {
                if trigger.matches(pnl) {
                    self.escalate(*multiplier);
                } else if self.trades == 1
                    || (self.escalations > 0
                        && trigger.recovered(self.state.balance(), self.state.init_balance()))
                {
                    self.finished = true;
                }
            }

            PolicyConfig::Tiered {
                multipliers,
                default_multiplier,
                trigger,
            } => {
                if !trigger.matches(pnl) {
                    self.finished = true;
                    return Ok(());
                }
                self.streak += 1;
                let x = multipliers
                    .get(self.streak as usize - 1)
                    .copied()
                    .unwrap_or(*default_multiplier);
                self.escalate(x);
            }

            PolicyConfig::Kelly { trades, .. } => {
                if self.trades >= *trades {
                    self.finished = true;
                }
            }
        }
        Ok(())
    }

    fn streak_with_reset(
        &mut self,
        pnl: f64,
        multiplier: f64,
        trigger: super::Trigger,
        reset_position: bool,
    ) {
        if trigger.matches(pnl) {
            self.streak += 1;
            self.escalate(multiplier);
        } else {
            self.streak = 0;
            if reset_position {
                self.state.set_position(self.policy.initial_position());
            }
        }
    }

    fn escalate(&mut self, multiplier: f64) {
        self.state.set_position(self.state.position() * multiplier);
        self.escalations += 1;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Still sitting out a cooldown.
    pub fn is_cooling(&self) -> bool {
        !self.finished && self.state.is_cooling()
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn pnl(&self) -> &[f64] {
        &self.pnl
    }

    pub fn trades(&self) -> u32 {
        self.trades
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn waiting_steps(&self) -> usize {
        self.waiting
    }

    pub fn into_pnl(self) -> Vec<f64> {
        self.pnl
    }
}
