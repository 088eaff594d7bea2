//! Cooldown pool — cooldown-reborn games where a fresh trial trades while
//! cooled trials sit out their waiting steps.
//!
//! Every step first ticks the suspended trials that are still cooling (with
//! the same market sample), then steps the active trial. The pool's PnL is
//! the active trial's realized trades, in order.
//!
//! - [`RebornMode::ResumeParent`]: suspended trials form a stack. When the
//!   active trial finishes, the most recent parent resumes if its cooldown
//!   has expired; a parent still cooling gets a fresh trial on top of it.
//!   The game ends when a trial finishes with no parent left.
//! - [`RebornMode::DiscardCooled`]: suspended trials form a queue and are
//!   dropped once their cooldown expires. The game ends when the active
//!   trial finishes.

use std::collections::VecDeque;
use std::mem;

use super::{Policy, RebornMode, StepOutcome, Trial, TrialError};

#[derive(Debug, Clone)]
pub struct CooldownPool<'p> {
    policy: &'p Policy,
    mode: RebornMode,
    active: Trial<'p>,
    suspended: VecDeque<Trial<'p>>,
    pnl: Vec<f64>,
    waiting: usize,
    spawned: usize,
    finished: bool,
}

impl<'p> CooldownPool<'p> {
    pub fn new(policy: &'p Policy, mode: RebornMode) -> Self {
        Self {
            policy,
            mode,
            active: Trial::new(policy),
            suspended: VecDeque::new(),
            pnl: Vec::new(),
            waiting: 0,
            spawned: 1,
            finished: false,
        }
    }

    pub fn step(&mut self, sample: f64) -> Result<StepOutcome, TrialError> {
        if self.finished {
            return Ok(StepOutcome::Finished);
        }

        for trial in self.suspended.iter_mut() {
            if trial.is_cooling() {
                trial.step(sample)?;
            }
        }
        if self.mode == RebornMode::DiscardCooled {
            self.suspended.retain(Trial::is_cooling);
        }

        let outcome = self.active.step(sample)?;
        match outcome {
            StepOutcome::Traded { pnl, .. } => self.pnl.push(pnl),
            StepOutcome::Waiting { .. } => self.waiting += 1,
            StepOutcome::Finished => {}
        }

        if self.active.is_cooling() {
            let fresh = self.fresh();
            let cooled = mem::replace(&mut self.active, fresh);
            self.suspended.push_back(cooled);
        } else if self.active.is_finished() {
            self.on_active_finished();
        }

        Ok(outcome)
    }

    fn on_active_finished(&mut self) {
        match self.mode {
            RebornMode::ResumeParent => match self.suspended.pop_back() {
                None => self.finished = true,
                Some(parent) if parent.is_cooling() => {
                    self.suspended.push_back(parent);
                    self.active = self.fresh();
                }
                Some(parent) => self.active = parent,
            },
            RebornMode::DiscardCooled | RebornMode::Wait => self.finished = true,
        }
    }

    fn fresh(&mut self) -> Trial<'p> {
        self.spawned += 1;
        Trial::new(self.policy)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pnl(&self) -> &[f64] {
        &self.pnl
    }

    pub fn waiting_steps(&self) -> usize {
        self.waiting
    }

    /// Trials created over the life of the pool, the first one included.
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    /// Trials currently suspended (cooling, or awaiting resumption).
    pub fn suspended(&self) -> usize {
        self.suspended.len()
    }

    pub fn into_pnl(self) -> Vec<f64> {
        self.pnl
    }
}
