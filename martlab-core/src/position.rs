//! Position state — balance, exposure and cooldown for a single trial.
//!
//! PnL is always computed against the *initial* balance:
//! `pnl = init_balance * position * return`. While the cooldown counter is
//! positive the state is "waiting": returns are observed but not realized.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("cooldown duration cannot be negative (got {0})")]
    NegativeCooldown(i64),
}

/// What happens when a cooldown runs out on a losing tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReawakenRule {
    /// Resume trading on the next step regardless of the market.
    #[default]
    Immediate,
    /// If the tick that ends the cooldown is non-positive, wait one more step.
    AwaitPositiveTick,
}

/// Result of feeding one market return into the state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// A trade was realized for this PnL.
    Realized(f64),
    /// Cooling down; `remaining` steps left after this one.
    Waiting { remaining: u32 },
}

impl Tick {
    /// Realized PnL; waiting steps contribute zero.
    pub fn pnl(&self) -> f64 {
        match self {
            Tick::Realized(pnl) => *pnl,
            Tick::Waiting { .. } => 0.0,
        }
    }
}

/// Mutable per-trial position state.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionState {
    init_balance: f64,
    balance: f64,
    position: f64,
    cooldown_remaining: u32,
    reawaken: ReawakenRule,
}

impl PositionState {
    pub fn new(init_balance: f64, position: f64) -> Self {
        Self {
            init_balance,
            balance: init_balance,
            position,
            cooldown_remaining: 0,
            reawaken: ReawakenRule::Immediate,
        }
    }

    pub fn with_reawaken(mut self, rule: ReawakenRule) -> Self {
        self.reawaken = rule;
        self
    }

    /// Feed one market return.
    ///
    /// Realizes `init_balance * position * return_` when not cooling down;
    /// otherwise consumes one cooldown step and leaves the balance untouched.
    pub fn realize(&mut self, return_: f64) -> Result<Tick, PositionError> {
        if self.cooldown_remaining == 0 {
            let pnl = self.init_balance * self.position * return_;
            self.balance += pnl;
            return Ok(Tick::Realized(pnl));
        }

        self.cooldown_remaining -= 1;
        if self.cooldown_remaining == 0
            && self.reawaken == ReawakenRule::AwaitPositiveTick
            && return_ <= 0.0
        {
            self.cooldown_remaining = 1;
        }
        Ok(Tick::Waiting {
            remaining: self.cooldown_remaining,
        })
    }

    /// Start (or restart) a cooldown. Overwrites any remaining count.
    pub fn enter_cooldown(&mut self, duration: i64) -> Result<(), PositionError> {
        if duration < 0 {
            return Err(PositionError::NegativeCooldown(duration));
        }
        self.cooldown_remaining = u32::try_from(duration).unwrap_or(u32::MAX);
        Ok(())
    }

    pub fn set_position(&mut self, value: f64) {
        self.position = value;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn init_balance(&self) -> f64 {
        self.init_balance
    }

    pub fn cooldown_remaining(&self) -> u32 {
        self.cooldown_remaining
    }

    pub fn is_cooling(&self) -> bool {
        self.cooldown_remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realize_uses_initial_balance() {
        let mut s = PositionState::new(100.0, 0.2);
        assert_eq!(s.realize(-0.02).unwrap(), Tick::Realized(100.0 * 0.2 * -0.02));
        s.set_position(0.4);
        let pnl = s.realize(-0.02).unwrap().pnl();
        assert!((pnl - (-0.8)).abs() < 1e-12);
        assert!((s.balance() - (100.0 - 0.4 - 0.8)).abs() < 1e-12);
    }

    #[test]
    fn waiting_leaves_balance_unchanged() {
        let mut s = PositionState::new(100.0, 0.5);
        s.enter_cooldown(2).unwrap();
        let t1 = s.realize(0.05).unwrap();
        assert_eq!(t1, Tick::Waiting { remaining: 1 });
        assert_eq!(t1.pnl(), 0.0);
        let t2 = s.realize(-0.05).unwrap();
        assert_eq!(t2, Tick::Waiting { remaining: 0 });
        assert_eq!(s.balance(), 100.0);
        assert!(!s.is_cooling());
        assert!(matches!(s.realize(0.01).unwrap(), Tick::Realized(_)));
    }

    #[test]
    fn enter_cooldown_overwrites() {
        let mut s = PositionState::new(100.0, 0.1);
        s.enter_cooldown(10).unwrap();
        s.enter_cooldown(3).unwrap();
        assert_eq!(s.cooldown_remaining(), 3);
    }

    #[test]
    fn negative_cooldown_rejected() {
        let mut s = PositionState::new(100.0, 0.1);
        assert_eq!(
            s.enter_cooldown(-1),
            Err(PositionError::NegativeCooldown(-1))
        );
        assert_eq!(s.cooldown_remaining(), 0);
    }

    #[test]
    fn await_positive_tick_extends_on_loss() {
        let mut s = PositionState::new(100.0, 0.1).with_reawaken(ReawakenRule::AwaitPositiveTick);
        s.enter_cooldown(1).unwrap();
        // Cooldown would end on a losing tick → one more wait.
        assert_eq!(s.realize(-0.01).unwrap(), Tick::Waiting { remaining: 1 });
        // Zero counts as non-positive too.
        assert_eq!(s.realize(0.0).unwrap(), Tick::Waiting { remaining: 1 });
        assert_eq!(s.realize(0.01).unwrap(), Tick::Waiting { remaining: 0 });
        assert!(matches!(s.realize(-0.01).unwrap(), Tick::Realized(_)));
    }

    #[test]
    fn immediate_rule_ignores_market() {
        let mut s = PositionState::new(100.0, 0.1);
        s.enter_cooldown(1).unwrap();
        assert_eq!(s.realize(-0.01).unwrap(), Tick::Waiting { remaining: 0 });
        assert!(!s.is_cooling());
    }
}
