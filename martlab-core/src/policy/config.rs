//! Policy configuration — one serializable enum for every sizing rule.
//!
//! Parameter names follow the usual martingale notation:
//! - A: `max_escalations` (consecutive escalations before the rule kicks in)
//! - X: `multiplier` (position growth per escalation, X >= 1)
//! - R: `cooldown` (waiting steps after the cap is hit)
//! - L: `streak_limit` (matches before the trial stops)
//! - B: `max_attempts` (hard cap on trades per trial)

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::ReawakenRule;

use super::Trigger;

/// Invalid configuration, rejected before any trial runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("multiplier must be finite and >= 1 (got {0})")]
    InvalidMultiplier(f64),
    #[error("initial balance must be finite and > 0 (got {0})")]
    InvalidBalance(f64),
    #[error("initial position must be finite and > 0 (got {0})")]
    InvalidPosition(f64),
    #[error("kelly fraction must be finite and >= 0 (got {0})")]
    InvalidFraction(f64),
    #[error("kelly fraction is undefined for this return model; set it explicitly")]
    KellyUndefined,
    #[error("{name} must be at least 1")]
    ZeroCount { name: &'static str },
    #[error("invalid return model: {0}")]
    InvalidReturnModel(String),
}

/// How a cooldown-reborn trial spends its cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebornMode {
    /// The trial itself sits out the waiting steps.
    #[default]
    Wait,
    /// A fresh trial trades while the cooled one waits on a stack; the cooled
    /// trial resumes once the fresh one finishes and its cooldown has expired.
    ResumeParent,
    /// A fresh trial takes over; cooled trials tick in a queue and are dropped
    /// when their cooldown expires.
    DiscardCooled,
}

/// Position-sizing rule for one trial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Escalate on each match, stop on a mismatch or after `streak_limit` matches.
    BoundedStreak {
        max_escalations: u32,
        /// Defaults to `max_escalations`.
        #[serde(default)]
        streak_limit: Option<u32>,
        multiplier: f64,
        #[serde(default)]
        trigger: Trigger,
    },
    /// Escalate on each match; after `max_escalations` consecutive matches
    /// cool down for `cooldown` steps and restart from the initial position.
    CooldownReborn {
        max_escalations: u32,
        multiplier: f64,
        cooldown: u32,
        streak_limit: u32,
        #[serde(default)]
        trigger: Trigger,
        #[serde(default)]
        reawaken: ReawakenRule,
        #[serde(default)]
        mode: RebornMode,
    },
    /// Escalate on consecutive matches, stop once the streak exceeds
    /// `max_escalations`. A mismatch resets the streak (and the position when
    /// `reset_position` is set).
    StreakReset {
        max_escalations: u32,
        multiplier: f64,
        #[serde(default)]
        trigger: Trigger,
        #[serde(default = "default_true")]
        reset_position: bool,
    },
    /// Streak-with-reset capped at `max_attempts` trades.
    BoundedAttempts {
        max_escalations: u32,
        max_attempts: u32,
        multiplier: f64,
        #[serde(default)]
        trigger: Trigger,
    },
    /// Escalate on every match until the balance recovers past its start.
    /// Unbounded: only the driver's step ceiling stops a losing run.
    EscalateUntilRecovery {
        multiplier: f64,
        #[serde(default)]
        trigger: Trigger,
    },
    /// Multiplier looked up by consecutive match count (`multipliers[0]`
    /// applies after the first match), `default_multiplier` beyond the table.
    Tiered {
        multipliers: Vec<f64>,
        default_multiplier: f64,
        #[serde(default)]
        trigger: Trigger,
    },
    /// Constant position for a fixed number of trades. Without an explicit
    /// fraction the position is the return model's Kelly estimate.
    Kelly {
        trades: u32,
        #[serde(default)]
        fraction: Option<f64>,
    },
}

fn default_true() -> bool {
    true
}

impl PolicyConfig {
    /// Short name for logs and labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BoundedStreak { .. } => "bounded_streak",
            Self::CooldownReborn { .. } => "cooldown_reborn",
            Self::StreakReset { .. } => "streak_reset",
            Self::BoundedAttempts { .. } => "bounded_attempts",
            Self::EscalateUntilRecovery { .. } => "escalate_until_recovery",
            Self::Tiered { .. } => "tiered",
            Self::Kelly { .. } => "kelly",
        }
    }

    /// Escalation direction. Kelly sizing never escalates and reports the default.
    pub fn trigger(&self) -> Trigger {
        match self {
            Self::BoundedStreak { trigger, .. }
            | Self::CooldownReborn { trigger, .. }
            | Self::StreakReset { trigger, .. }
            | Self::BoundedAttempts { trigger, .. }
            | Self::EscalateUntilRecovery { trigger, .. }
            | Self::Tiered { trigger, .. } => *trigger,
            Self::Kelly { .. } => Trigger::default(),
        }
    }

    /// True when the rule has no intrinsic bound on trial length.
    pub fn is_unbounded(&self) -> bool {
        matches!(
            self,
            Self::EscalateUntilRecovery { .. } | Self::Tiered { .. } | Self::StreakReset { .. }
        )
    }

    /// Reject degenerate parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::BoundedStreak { multiplier, .. }
            | Self::CooldownReborn { multiplier, .. }
            | Self::StreakReset { multiplier, .. }
            | Self::EscalateUntilRecovery { multiplier, .. } => check_multiplier(*multiplier),
            Self::BoundedAttempts {
                multiplier,
                max_attempts,
                ..
            } => {
                check_multiplier(*multiplier)?;
                if *max_attempts == 0 {
                    return Err(ConfigError::ZeroCount {
                        name: "max_attempts",
                    });
                }
                Ok(())
            }
            Self::Tiered {
                multipliers,
                default_multiplier,
                ..
            } => {
                check_multiplier(*default_multiplier)?;
                multipliers.iter().try_for_each(|m| check_multiplier(*m))
            }
            Self::Kelly { trades, fraction } => {
                if *trades == 0 {
                    return Err(ConfigError::ZeroCount { name: "trades" });
                }
                match fraction {
                    Some(f) => check_fraction(*f),
                    None => Ok(()),
                }
            }
        }
    }
}

fn check_multiplier(x: f64) -> Result<(), ConfigError> {
    if x.is_finite() && x >= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidMultiplier(x))
    }
}

pub(crate) fn check_fraction(f: f64) -> Result<(), ConfigError> {
    if f.is_finite() && f >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidFraction(f))
    }
}
