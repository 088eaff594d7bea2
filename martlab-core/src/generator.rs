//! Return generators — per-trade return samples.
//!
//! A generator produces one return per call. The Bernoulli model is the
//! workhorse: win with probability `p`, lose otherwise, both magnitudes
//! scaled by a unit factor (0.01 expresses percent). Sequence replay exists
//! so tests can pin exact outcomes.

use std::collections::VecDeque;

use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::ConfigError;

/// Default unit factor: returns are configured in percent.
pub const PERCENT: f64 = 0.01;

/// Errors raised while drawing a sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("return sequence exhausted after {consumed} samples")]
    Exhausted { consumed: usize },
}

/// Source of per-trade returns.
pub trait ReturnGenerator: Send {
    /// Draw the next return (already scaled by the unit factor).
    fn sample(&mut self) -> Result<f64, SampleError>;
}

impl<G: ReturnGenerator + ?Sized> ReturnGenerator for Box<G> {
    fn sample(&mut self) -> Result<f64, SampleError> {
        (**self).sample()
    }
}

// ─── Bernoulli ───────────────────────────────────────────────────────

/// Two-outcome return distribution.
#[derive(Debug, Clone)]
pub struct BernoulliReturns<R = StdRng> {
    outcome: Bernoulli,
    win_return: f64,
    loss_return: f64,
    unit: f64,
    rng: R,
}

impl BernoulliReturns<StdRng> {
    /// Seeded generator.
    pub fn from_seed(
        win_rate: f64,
        win_return: f64,
        loss_return: f64,
        unit: f64,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::with_rng(
            win_rate,
            win_return,
            loss_return,
            unit,
            StdRng::seed_from_u64(seed),
        )
    }
}

impl<R: Rng + Send> BernoulliReturns<R> {
    /// Generator driven by an injected RNG.
    pub fn with_rng(
        win_rate: f64,
        win_return: f64,
        loss_return: f64,
        unit: f64,
        rng: R,
    ) -> Result<Self, ConfigError> {
        let outcome = Bernoulli::new(win_rate)
            .map_err(|_| ConfigError::InvalidReturnModel(format!("win rate {win_rate} not in [0, 1]")))?;
        if !win_return.is_finite() || !loss_return.is_finite() || !unit.is_finite() {
            return Err(ConfigError::InvalidReturnModel(
                "win/loss returns and unit must be finite".into(),
            ));
        }
        Ok(Self {
            outcome,
            win_return,
            loss_return,
            unit,
            rng,
        })
    }
}

impl<R: Rng + Send> ReturnGenerator for BernoulliReturns<R> {
    fn sample(&mut self) -> Result<f64, SampleError> {
        let r = if self.outcome.sample(&mut self.rng) {
            self.win_return
        } else {
            self.loss_return
        };
        Ok(r * self.unit)
    }
}

// ─── Uniform ─────────────────────────────────────────────────────────

/// Continuous returns drawn uniformly from `[low, high)`.
#[derive(Debug, Clone)]
pub struct UniformReturns<R = StdRng> {
    low: f64,
    high: f64,
    unit: f64,
    rng: R,
}

impl UniformReturns<StdRng> {
    pub fn from_seed(low: f64, high: f64, unit: f64, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(low, high, unit, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> UniformReturns<R> {
    pub fn with_rng(low: f64, high: f64, unit: f64, rng: R) -> Result<Self, ConfigError> {
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(ConfigError::InvalidReturnModel(format!(
                "uniform range [{low}, {high}) is empty or not finite"
            )));
        }
        Ok(Self {
            low,
            high,
            unit,
            rng,
        })
    }
}

impl<R: Rng + Send> ReturnGenerator for UniformReturns<R> {
    fn sample(&mut self) -> Result<f64, SampleError> {
        Ok(self.rng.gen_range(self.low..self.high) * self.unit)
    }
}

// ─── Sequence replay ─────────────────────────────────────────────────

/// Replays a recorded sequence of returns (already unit-scaled).
#[derive(Debug, Clone)]
pub struct SequenceReturns {
    pending: VecDeque<f64>,
    recorded: Vec<f64>,
    cycle: bool,
    consumed: usize,
}

impl SequenceReturns {
    /// Replay once; sampling past the end fails with [`SampleError::Exhausted`].
    pub fn once(values: impl Into<Vec<f64>>) -> Self {
        let recorded = values.into();
        Self {
            pending: recorded.iter().copied().collect(),
            recorded,
            cycle: false,
            consumed: 0,
        }
    }

    /// Replay forever. An empty sequence still fails on first use.
    pub fn cycle(values: impl Into<Vec<f64>>) -> Self {
        Self {
            cycle: true,
            ..Self::once(values)
        }
    }

    /// Constant return on every draw.
    pub fn constant(value: f64) -> Self {
        Self::cycle(vec![value])
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl ReturnGenerator for SequenceReturns {
    fn sample(&mut self) -> Result<f64, SampleError> {
        if self.pending.is_empty() && self.cycle {
            self.pending.extend(self.recorded.iter().copied());
        }
        match self.pending.pop_front() {
            Some(v) => {
                self.consumed += 1;
                Ok(v)
            }
            None => Err(SampleError::Exhausted {
                consumed: self.consumed,
            }),
        }
    }
}

// ─── Serializable model ──────────────────────────────────────────────

/// Serializable description of a return generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReturnModel {
    /// Win `win_return` with probability `win_rate`, else `loss_return`.
    Bernoulli {
        win_rate: f64,
        win_return: f64,
        loss_return: f64,
        #[serde(default = "default_unit")]
        unit: f64,
    },
    /// Uniform on `[low, high)`.
    Uniform {
        low: f64,
        high: f64,
        #[serde(default = "default_unit")]
        unit: f64,
    },
    /// Fixed replay, cycling when `repeat` is set.
    Sequence {
        values: Vec<f64>,
        #[serde(default)]
        repeat: bool,
    },
}

fn default_unit() -> f64 {
    PERCENT
}

impl Default for ReturnModel {
    fn default() -> Self {
        Self::Bernoulli {
            win_rate: 0.5,
            win_return: 1.0,
            loss_return: -1.0,
            unit: PERCENT,
        }
    }
}

impl ReturnModel {
    /// Check parameters without building a generator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Bernoulli { .. } | Self::Uniform { .. } => self.build(0).map(|_| ()),
            Self::Sequence { values, .. } => {
                if values.is_empty() {
                    return Err(ConfigError::InvalidReturnModel(
                        "return sequence is empty".into(),
                    ));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(ConfigError::InvalidReturnModel(
                        "return sequence contains a non-finite value".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Build a generator seeded with `seed`. Sequences ignore the seed.
    pub fn build(&self, seed: u64) -> Result<Box<dyn ReturnGenerator>, ConfigError> {
        Ok(match self {
            Self::Bernoulli {
                win_rate,
                win_return,
                loss_return,
                unit,
            } => Box::new(BernoulliReturns::from_seed(
                *win_rate,
                *win_return,
                *loss_return,
                *unit,
                seed,
            )?),
            Self::Uniform { low, high, unit } => {
                Box::new(UniformReturns::from_seed(*low, *high, *unit, seed)?)
            }
            Self::Sequence { values, repeat } => {
                if *repeat {
                    Box::new(SequenceReturns::cycle(values.clone()))
                } else {
                    Box::new(SequenceReturns::once(values.clone()))
                }
            }
        })
    }

    /// Closed-form Kelly estimate `p + loss * (1 - p) / win`.
    ///
    /// Only defined for the Bernoulli model with a positive win return.
    pub fn kelly_fraction(&self) -> Option<f64> {
        match self {
            Self::Bernoulli {
                win_rate,
                win_return,
                loss_return,
                ..
            } if *win_return > 0.0 => Some(kelly_fraction(*win_rate, *win_return, *loss_return)),
            _ => None,
        }
    }
}

/// Kelly fraction for a two-outcome bet. `loss_return` is negative.
pub fn kelly_fraction(win_rate: f64, win_return: f64, loss_return: f64) -> f64 {
    win_rate + loss_return * (1.0 - win_rate) / win_return
}
