//! Experiment configuration — one TOML file per experiment.
//!
//! ```toml
//! [simulation]
//! initial_balance = 10000.0
//! initial_position = 0.002
//! trials = 10000
//!
//! [returns]
//! type = "bernoulli"
//! win_rate = 0.5
//! win_return = 1.0
//! loss_return = -1.0
//!
//! [policy]
//! type = "bounded_streak"
//! max_escalations = 5
//! multiplier = 2.0
//!
//! [sweep]
//! parameter = "max_escalations"
//! values = [3, 4, 5]
//! seeds_per_value = 20
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use martlab_core::policy::{ConfigError, Policy, PolicyConfig};
use martlab_core::{ReturnMode, ReturnModel, Simulation, SimulationConfig};

/// Errors loading or validating an experiment file.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse experiment TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error("policy '{policy}' has no parameter '{parameter}'")]
    UnsupportedParameter {
        parameter: &'static str,
        policy: &'static str,
    },
    #[error("sweep value {value} is not valid for '{parameter}'")]
    InvalidSweepValue { parameter: &'static str, value: f64 },
    #[error("sweep needs at least one value and one seed per value")]
    EmptySweep,
}

/// A full experiment: driver, market and policy, plus an optional sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// How step returns are computed for the summaries.
    #[serde(default)]
    pub return_mode: ReturnMode,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub returns: ReturnModel,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub sweep: Option<SweepConfig>,
}

impl ExperimentConfig {
    /// Load and validate an experiment from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ExperimentError> {
        let content = std::fs::read_to_string(path).map_err(|source| ExperimentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate an experiment from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ExperimentError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExperimentError> {
        self.simulation.validate()?;
        self.returns.validate()?;
        self.policy()?;
        if let Some(sweep) = &self.sweep {
            sweep.validate()?;
            for &value in &sweep.values {
                sweep.parameter.apply(&self.policy, value)?.validate()?;
            }
        }
        Ok(())
    }

    pub fn simulation(&self) -> Result<Simulation, ConfigError> {
        Simulation::new(self.simulation.clone())
    }

    /// The bound policy; Kelly fractions default to the return model's estimate.
    pub fn policy(&self) -> Result<Policy, ConfigError> {
        Policy::for_returns(
            self.policy.clone(),
            self.simulation.initial_balance,
            self.simulation.initial_position,
            &self.returns,
        )
    }

    /// Label used for artifacts and result sets.
    pub fn label(&self) -> String {
        self.policy.name().to_string()
    }

    /// Copy with a different master seed.
    pub fn with_seed(&self, seed: u64) -> Self {
        let mut config = self.clone();
        config.simulation.seed = seed;
        config
    }
}

/// Parameter × seed sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub parameter: SweepParameter,
    pub values: Vec<f64>,
    #[serde(default = "default_seeds_per_value")]
    pub seeds_per_value: usize,
}

fn default_seeds_per_value() -> usize {
    20
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.values.is_empty() || self.seeds_per_value == 0 {
            return Err(ExperimentError::EmptySweep);
        }
        Ok(())
    }

    /// Seed for run `index` at `value`: `100 * value + index`.
    pub fn seed_for(&self, value: f64, index: usize) -> u64 {
        (100.0 * value).round().max(0.0) as u64 + index as u64
    }

    /// Result-set label, e.g. `streak_limit=15`.
    pub fn label_for(&self, value: f64) -> String {
        format!("{}={}", self.parameter.name(), value)
    }
}

/// Policy parameter a sweep can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepParameter {
    MaxEscalations,
    StreakLimit,
    Cooldown,
    Multiplier,
    MaxAttempts,
}

impl SweepParameter {
    pub fn name(self) -> &'static str {
        match self {
            Self::MaxEscalations => "max_escalations",
            Self::StreakLimit => "streak_limit",
            Self::Cooldown => "cooldown",
            Self::Multiplier => "multiplier",
            Self::MaxAttempts => "max_attempts",
        }
    }

    /// Copy of `policy` with this parameter set to `value`.
    pub fn apply(self, policy: &PolicyConfig, value: f64) -> Result<PolicyConfig, ExperimentError> {
        let mut out = policy.clone();
        let unsupported = || ExperimentError::UnsupportedParameter {
            parameter: self.name(),
            policy: policy.name(),
        };

        if self == Self::Multiplier {
            match &mut out {
                PolicyConfig::BoundedStreak { multiplier, .. }
                | PolicyConfig::CooldownReborn { multiplier, .. }
                | PolicyConfig::StreakReset { multiplier, .. }
                | PolicyConfig::BoundedAttempts { multiplier, .. }
                | PolicyConfig::EscalateUntilRecovery { multiplier, .. } => *multiplier = value,
                PolicyConfig::Tiered {
                    default_multiplier, ..
                } => *default_multiplier = value,
                PolicyConfig::Kelly { .. } => return Err(unsupported()),
            }
            return Ok(out);
        }

        let count = as_count(self.name(), value)?;
        match (self, &mut out) {
            (Self::MaxEscalations, PolicyConfig::BoundedStreak { max_escalations, .. })
            | (Self::MaxEscalations, PolicyConfig::CooldownReborn { max_escalations, .. })
            | (Self::MaxEscalations, PolicyConfig::StreakReset { max_escalations, .. })
            | (Self::MaxEscalations, PolicyConfig::BoundedAttempts { max_escalations, .. }) => {
                *max_escalations = count
            }
            (Self::StreakLimit, PolicyConfig::BoundedStreak { streak_limit, .. }) => {
                *streak_limit = Some(count)
            }
            (Self::StreakLimit, PolicyConfig::CooldownReborn { streak_limit, .. }) => {
                *streak_limit = count
            }
            (Self::Cooldown, PolicyConfig::CooldownReborn { cooldown, .. }) => *cooldown = count,
            (Self::MaxAttempts, PolicyConfig::BoundedAttempts { max_attempts, .. }) => {
                *max_attempts = count
            }
            _ => return Err(unsupported()),
        }
        Ok(out)
    }
}

fn as_count(parameter: &'static str, value: f64) -> Result<u32, ExperimentError> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) {
        Ok(value as u32)
    } else {
        Err(ExperimentError::InvalidSweepValue { parameter, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use martlab_core::policy::{RebornMode, Trigger};
    use martlab_core::ReawakenRule;

    const FULL: &str = r#"
return_mode = "percentage"

[simulation]
initial_balance = 10000.0
initial_position = 0.002
trials = 10000
batch_size = 100
max_steps_per_trial = 1000000
seed = 42
parallel = true

[returns]
type = "bernoulli"
win_rate = 0.5
win_return = 1.0
loss_return = -1.0
unit = 0.01

[policy]
type = "cooldown_reborn"
max_escalations = 5
multiplier = 2.0
cooldown = 50
streak_limit = 10
trigger = "favor_losses"
reawaken = "await_positive_tick"
mode = "resume_parent"

[sweep]
parameter = "streak_limit"
values = [15, 16, 17]
seeds_per_value = 20
"#;

    #[test]
    fn parses_full_experiment() {
        let config = ExperimentConfig::from_toml(FULL).unwrap();
        assert_eq!(config.return_mode, ReturnMode::Percentage);
        assert_eq!(config.simulation.trials, 10_000);
        assert!(config.simulation.parallel);
        assert_eq!(
            config.policy,
            PolicyConfig::CooldownReborn {
                max_escalations: 5,
                multiplier: 2.0,
                cooldown: 50,
                streak_limit: 10,
                trigger: Trigger::FavorLosses,
                reawaken: ReawakenRule::AwaitPositiveTick,
                mode: RebornMode::ResumeParent,
            }
        );
        let sweep = config.sweep.unwrap();
        assert_eq!(sweep.parameter, SweepParameter::StreakLimit);
        assert_eq!(sweep.values, vec![15.0, 16.0, 17.0]);
        assert_eq!(sweep.seed_for(15.0, 3), 1503);
        assert_eq!(sweep.label_for(15.0), "streak_limit=15");
    }

    #[test]
    fn minimal_experiment_uses_defaults() {
        let toml = r#"
[simulation]
initial_balance = 100.0
initial_position = 0.1
trials = 10

[policy]
type = "kelly"
trades = 50
"#;
        let config = ExperimentConfig::from_toml(toml).unwrap();
        assert_eq!(config.returns, ReturnModel::default());
        assert_eq!(config.simulation.batch_size, 100);
        assert!(config.sweep.is_none());
        // fair coin: Kelly estimate is zero
        assert_eq!(config.policy().unwrap().initial_position(), 0.0);
    }

    #[test]
    fn negative_count_is_a_parse_error() {
        let toml = r#"
[simulation]
initial_balance = 100.0
initial_position = 0.1
trials = 10

[policy]
type = "bounded_streak"
max_escalations = -1
multiplier = 2.0
"#;
        assert!(matches!(
            ExperimentConfig::from_toml(toml),
            Err(ExperimentError::Parse(_))
        ));
    }

    #[test]
    fn invalid_multiplier_rejected() {
        let toml = r#"
[simulation]
initial_balance = 100.0
initial_position = 0.1
trials = 10

[policy]
type = "escalate_until_recovery"
multiplier = 0.5
"#;
        assert!(matches!(
            ExperimentConfig::from_toml(toml),
            Err(ExperimentError::Invalid(ConfigError::InvalidMultiplier(_)))
        ));
    }

    #[test]
    fn sweep_parameter_must_exist_on_policy() {
        let policy = PolicyConfig::Kelly {
            trades: 10,
            fraction: Some(0.1),
        };
        assert!(matches!(
            SweepParameter::Cooldown.apply(&policy, 5.0),
            Err(ExperimentError::UnsupportedParameter { .. })
        ));
    }

    #[test]
    fn sweep_counts_must_be_whole() {
        let policy = PolicyConfig::BoundedAttempts {
            max_escalations: 3,
            max_attempts: 10,
            multiplier: 2.0,
            trigger: Trigger::FavorLosses,
        };
        assert!(matches!(
            SweepParameter::MaxAttempts.apply(&policy, 2.5),
            Err(ExperimentError::InvalidSweepValue { .. })
        ));
        let applied = SweepParameter::MaxAttempts.apply(&policy, 20.0).unwrap();
        assert!(matches!(
            applied,
            PolicyConfig::BoundedAttempts {
                max_attempts: 20,
                ..
            }
        ));
    }

    #[test]
    fn sweep_multiplier_applies_to_tiered_default() {
        let policy = PolicyConfig::Tiered {
            multipliers: vec![1.1],
            default_multiplier: 3.0,
            trigger: Trigger::FavorLosses,
        };
        let applied = SweepParameter::Multiplier.apply(&policy, 4.0).unwrap();
        assert!(matches!(
            applied,
            PolicyConfig::Tiered {
                default_multiplier,
                ..
            } if default_multiplier == 4.0
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ExperimentConfig::from_file(Path::new("/nonexistent/experiment.toml"))
            .unwrap_err();
        assert!(matches!(err, ExperimentError::Io { .. }));
    }
}
