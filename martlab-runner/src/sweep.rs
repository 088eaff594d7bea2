//! Parameter × seed sweeps.
//!
//! Each sweep value is run under `seeds_per_value` master seeds
//! (`100 * value + i`), and every run is reduced to a [`RunRecord`] filed
//! under the value's label.

use rayon::prelude::*;

use martlab_core::TrialObserver;

use crate::config::{ExperimentConfig, ExperimentError, SweepConfig};
use crate::persistence::{ResultSet, RunRecord};
use crate::runner::{run_with, RunError};

/// One (value, seed) combination.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub label: String,
    pub value: f64,
    pub seed: u64,
}

/// Sweep executor.
///
/// Runs combinations in parallel with rayon when the base simulation is
/// marked `parallel`.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    base: ExperimentConfig,
    sweep: SweepConfig,
}

impl ParamSweep {
    /// Sweep defined in the experiment's `[sweep]` section.
    pub fn from_config(base: &ExperimentConfig) -> Result<Self, ExperimentError> {
        let sweep = base.sweep.clone().ok_or(ExperimentError::EmptySweep)?;
        Self::new(base.clone(), sweep)
    }

    pub fn new(base: ExperimentConfig, sweep: SweepConfig) -> Result<Self, ExperimentError> {
        sweep.validate()?;
        for &value in &sweep.values {
            sweep.parameter.apply(&base.policy, value)?.validate()?;
        }
        Ok(Self { base, sweep })
    }

    /// Every combination in run order: values first, then seeds.
    pub fn points(&self) -> Vec<SweepPoint> {
        self.sweep
            .values
            .iter()
            .flat_map(|&value| {
                (0..self.sweep.seeds_per_value).map(move |i| SweepPoint {
                    label: self.sweep.label_for(value),
                    value,
                    seed: self.sweep.seed_for(value, i),
                })
            })
            .collect()
    }

    /// Runs the sweep.
    pub fn run(&self, observer: &dyn TrialObserver) -> Result<ResultSet, RunError> {
        self.run_with_progress(observer, |_, _, _| {})
    }

    /// Runs the sweep with a progress callback `(index, total, point)`.
    pub fn run_with_progress<F>(
        &self,
        observer: &dyn TrialObserver,
        progress_callback: F,
    ) -> Result<ResultSet, RunError>
    where
        F: Fn(usize, usize, &SweepPoint) + Sync + Send,
    {
        let points = self.points();
        let total = points.len();
        let span = tracing::info_span!(
            "sweep",
            parameter = self.sweep.parameter.name(),
            values = self.sweep.values.len(),
            seeds = self.sweep.seeds_per_value
        );
        let _guard = span.enter();

        let run_point = |(idx, point): (usize, &SweepPoint)| -> Result<RunRecord, RunError> {
            let record = self.run_point(point, observer)?;
            progress_callback(idx, total, point);
            Ok(record)
        };

        let records: Vec<RunRecord> = if self.base.simulation.parallel {
            points
                .par_iter()
                .enumerate()
                .map(run_point)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            points
                .iter()
                .enumerate()
                .map(run_point)
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut results = ResultSet::new();
        for (point, record) in points.into_iter().zip(records) {
            results.entry(point.label).or_default().push(record);
        }
        tracing::info!(labels = results.len(), runs = total, "sweep finished");
        Ok(results)
    }

    fn run_point(
        &self,
        point: &SweepPoint,
        observer: &dyn TrialObserver,
    ) -> Result<RunRecord, RunError> {
        let mut config = self.base.with_seed(point.seed);
        config.policy = self.sweep.parameter.apply(&self.base.policy, point.value)?;
        let simulation = config.simulation()?;
        let policy = config.policy()?;
        let result = run_with(
            &simulation,
            &policy,
            &config.returns,
            config.return_mode,
            observer,
        )?;
        tracing::debug!(label = %point.label, seed = point.seed, trades = result.run.trade_count(), "sweep point");
        Ok(result.record())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use martlab_core::NullObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn base(parallel: bool) -> ExperimentConfig {
        ExperimentConfig::from_toml(&format!(
            r#"
[simulation]
initial_balance = 1000.0
initial_position = 0.01
trials = 30
parallel = {parallel}

[policy]
type = "cooldown_reborn"
max_escalations = 2
multiplier = 2.0
cooldown = 3
streak_limit = 4

[sweep]
parameter = "streak_limit"
values = [3, 4]
seeds_per_value = 3
"#
        ))
        .unwrap()
    }

    #[test]
    fn points_follow_seed_rule() {
        let sweep = ParamSweep::from_config(&base(false)).unwrap();
        let seeds: Vec<u64> = sweep.points().iter().map(|p| p.seed).collect();
        assert_eq!(seeds, vec![300, 301, 302, 400, 401, 402]);
        assert_eq!(sweep.points()[3].label, "streak_limit=4");
    }

    #[test]
    fn sweep_groups_records_by_label() {
        let sweep = ParamSweep::from_config(&base(false)).unwrap();
        let results = sweep.run(&NullObserver).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["streak_limit=3"].len(), 3);
        assert_eq!(results["streak_limit=4"].len(), 3);
    }

    #[test]
    fn parallel_sweep_matches_sequential() {
        let seq = ParamSweep::from_config(&base(false)).unwrap().run(&NullObserver).unwrap();
        let par = ParamSweep::from_config(&base(true)).unwrap().run(&NullObserver).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn progress_called_for_every_point() {
        let sweep = ParamSweep::from_config(&base(true)).unwrap();
        let calls = AtomicUsize::new(0);
        sweep
            .run_with_progress(&NullObserver, |_, total, _| {
                assert_eq!(total, 6);
                calls.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn missing_sweep_section_rejected() {
        let mut config = base(false);
        config.sweep = None;
        assert!(matches!(
            ParamSweep::from_config(&config),
            Err(ExperimentError::EmptySweep)
        ));
    }
}
