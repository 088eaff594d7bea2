//! Criterion benchmarks for the simulation hot paths.
//!
//! Benchmarks:
//! 1. Sequential seeded runs for each policy family
//! 2. Parallel vs sequential scaling over trial counts
//! 3. Performance summary over a long balance series

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use martlab_core::performance::{summarize, ReturnMode};
use martlab_core::policy::{PolicyConfig, RebornMode, Trigger};
use martlab_core::{NullObserver, ReawakenRule, ReturnModel, Simulation, SimulationConfig};

// ── Helpers ──────────────────────────────────────────────────────────

fn simulation(trials: usize, parallel: bool) -> Simulation {
    Simulation::new(SimulationConfig {
        initial_balance: 10_000.0,
        initial_position: 0.002,
        trials,
        batch_size: 100,
        max_steps_per_trial: 1_000_000,
        seed: 42,
        parallel,
    })
    .unwrap()
}

fn policies() -> Vec<PolicyConfig> {
    vec![
        PolicyConfig::BoundedStreak {
            max_escalations: 5,
            streak_limit: None,
            multiplier: 2.0,
            trigger: Trigger::FavorLosses,
        },
        PolicyConfig::CooldownReborn {
            max_escalations: 5,
            multiplier: 2.0,
            cooldown: 50,
            streak_limit: 10,
            trigger: Trigger::FavorLosses,
            reawaken: ReawakenRule::AwaitPositiveTick,
            mode: RebornMode::Wait,
        },
        PolicyConfig::CooldownReborn {
            max_escalations: 5,
            multiplier: 2.0,
            cooldown: 50,
            streak_limit: 10,
            trigger: Trigger::FavorLosses,
            reawaken: ReawakenRule::Immediate,
            mode: RebornMode::ResumeParent,
        },
        PolicyConfig::BoundedAttempts {
            max_escalations: 5,
            max_attempts: 100,
            multiplier: 2.0,
            trigger: Trigger::FavorLosses,
        },
        PolicyConfig::Tiered {
            multipliers: vec![1.1, 1.1, 11.0],
            default_multiplier: 3.0,
            trigger: Trigger::FavorLosses,
        },
    ]
}

// ── 1. Policy families ───────────────────────────────────────────────

fn bench_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_run");
    let sim = simulation(1000, false);
    let model = ReturnModel::default();

    for config in policies() {
        let policy = sim.policy(config, &model).unwrap();
        let label = match policy.config() {
            PolicyConfig::CooldownReborn { mode, .. } => format!("{}_{mode:?}", policy.name()),
            _ => policy.name().to_string(),
        };
        group.bench_function(label, |b| {
            b.iter(|| {
                sim.run_seeded(black_box(&policy), &model, &NullObserver)
                    .unwrap()
            })
        });
    }
    group.finish();
}

// ── 2. Scaling ───────────────────────────────────────────────────────

fn bench_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial_scaling");
    let model = ReturnModel::default();

    for &trials in &[1_000usize, 10_000] {
        for parallel in [false, true] {
            let sim = simulation(trials, parallel);
            let policy = sim.policy(policies().remove(0), &model).unwrap();
            let id = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(id, trials), &trials, |b, _| {
                b.iter(|| sim.run_seeded(&policy, &model, &NullObserver).unwrap())
            });
        }
    }
    group.finish();
}

// ── 3. Performance summary ───────────────────────────────────────────

fn bench_summary(c: &mut Criterion) {
    let balances: Vec<f64> = (0..100_000)
        .map(|i| 10_000.0 + (i as f64 * 0.01).sin() * 500.0)
        .collect();
    c.bench_function("summarize_100k", |b| {
        b.iter(|| summarize(black_box(&balances), ReturnMode::Percentage))
    });
}

criterion_group!(benches, bench_policies, bench_scaling, bench_summary);
criterion_main!(benches);
