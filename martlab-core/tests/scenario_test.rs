//! End-to-end scenarios through the public driver API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use martlab_core::generator::SequenceReturns;
use martlab_core::policy::{PolicyConfig, RebornMode, StepOutcome, Trigger};
use martlab_core::{
    NullObserver, ReawakenRule, ReturnMode, ReturnModel, SimError, Simulation, SimulationConfig,
    TrialError, TrialObserver,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn simulation(trials: usize) -> Simulation {
    Simulation::new(SimulationConfig {
        initial_balance: 100.0,
        initial_position: 0.2,
        trials,
        batch_size: 3,
        max_steps_per_trial: 10_000,
        seed: 42,
        parallel: false,
    })
    .unwrap()
}

fn cooldown_reborn(mode: RebornMode) -> PolicyConfig {
    PolicyConfig::CooldownReborn {
        max_escalations: 2,
        multiplier: 2.0,
        cooldown: 2,
        streak_limit: 4,
        trigger: Trigger::FavorLosses,
        reawaken: ReawakenRule::Immediate,
        mode,
    }
}

#[derive(Default)]
struct Counting {
    trades: AtomicUsize,
    waits: AtomicUsize,
    ends: Mutex<Vec<usize>>,
}

impl TrialObserver for Counting {
    fn on_trade(&self, _trial: usize, _pnl: f64, _position: f64, _balance: f64) {
        self.trades.fetch_add(1, Ordering::Relaxed);
    }

    fn on_waiting(&self, _trial: usize, _remaining: u32) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    fn on_trial_end(&self, trial: usize, _trades: usize, _total: f64) {
        self.ends.lock().unwrap().push(trial);
    }
}

// ── Spec scenarios ───────────────────────────────────────────────────

#[test]
fn constant_loss_bounded_streak_matches_hand_computation() {
    // GIVEN a -2% market and a bounded streak of three doublings
    let sim = simulation(1);
    let policy = sim
        .policy(
            PolicyConfig::BoundedStreak {
                max_escalations: 3,
                streak_limit: None,
                multiplier: 2.0,
                trigger: Trigger::FavorLosses,
            },
            &ReturnModel::default(),
        )
        .unwrap();

    // WHEN the trial runs
    let mut gen = SequenceReturns::constant(-0.02);
    let run = sim.run(&policy, &mut gen, &NullObserver).unwrap();

    // THEN it loses 0.4, 0.8, 1.6 and stops at 97.2
    let pnl = &run.per_trade_pnl[0];
    let expected = [-0.4, -0.8, -1.6];
    assert_eq!(pnl.len(), 3);
    for (a, e) in pnl.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9);
    }
    assert!((run.per_trade_balances()[3] - 97.2).abs() < 1e-9);
}

#[test]
fn constant_win_with_loss_trigger_is_one_trade_per_trial() {
    let sim = simulation(5);
    let policy = sim
        .policy(
            PolicyConfig::BoundedStreak {
                max_escalations: 5,
                streak_limit: None,
                multiplier: 2.0,
                trigger: Trigger::FavorLosses,
            },
            &ReturnModel::default(),
        )
        .unwrap();
    let mut gen = SequenceReturns::constant(0.02);
    let run = sim.run(&policy, &mut gen, &NullObserver).unwrap();
    assert_eq!(run.trade_count(), 5);
    assert!(run.per_trade_pnl.iter().all(|p| p.len() == 1));
}

#[test]
fn cooldown_pauses_then_resumes() {
    let sim = simulation(1);
    let policy = sim
        .policy(cooldown_reborn(RebornMode::Wait), &ReturnModel::default())
        .unwrap();
    let mut game = policy.new_game();

    let outcomes: Vec<StepOutcome> = (0..5).map(|_| game.step(-0.02).unwrap()).collect();
    assert!(matches!(outcomes[1], StepOutcome::Traded { .. }));
    assert_eq!(outcomes[2], StepOutcome::Waiting { remaining: 1 });
    assert_eq!(outcomes[3], StepOutcome::Waiting { remaining: 0 });
    assert!(matches!(outcomes[4], StepOutcome::Traded { .. }));
}

// ── Observers ────────────────────────────────────────────────────────

#[test]
fn observer_sees_every_trade_and_wait() {
    let sim = simulation(3);
    let policy = sim
        .policy(cooldown_reborn(RebornMode::Wait), &ReturnModel::default())
        .unwrap();
    let observer = Counting::default();
    let mut gen = SequenceReturns::constant(-0.02);
    let run = sim.run(&policy, &mut gen, &observer).unwrap();

    assert_eq!(observer.trades.load(Ordering::Relaxed), run.trade_count());
    assert_eq!(observer.waits.load(Ordering::Relaxed), run.total_waiting_steps());
    assert_eq!(*observer.ends.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn observer_is_shared_across_parallel_trials() {
    let mut config = simulation(1).config().clone();
    config.trials = 200;
    config.parallel = true;
    let sim = Simulation::new(config).unwrap();
    let model = ReturnModel::default();
    let policy = sim
        .policy(cooldown_reborn(RebornMode::Wait), &model)
        .unwrap();
    let observer = Counting::default();
    let run = sim.run_seeded(&policy, &model, &observer).unwrap();

    assert_eq!(observer.trades.load(Ordering::Relaxed), run.trade_count());
    let mut ends = observer.ends.lock().unwrap().clone();
    ends.sort_unstable();
    assert_eq!(ends, (0..200).collect::<Vec<_>>());
}

// ── Pooled cooldown ──────────────────────────────────────────────────

#[test]
fn pooled_modes_terminate_on_random_markets() {
    for mode in [RebornMode::ResumeParent, RebornMode::DiscardCooled] {
        let sim = simulation(50);
        let model = ReturnModel::default();
        let policy = sim.policy(cooldown_reborn(mode), &model).unwrap();
        let run = sim.run_seeded(&policy, &model, &NullObserver).unwrap();
        assert_eq!(run.trial_count(), 50);
        assert!(run.per_trade_pnl.iter().all(|p| !p.is_empty()));
        // pooled games never sit out a step themselves
        assert_eq!(run.total_waiting_steps(), 0);
    }
}

// ── Kelly ────────────────────────────────────────────────────────────

#[test]
fn kelly_position_comes_from_model() {
    let sim = simulation(4);
    let model = ReturnModel::Bernoulli {
        win_rate: 0.52,
        win_return: 1.5,
        loss_return: -1.0,
        unit: 0.01,
    };
    let policy = sim
        .policy(
            PolicyConfig::Kelly {
                trades: 10,
                fraction: None,
            },
            &model,
        )
        .unwrap();
    assert!((policy.initial_position() - 0.2).abs() < 1e-12);

    let run = sim.run_seeded(&policy, &model, &NullObserver).unwrap();
    assert_eq!(run.trade_count(), 40);
    for pnl in run.per_trade_pnl.iter().flatten() {
        // 100 * 0.2 * (+1.5% | -1%)
        assert!((pnl - 0.3).abs() < 1e-9 || (pnl + 0.2).abs() < 1e-9, "{pnl}");
    }
}

// ── Errors ───────────────────────────────────────────────────────────

#[test]
fn invalid_return_model_is_a_config_error() {
    let sim = simulation(1);
    let policy = sim
        .policy(cooldown_reborn(RebornMode::Wait), &ReturnModel::default())
        .unwrap();
    let model = ReturnModel::Bernoulli {
        win_rate: 1.5,
        win_return: 1.0,
        loss_return: -1.0,
        unit: 0.01,
    };
    assert!(matches!(
        sim.run_seeded(&policy, &model, &NullObserver),
        Err(SimError::Config(_))
    ));
}

#[test]
fn escalate_until_recovery_hits_ceiling_in_falling_market() {
    let mut config = simulation(1).config().clone();
    config.max_steps_per_trial = 25;
    let sim = Simulation::new(config).unwrap();
    let policy = sim
        .policy(
            PolicyConfig::EscalateUntilRecovery {
                multiplier: 2.0,
                trigger: Trigger::FavorLosses,
            },
            &ReturnModel::default(),
        )
        .unwrap();
    let mut gen = SequenceReturns::constant(-0.01);
    let err = sim.run(&policy, &mut gen, &NullObserver).unwrap_err();
    assert!(matches!(
        err,
        SimError::Trial {
            source: TrialError::NonTerminating { steps: 25 },
            ..
        }
    ));
}

// ── Report ───────────────────────────────────────────────────────────

#[test]
fn report_covers_three_series() {
    let sim = simulation(30);
    let model = ReturnModel::default();
    let policy = sim
        .policy(
            PolicyConfig::StreakReset {
                max_escalations: 3,
                multiplier: 2.0,
                trigger: Trigger::FavorLosses,
                reset_position: true,
            },
            &model,
        )
        .unwrap();
    let run = sim.run_seeded(&policy, &model, &NullObserver).unwrap();
    let report = run.report(ReturnMode::Arithmetic);

    assert_eq!(report.per_trade.drawdown.len(), run.trade_count() + 1);
    assert_eq!(report.per_trial.drawdown.len(), 31);
    assert_eq!(report.per_batch.drawdown.len(), run.trade_count() / 3 + 1);
    assert_eq!(report.trade_count, run.trade_count());
}
