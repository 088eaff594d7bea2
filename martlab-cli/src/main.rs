//! MartLab CLI — run, sweep, compare, ensemble and kelly commands.
//!
//! Commands:
//! - `run` — execute one experiment from a TOML file and save artifacts
//! - `sweep` — run the file's `[sweep]` section and save the result set as JSON
//! - `compare` — average two labels of saved result sets into one CSV
//! - `ensemble` — play several independent strategies and write their curves
//! - `kelly` — print the Kelly fraction for a two-outcome bet

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use martlab_core::generator::kelly_fraction;
use martlab_core::{NullObserver, TracingObserver, TrialObserver};
use martlab_runner::export::{export_curves_csv, export_ensemble_csv};
use martlab_runner::persistence::{self, Series};
use martlab_runner::{
    run_ensemble, run_experiment, save_artifacts, ExperimentConfig, ExperimentResult, ParamSweep,
};

#[derive(Parser)]
#[command(
    name = "martlab",
    about = "MartLab CLI — Monte Carlo lab for martingale position sizing"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one experiment from a TOML config file.
    Run {
        /// Path to the experiment TOML file.
        #[arg(long)]
        config: PathBuf,

        /// Override the master seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Log every trade and waiting step through tracing.
        #[arg(long, default_value_t = false)]
        trace_trials: bool,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Run the config's parameter sweep and save the result set.
    Sweep {
        /// Path to an experiment TOML file with a `[sweep]` section.
        #[arg(long)]
        config: PathBuf,

        /// Result set JSON to write.
        #[arg(long, default_value = "results/sweep.json")]
        out: PathBuf,
    },
    /// Compare the mean curves of two labels from saved result sets.
    Compare {
        /// Result set containing the first label.
        #[arg(long)]
        a: PathBuf,

        /// First label, e.g. `streak_limit=15`.
        #[arg(long)]
        a_label: String,

        /// Result set containing the second label. Defaults to `--a`.
        #[arg(long)]
        b: Option<PathBuf>,

        /// Second label.
        #[arg(long)]
        b_label: String,

        /// Series to average: `balance` or `back`.
        #[arg(long, default_value = "balance")]
        series: String,

        /// CSV file to write.
        #[arg(long, default_value = "results/compare.csv")]
        out: PathBuf,
    },
    /// Play independent strategies and write their balance curves.
    Ensemble {
        /// Path to the experiment TOML file.
        #[arg(long)]
        config: PathBuf,

        /// Number of strategies.
        #[arg(long, default_value_t = 5)]
        strategies: usize,

        /// Trades per strategy curve.
        #[arg(long, default_value_t = 1000)]
        rows: usize,

        /// CSV file to write.
        #[arg(long, default_value = "results/ensemble.csv")]
        out: PathBuf,
    },
    /// Print the Kelly fraction `p + loss * (1 - p) / win`.
    Kelly {
        /// Probability of a win.
        #[arg(long)]
        win_rate: f64,

        /// Return of a win (positive).
        #[arg(long)]
        win_return: f64,

        /// Return of a loss (negative).
        #[arg(long, allow_hyphen_values = true)]
        loss_return: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            seed,
            trace_trials,
            output_dir,
        } => run_experiment_cmd(&config, seed, trace_trials, &output_dir),
        Commands::Sweep { config, out } => run_sweep_cmd(&config, &out),
        Commands::Compare {
            a,
            a_label,
            b,
            b_label,
            series,
            out,
        } => {
            let b = b.unwrap_or_else(|| a.clone());
            run_compare_cmd(&a, &a_label, &b, &b_label, &series, &out)
        }
        Commands::Ensemble {
            config,
            strategies,
            rows,
            out,
        } => run_ensemble_cmd(&config, strategies, rows, &out),
        Commands::Kelly {
            win_rate,
            win_return,
            loss_return,
        } => run_kelly(win_rate, win_return, loss_return),
    }
}

fn run_experiment_cmd(
    config_path: &Path,
    seed: Option<u64>,
    trace_trials: bool,
    output_dir: &Path,
) -> Result<()> {
    let mut config = ExperimentConfig::from_file(config_path)?;
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }

    let observer: &dyn TrialObserver = if trace_trials {
        &TracingObserver
    } else {
        &NullObserver
    };
    let result = run_experiment(&config, observer)?;

    print_summary(&result);

    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    Ok(())
}

fn run_sweep_cmd(config_path: &Path, out: &Path) -> Result<()> {
    let config = ExperimentConfig::from_file(config_path)?;
    let sweep = ParamSweep::from_config(&config)?;

    let results = sweep.run_with_progress(&NullObserver, |idx, total, point| {
        tracing::info!(
            "[{}/{}] {} seed={}",
            idx + 1,
            total,
            point.label,
            point.seed
        );
    })?;

    persistence::save(out, &results)?;
    println!("Sweep saved to: {}", out.display());
    for (label, records) in &results {
        let curve = persistence::mean_curve(records, Series::Balance);
        let last = curve.last().copied().unwrap_or(f64::NAN);
        println!("{label:<24} runs={:<4} mean final balance={last:.4}", records.len());
    }
    Ok(())
}

fn run_compare_cmd(
    a_path: &Path,
    a_label: &str,
    b_path: &Path,
    b_label: &str,
    series: &str,
    out: &Path,
) -> Result<()> {
    let series = match series {
        "balance" => Series::Balance,
        "back" => Series::Back,
        other => bail!("unknown series '{other}'. Valid: balance, back"),
    };

    let a_set = persistence::load(a_path)?;
    let b_set = if b_path == a_path {
        a_set.clone()
    } else {
        persistence::load(b_path)?
    };
    let a = a_set
        .get(a_label)
        .with_context(|| format!("label '{a_label}' not found in {}", a_path.display()))?;
    let b = b_set
        .get(b_label)
        .with_context(|| format!("label '{b_label}' not found in {}", b_path.display()))?;

    let (mean_a, mean_b) = persistence::compare(a, b, series);
    let csv = export_curves_csv(&[a_label, b_label], &[mean_a.as_slice(), mean_b.as_slice()])?;
    write_file(out, &csv)?;
    println!("{} aligned points written to: {}", mean_a.len(), out.display());
    Ok(())
}

fn run_ensemble_cmd(config_path: &Path, strategies: usize, rows: usize, out: &Path) -> Result<()> {
    if strategies == 0 || rows == 0 {
        bail!("--strategies and --rows must be at least 1");
    }
    let config = ExperimentConfig::from_file(config_path)?;
    let ensemble = run_ensemble(&config, strategies, rows, &NullObserver)?;

    write_file(out, &export_ensemble_csv(&ensemble)?)?;

    println!();
    println!("=== Ensemble ===");
    println!("{:<12} {:>14} {:>14}", "Strategy", "Final", "Max DD");
    println!("{}", "-".repeat(42));
    for (i, (curve, summary)) in ensemble.curves.iter().zip(&ensemble.summaries).enumerate() {
        println!(
            "{:<12} {:>14.4} {:>13.2}%",
            format!("strategy{i}"),
            curve.last().copied().unwrap_or(f64::NAN),
            summary.max_drawdown * 100.0
        );
    }
    println!(
        "{:<12} {:>14.4} {:>13.2}%",
        "strategyM",
        ensemble.combined.last().copied().unwrap_or(f64::NAN),
        ensemble.combined_summary.max_drawdown * 100.0
    );
    println!("Curves written to: {}", out.display());
    Ok(())
}

fn run_kelly(win_rate: f64, win_return: f64, loss_return: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&win_rate) {
        bail!("--win-rate must be in [0, 1] (got {win_rate})");
    }
    if win_return.is_nan() || win_return <= 0.0 {
        bail!("--win-return must be positive (got {win_return})");
    }
    if loss_return > 0.0 {
        bail!("--loss-return must not be positive (got {loss_return})");
    }
    let fraction = kelly_fraction(win_rate, win_return, loss_return);
    println!("{fraction}");
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn print_summary(result: &ExperimentResult) {
    let report = result.report();
    println!();
    println!("=== Experiment Result ===");
    println!("Policy:          {}", result.label);
    println!("Seed:            {}", result.simulation.seed);
    println!("Trials:          {}", result.run.trial_count());
    println!("Trades:          {}", report.trade_count);
    println!("Waiting steps:   {}", result.run.total_waiting_steps());
    println!();
    println!(
        "{:<10} {:>14} {:>14} {:>10}",
        "Series", "Mean Return", "Std Dev", "Max DD"
    );
    println!("{}", "-".repeat(51));
    for (name, summary) in [
        ("trade", &report.per_trade),
        ("trial", &report.per_trial),
        ("batch", &report.per_batch),
    ] {
        println!(
            "{:<10} {:>14.6} {:>14.6} {:>9.2}%",
            name,
            summary.mean_return,
            summary.return_std_dev,
            summary.max_drawdown * 100.0
        );
    }
    println!();
    println!("Batch win ratio:          {:.4}", report.batch_win_ratio);
    println!("Batch profit/loss ratio:  {:.4}", report.batch_profit_loss_ratio);
    let final_balance = result
        .run
        .per_trial_balances()
        .last()
        .copied()
        .unwrap_or(result.simulation.initial_balance);
    println!("Final balance:            {final_balance:.4}");
}
