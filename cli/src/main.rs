//! `aquascan` CLI: batch scenario runs and strategy comparison.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sim::engine::{Engine, Strategy};
use sim::scenarios::{Scenario, ScenarioKind};
use sonar_core::metrics::EvalMetrics;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aquascan", about = "Multi-sonar pool-scanning simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named scenario with one strategy and output metrics.
    Run {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Scheduling strategy
        #[arg(long, default_value = "optimized")]
        strategy: StrategyArg,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 1337)]
        seed: u32,
        /// Override the scenario duration (seconds)
        #[arg(long)]
        duration: Option<f64>,
        /// Metric window (seconds)
        #[arg(long, default_value_t = 10.0)]
        window: f64,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run both strategies in lockstep on a shared seed and compare.
    Compare {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        #[arg(long, default_value_t = 1337)]
        seed: u32,
        #[arg(long)]
        duration: Option<f64>,
        #[arg(long, default_value_t = 10.0)]
        window: f64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum StrategyArg {
    Naive,
    Optimized,
}

impl From<StrategyArg> for Strategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Naive => Strategy::Naive,
            StrategyArg::Optimized => Strategy::Optimized,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            scenario,
            strategy,
            seed,
            duration,
            window,
            output,
        } => run_single(scenario, strategy.into(), seed, duration, window, output.as_deref()),
        Commands::Compare {
            scenario,
            seed,
            duration,
            window,
            output,
        } => run_compare(scenario, seed, duration, window, output.as_deref()),
    }
}

/// Drive one engine through a scenario: fixed ticks, swimmers entering on
/// schedule.
fn drive(engine: &mut Engine, scenario: &Scenario, duration: f64) {
    let mut next_entry = 0;
    while engine.time() < duration {
        while next_entry < scenario.entries.len()
            && scenario.entries[next_entry].at <= engine.time()
        {
            engine.add_swimmer(scenario.entries[next_entry].spec);
            next_entry += 1;
        }
        engine.tick(scenario.sim_dt);
    }
}

fn run_single(
    kind: ScenarioKind,
    strategy: Strategy,
    seed: u32,
    duration: Option<f64>,
    window: f64,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    let duration = duration.unwrap_or(scenario.duration);
    tracing::info!(name = %scenario.name, seed, duration, "running scenario");

    let mut engine = Engine::new(strategy, seed);
    let start = std::time::Instant::now();
    drive(&mut engine, &scenario, duration);
    let metrics = engine.metrics(window);

    println!(
        "Scenario '{}' ({:?}, seed={seed}) simulated {duration:.0}s in {:.2?}",
        scenario.name,
        strategy,
        start.elapsed()
    );
    print_metrics_table(&[("metrics", &metrics)]);

    if let Some(path) = output {
        let report = RunReport {
            scenario: scenario.name.clone(),
            seed,
            duration,
            window,
            metrics,
        };
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn run_compare(
    kind: ScenarioKind,
    seed: u32,
    duration: Option<f64>,
    window: f64,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    let duration = duration.unwrap_or(scenario.duration);
    tracing::info!(name = %scenario.name, seed, duration, "comparing strategies");

    let mut naive = Engine::new(Strategy::Naive, seed);
    let mut optimized = Engine::new(Strategy::Optimized, seed);
    let start = std::time::Instant::now();
    // The engines share nothing mutable; run them on separate threads.
    rayon::join(
        || drive(&mut naive, &scenario, duration),
        || drive(&mut optimized, &scenario, duration),
    );
    let naive_metrics = naive.metrics(window);
    let optimized_metrics = optimized.metrics(window);

    println!(
        "Scenario '{}' (seed={seed}) simulated {duration:.0}s per strategy in {:.2?}",
        scenario.name,
        start.elapsed()
    );
    print_metrics_table(&[("naive", &naive_metrics), ("optimized", &optimized_metrics)]);

    if let Some(path) = output {
        let report = CompareReport {
            scenario: scenario.name.clone(),
            seed,
            duration,
            window,
            naive: naive_metrics,
            optimized: optimized_metrics,
        };
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn print_metrics_table(columns: &[(&str, &EvalMetrics)]) {
    let rows: Vec<(&str, Vec<f64>)> = vec![
        ("avg AoI (s)", columns.iter().map(|(_, m)| m.avg_aoi_sec).collect()),
        ("p90 AoI (s)", columns.iter().map(|(_, m)| m.p90_aoi_sec).collect()),
        ("scan rate (Hz)", columns.iter().map(|(_, m)| m.avg_scan_rate_hz).collect()),
        ("revisit (s)", columns.iter().map(|(_, m)| m.avg_revisit_interval_sec).collect()),
        ("tracking RMSE (m)", columns.iter().map(|(_, m)| m.tracking_rmse_m).collect()),
        ("loc error (m)", columns.iter().map(|(_, m)| m.avg_localization_error_m).collect()),
        ("false alarms (/s)", columns.iter().map(|(_, m)| m.false_alarms_per_sec).collect()),
        ("hit rate", columns.iter().map(|(_, m)| m.detection_hit_rate).collect()),
        ("precision", columns.iter().map(|(_, m)| m.precision).collect()),
        ("recall", columns.iter().map(|(_, m)| m.recall).collect()),
        ("F1", columns.iter().map(|(_, m)| m.f1).collect()),
        ("MDR", columns.iter().map(|(_, m)| m.mdr).collect()),
        ("mean IoU", columns.iter().map(|(_, m)| m.mean_iou).collect()),
        ("fps", columns.iter().map(|(_, m)| m.fps).collect()),
        ("tracking rate", columns.iter().map(|(_, m)| m.tracking_rate).collect()),
        ("TTFD avg (s)", columns.iter().map(|(_, m)| m.avg_time_to_first_detection_sec).collect()),
    ];

    print!("{:<20}", "");
    for (name, _) in columns {
        print!("{name:>12}");
    }
    println!();
    for (label, values) in rows {
        print!("{label:<20}");
        for v in values {
            print!("{v:>12.3}");
        }
        println!();
    }
}

#[derive(Serialize)]
struct RunReport {
    scenario: String,
    seed: u32,
    duration: f64,
    window: f64,
    metrics: EvalMetrics,
}

#[derive(Serialize)]
struct CompareReport {
    scenario: String,
    seed: u32,
    duration: f64,
    window: f64,
    naive: EvalMetrics,
    optimized: EvalMetrics,
}
