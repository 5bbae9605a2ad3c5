use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use philo::config::{parse_count, parse_ms, parse_philosophers};
use philo::{signal, Outcome, SimConfig, Simulation};

#[derive(Parser)]
#[command(name = "philo")]
#[command(version, about = "Dining philosophers simulation", long_about = None)]
struct Cli {
    /// Number of philosophers (and chopsticks)
    #[arg(value_parser = parse_philosophers)]
    philosophers: usize,

    /// Milliseconds a philosopher survives without starting a meal
    #[arg(value_parser = parse_ms)]
    time_to_die: u64,

    /// Milliseconds spent eating
    #[arg(value_parser = parse_ms)]
    time_to_eat: u64,

    /// Milliseconds spent sleeping
    #[arg(value_parser = parse_ms)]
    time_to_sleep: u64,

    /// Stop once every philosopher has eaten this many meals
    #[arg(value_parser = parse_count)]
    meals: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 診断ログは stderr。stdout はイベント行専用
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(&cli) {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<Outcome> {
    let config = SimConfig::new(
        cli.philosophers,
        cli.time_to_die,
        cli.time_to_eat,
        cli.time_to_sleep,
        cli.meals,
    )?;
    info!(?config, "starting simulation");

    let sim = Simulation::builder(config)
        .output(io::stdout())
        .build()
        .context("could not set the table")?;
    let _signals = signal::forward(sim.handle())?;

    Ok(sim.run()?)
}
