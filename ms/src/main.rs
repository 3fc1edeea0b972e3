//! mixsched - round scheduler for a permissioned mix-network
//!
//! CLI entry point.

use clap::Parser;
use eyre::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mixsched::cli::{Cli, Command};
use mixsched::config::Config;
use mixsched::network::{InMemoryRoundIds, NetworkState, RoundSigner};
use mixsched::scheduler::Scheduler;
use mixsched::simulation::{SimulationReport, Simulator};

fn setup_logging(log_level: Option<&str>) -> Result<()> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level).context(format!("Invalid log level: {level}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    info!("Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    match cli.command {
        Command::Simulate {
            nodes,
            rounds,
            deadline_secs,
            failure_rate,
            json,
        } => cmd_simulate(&config, nodes, rounds, Duration::from_secs(deadline_secs), failure_rate, json).await,
        Command::Config => cmd_config(&config),
    }
}

/// Run a scheduler against simulated nodes and print the outcome
async fn cmd_simulate(
    config: &Config,
    nodes: usize,
    rounds: u64,
    deadline: Duration,
    failure_rate: f64,
    json: bool,
) -> Result<()> {
    let signer = RoundSigner::from_seed(rand::random());
    let network = Arc::new(NetworkState::new(signer, Box::new(InMemoryRoundIds::default())));
    let node_ids = Simulator::register_nodes(&network, nodes);

    let scheduler = Scheduler::new(config.scheduler.clone(), network.clone())?;
    let handle = scheduler.handle();
    let task = tokio::spawn(scheduler.run());

    let report = Simulator::new(handle.clone(), node_ids)
        .with_failure_rate(failure_rate)
        .run(rounds, deadline)
        .await?;

    info!("Simulation done, draining scheduler");
    handle.shutdown().await?;
    task.await.context("Scheduler task panicked")??;

    let key = network.verifying_key();
    let unverified = network
        .update_log()
        .since(0)
        .iter()
        .filter(|update| update.verify(&key).is_err())
        .count();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, network.update_log().latest_update_id(), unverified);
    }
    Ok(())
}

fn print_report(report: &SimulationReport, updates: u64, unverified: usize) {
    let m = &report.metrics;
    println!("Rounds completed:   {}", m.rounds_completed);
    println!("Rounds failed:      {}", m.rounds_failed);
    println!("Rounds started:     {}", m.rounds_started);
    println!("Timeouts:           {}", m.timeouts);
    println!("Updates processed:  {}", m.updates_processed);
    println!("Update errors:      {}", m.update_errors);
    println!("Polls:              {} ({} busy)", report.polls, report.busy_polls);
    println!("Injected errors:    {}", report.injected_errors);
    println!("Round broadcasts:   {updates} ({unverified} failed verification)");
    if report.timed_out {
        println!("Deadline reached before the requested number of rounds finished");
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
