//! pingem: answer pings the way a simulated network would.
//!
//! `pingem run` watches an interface for ICMP Echo Requests aimed at a
//! target network and answers each one according to a per-destination
//! delay/loss profile. `pingem generate` produces randomized profile
//! tables to run against.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ipnetwork::Ipv4Network;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pingem_engine::{load_profiles, CaptureDispatcher, ReplyScheduler, SimStats};
use pingem_net::{open, resolve_identity};

mod generate;

#[derive(Parser, Debug)]
#[command(name = "pingem", version, about = "ICMP echo latency and loss simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer pings on an interface according to a profile table
    Run(RunArgs),
    /// Generate a randomized profile table CSV
    Generate(generate::GenerateArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Interface to capture on (e.g. enp0s3)
    #[arg(short, long)]
    iface: String,

    /// Network the simulator answers for (e.g. 10.0.0.0/22)
    #[arg(short, long)]
    net: Ipv4Network,

    /// Path to the delay/loss profile CSV
    #[arg(short, long)]
    profiles: PathBuf,

    /// Seed for the loss/jitter random stream, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds between run counter summaries (0 disables them)
    #[arg(long, default_value_t = 30)]
    stats_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Generate(args) => generate::generate(&args),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let (interface, identity) = resolve_identity(&args.iface)
        .with_context(|| format!("failed to resolve local identity on {}", args.iface))?;
    info!(iface = %interface.name, %identity, "resolved local identity");

    // A missing or broken table is not fatal: destinations without a
    // profile get immediate, lossless replies.
    let profiles = Arc::new(load_profiles(&args.profiles));

    let (mut source, sink) = open(&interface)
        .with_context(|| format!("failed to open capture channel on {}", interface.name))?;

    let stats = Arc::new(SimStats::default());
    let scheduler = Arc::new(ReplyScheduler::new(
        profiles,
        identity,
        Arc::new(sink),
        Arc::clone(&stats),
        args.seed,
    ));
    let dispatcher = CaptureDispatcher::new(scheduler, identity, args.net, Arc::clone(&stats));

    if args.stats_interval > 0 {
        tokio::spawn(stats_summary(
            Arc::clone(&stats),
            Duration::from_secs(args.stats_interval),
        ));
    }

    // The capture loop blocks on the datalink receiver, so it lives on a
    // blocking thread; reply tasks run on the async runtime.
    tokio::task::spawn_blocking(move || dispatcher.run(&mut source))
        .await
        .context("capture dispatcher panicked")?;

    Ok(())
}

async fn stats_summary(stats: Arc<SimStats>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it.
    interval.tick().await;

    loop {
        interval.tick().await;
        info!(
            received = stats.received(),
            replied = stats.replied(),
            dropped = stats.dropped(),
            failed = stats.failed(),
            "echo simulation counters"
        );
    }
}
