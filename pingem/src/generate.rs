//! Randomized profile table generation.
//!
//! Produces the CSV the simulator consumes, with a latency mix spanning
//! LAN-ish neighbors, WAN-ish hosts and far/satellite links, plus a
//! configurable fraction of hosts that never answer. Uses the legacy
//! three-column format: unreachable hosts are marked with a negative
//! median rather than a loss column.

use std::{net::Ipv4Addr, path::PathBuf};

use anyhow::{Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{info, warn};

#[derive(clap::Args, Debug)]
pub(crate) struct GenerateArgs {
    /// Output CSV path
    #[arg(short, long)]
    output: PathBuf,

    /// Number of hosts to generate
    #[arg(long, default_value_t = 1000)]
    hosts: u32,

    /// Fraction of hosts that never answer
    #[arg(long, default_value_t = 0.05)]
    timeout_rate: f64,

    /// Index of the first host within the 10.0.0.0/16 layout
    #[arg(long, default_value_t = 0)]
    start_index: u32,

    /// Seed for reproducible tables
    #[arg(long)]
    seed: Option<u64>,
}

pub(crate) fn generate(args: &GenerateArgs) -> Result<()> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    writer.write_record(["ip", "median_ms", "jitter_ms"])?;

    let mut written = 0u32;
    for index in args.start_index..args.start_index.saturating_add(args.hosts) {
        // 254 usable hosts per third octet: 10.0.<i / 254>.<i % 254 + 1>.
        let octet3 = index / 254;
        let octet4 = index % 254 + 1;
        if octet3 > 254 {
            warn!("address layout exhausted at 10.0.254.254, stopping early");
            break;
        }
        let ip = Ipv4Addr::new(10, 0, octet3 as u8, octet4 as u8);

        let (median, jitter) = draw_profile(&mut rng, args.timeout_rate);
        writer.write_record([ip.to_string(), median.to_string(), jitter.to_string()])?;
        written += 1;
    }
    writer.flush()?;

    info!(hosts = written, path = %args.output.display(), "profile table written");
    Ok(())
}

/// Draws one host's `(median_ms, jitter_ms)`.
///
/// `timeout_rate` of hosts get the never-answer marker; the rest split
/// 80/15/5 between LAN-ish, WAN-ish and far/satellite latencies.
fn draw_profile<R: Rng>(rng: &mut R, timeout_rate: f64) -> (i64, i64) {
    if rng.gen::<f64>() < timeout_rate {
        return (-1, 0);
    }

    match rng.gen::<f64>() {
        tier if tier < 0.80 => (rng.gen_range(5..=50), rng.gen_range(1..=10)),
        tier if tier < 0.95 => (rng.gen_range(100..=500), rng.gen_range(20..=100)),
        _ => (rng.gen_range(1000..=3000), rng.gen_range(200..=800)),
    }
}
