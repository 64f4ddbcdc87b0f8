//! satsim - run two link engines over a simulated satellite hop
//!
//! Loads a TOML scenario, offers SDU traffic at the terminal (and optionally
//! the gateway), runs until the link drains or the time limit expires and
//! prints per-endpoint statistics.

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use satlink_cli::config::{ModeConfig, Scenario};
use satlink_cli::stats::{display_compact_stats, display_report};
use satlink_protocol::time::Timestamp;
use satlink_sim::{LinkPair, Side};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "satsim")]
#[command(about = "Satellite link-layer segmentation and ARQ simulator", long_about = None)]
struct Args {
    /// Scenario file (TOML); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write an example scenario to this path and exit
    #[arg(long)]
    write_example: Option<PathBuf>,

    /// Delivery mode override (unacknowledged, acknowledged)
    #[arg(short, long)]
    mode: Option<String>,

    /// Frame loss probability override
    #[arg(long)]
    loss: Option<f64>,

    /// Channel seed override
    #[arg(long)]
    seed: Option<u64>,

    /// Number of SDUs override
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Simulated time limit in seconds override
    #[arg(short, long)]
    duration: Option<u64>,

    /// Progress interval in simulated seconds, 0 to disable
    #[arg(long, default_value = "0")]
    stats: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_mode(mode: &str) -> anyhow::Result<ModeConfig> {
    match mode {
        "unacknowledged" | "um" => Ok(ModeConfig::Unacknowledged),
        "acknowledged" | "am" | "arq" => Ok(ModeConfig::Acknowledged),
        _ => anyhow::bail!("Invalid mode: {}", mode),
    }
}

fn load_scenario(args: &Args) -> anyhow::Result<Scenario> {
    let mut scenario = match &args.config {
        Some(path) => Scenario::from_file(path)
            .with_context(|| format!("loading scenario {}", path.display()))?,
        None => Scenario::default(),
    };

    if let Some(mode) = &args.mode {
        scenario.link.mode = parse_mode(mode)?;
    }
    if let Some(loss) = args.loss {
        scenario.channel.packet_loss = loss;
    }
    if let Some(seed) = args.seed {
        scenario.mac.seed = seed;
    }
    if let Some(count) = args.count {
        scenario.traffic.sdu_count = count;
    }
    if let Some(duration) = args.duration {
        scenario.traffic.duration_secs = duration;
    }

    scenario.validate()?;
    Ok(scenario)
}

/// SDU whose first bytes carry its index
fn make_sdu(index: usize, size: usize) -> Bytes {
    let mut data = format!("{index:08}").into_bytes();
    data.resize(size, b'.');
    Bytes::from(data)
}

fn offer_traffic(pair: &mut LinkPair, scenario: &Scenario) -> Vec<Bytes> {
    let traffic = &scenario.traffic;
    let sdus: Vec<Bytes> = (0..traffic.sdu_count)
        .map(|i| make_sdu(i, traffic.sdu_size))
        .collect();

    let sides: &[Side] = if traffic.bidirectional {
        &[Side::A, Side::B]
    } else {
        &[Side::A]
    };
    for (i, sdu) in sdus.iter().enumerate() {
        let at = Timestamp::from_duration(traffic.interval() * i as u32);
        for &side in sides {
            pair.enqueue_at(at, side, sdu.clone());
        }
    }
    sdus
}

/// Check that `delivered` is an in-order subsequence of `sent`
fn check_order(sent: &[Bytes], delivered: &[Bytes]) -> bool {
    let mut remaining = sent.iter();
    delivered
        .iter()
        .all(|sdu| remaining.by_ref().any(|candidate| candidate == sdu))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    if let Some(path) = &args.write_example {
        Scenario::example()
            .to_file(path)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("Example scenario written to {}", path.display());
        return Ok(());
    }

    let scenario = load_scenario(&args)?;
    tracing::info!(
        "Mode: {:?}, loss: {}, {} SDUs of {} bytes",
        scenario.link.mode,
        scenario.channel.packet_loss,
        scenario.traffic.sdu_count,
        scenario.traffic.sdu_size
    );

    let mut pair = LinkPair::new(scenario.to_sim_config())?;
    let sent = offer_traffic(&mut pair, &scenario);

    let deadline = Timestamp::from_duration(scenario.traffic.duration());
    let idle = if args.stats > 0 {
        let step = Duration::from_secs(args.stats);
        loop {
            let until = (pair.now() + step).min(deadline);
            if pair.run_until_idle(until)? {
                break true;
            }
            pair.run_until(until)?;
            display_compact_stats(&pair.report());
            if until >= deadline {
                break false;
            }
        }
    } else {
        pair.run_until_idle(deadline)?
    };

    if !idle {
        tracing::warn!("Time limit reached before the link drained");
    }

    let report = pair.report();
    display_report(&report);

    let mut sides = vec![Side::B];
    if scenario.traffic.bidirectional {
        sides.push(Side::A);
    }
    for side in sides {
        let delivered = pair.delivered(side);
        let in_order = check_order(&sent, delivered);
        println!(
            "Receiver {}: {}/{} SDUs delivered, order {}",
            side,
            delivered.len(),
            sent.len(),
            if in_order { "preserved" } else { "VIOLATED" }
        );
        if !in_order {
            anyhow::bail!("Receiver {} delivered SDUs out of order", side);
        }
    }

    Ok(())
}
