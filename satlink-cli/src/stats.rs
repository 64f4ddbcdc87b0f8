//! Statistics display and formatting

use satlink_protocol::engine::LinkStats;
use satlink_sim::{ChannelStats, Side, SimReport};
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format bandwidth in human-readable form
pub fn format_bandwidth(bps: u64) -> String {
    const KBPS: u64 = 1000;
    const MBPS: u64 = KBPS * 1000;
    const GBPS: u64 = MBPS * 1000;

    if bps >= GBPS {
        format!("{:.2} Gbps", bps as f64 / GBPS as f64)
    } else if bps >= MBPS {
        format!("{:.2} Mbps", bps as f64 / MBPS as f64)
    } else if bps >= KBPS {
        format!("{:.2} Kbps", bps as f64 / KBPS as f64)
    } else {
        format!("{} bps", bps)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else if secs > 0 {
        format!("{}.{:03}s", seconds, millis)
    } else {
        format!("{}ms", millis)
    }
}

/// Goodput over the simulated run
pub fn goodput_bps(bytes_delivered: u64, elapsed: Duration) -> u64 {
    let micros = elapsed.as_micros();
    if micros == 0 {
        return 0;
    }
    ((bytes_delivered as u128 * 8 * 1_000_000) / micros) as u64
}

/// Display the report of a simulation run
pub fn display_report(report: &SimReport) {
    let elapsed = report.end_time.as_duration();

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ SIMULATION                                                  │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Simulated time: {:<44}│", format_duration(elapsed));
    println!("└─────────────────────────────────────────────────────────────┘");

    for side in [Side::A, Side::B] {
        display_endpoint(side, report.stats(side), report.channel(side), elapsed);
    }
}

fn display_endpoint(side: Side, stats: &LinkStats, channel: &ChannelStats, elapsed: Duration) {
    let row = |label: &str, value: String| println!("│ {:<24}│ {:<34}│", label, value);

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ ENDPOINT {}                                                  │", side);
    println!("├─────────────────────────┬───────────────────────────────────┤");
    row("SDUs enqueued", stats.sdus_enqueued.to_string());
    row("SDUs dropped (overflow)", stats.sdus_dropped_overflow.to_string());
    row(
        "PDUs sent",
        format!("{} ({})", stats.pdus_sent, format_bytes(stats.bytes_sent)),
    );
    row("Retransmissions", stats.retransmissions.to_string());
    row("PDUs dropped (max retx)", stats.pdus_dropped_max_retx.to_string());
    row(
        "Frames lost on channel",
        format!("{} / {}", channel.frames_dropped, channel.frames_sent),
    );
    row("PDUs received", stats.pdus_received.to_string());
    row("PDUs discarded", stats.pdus_discarded.to_string());
    row(
        "SDUs delivered",
        format!("{} ({})", stats.sdus_delivered, format_bytes(stats.bytes_delivered)),
    );
    row(
        "Goodput",
        format_bandwidth(goodput_bps(stats.bytes_delivered, elapsed)),
    );
    row(
        "Acks sent / received",
        format!("{} / {}", stats.acks_sent, stats.acks_received),
    );
    println!("└─────────────────────────┴───────────────────────────────────┘");
}

/// Display compact stats on one line
pub fn display_compact_stats(report: &SimReport) {
    let a = report.stats(Side::A);
    let b = report.stats(Side::B);
    println!(
        "[{:>10}] A->B: {} sent, {} delivered | B->A: {} sent, {} delivered | retx: {}/{}",
        format_duration(report.end_time.as_duration()),
        a.pdus_sent,
        b.sdus_delivered,
        b.pdus_sent,
        a.sdus_delivered,
        a.retransmissions,
        b.retransmissions,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.00 MB");
    }

    #[test]
    fn test_format_bandwidth() {
        assert_eq!(format_bandwidth(500), "500 bps");
        assert_eq!(format_bandwidth(10_000), "10.00 Kbps");
        assert_eq!(format_bandwidth(10_000_000), "10.00 Mbps");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(270)), "270ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 01m 01s");
    }

    #[test]
    fn test_goodput() {
        assert_eq!(goodput_bps(1000, Duration::from_secs(1)), 8000);
        assert_eq!(goodput_bps(1000, Duration::ZERO), 0);
    }
}
