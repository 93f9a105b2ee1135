//! Statistics display and formatting

use flexfec_interceptor::FecStats;
use std::io::Write;
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

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format repair packets sent as a percentage of media packets
pub fn format_overhead(stats: &FecStats) -> String {
    if stats.media_packets == 0 {
        return "N/A".to_string();
    }
    format!(
        "{:.1}%",
        stats.repair_packets_sent as f64 * 100.0 / stats.media_packets as f64
    )
}

/// Display FEC stage statistics
pub fn display_fec_stats(stats: &FecStats, bytes_sent: u64, elapsed: Duration) {
    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ FEC STATISTICS                                              │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Uptime:   {}", format_duration(elapsed));
    println!(
        "│ Media:    {} packets / {}",
        stats.media_packets,
        format_bytes(bytes_sent)
    );
    println!("│ Bypassed: {} packets", stats.bypassed_packets);
    println!(
        "│ Rounds:   {} ({} encode failures)",
        stats.rounds, stats.encode_failures
    );
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ REPAIR PACKETS                                              │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!(
        "│ Generated: {} | Sent: {} | Dropped: {}",
        stats.repair_packets_generated, stats.repair_packets_sent, stats.repair_packets_dropped
    );
    println!("│ Overhead:  {}", format_overhead(stats));
    println!("│ Buffered:  {}", stats.buffered);
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Display compact stats on one line (for continuous updates)
pub fn display_compact_stats(stats: &FecStats, bytes_sent: u64, elapsed: Duration) {
    let throughput_bps = if elapsed.as_secs() > 0 {
        (bytes_sent * 8) / elapsed.as_secs()
    } else {
        0
    };

    print!(
        "\r[{:8}] Media: {} | Repair: {} | Rate: {} | Overhead: {}         ",
        format_duration(elapsed),
        stats.media_packets,
        stats.repair_packets_sent,
        format_bandwidth(throughput_bps),
        format_overhead(stats)
    );

    let _ = std::io::stdout().flush();
}
