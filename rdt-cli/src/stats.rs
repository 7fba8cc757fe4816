//! Statistics display and formatting

use rdt::protocol::{ArqMode, ReceiverStats, TransferStats};
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

/// Format a byte rate as bits per second
pub fn format_throughput(bytes_per_sec: f64) -> String {
    let bps = bytes_per_sec * 8.0;
    if bps >= 1e9 {
        format!("{:.2} Gbps", bps / 1e9)
    } else if bps >= 1e6 {
        format!("{:.2} Mbps", bps / 1e6)
    } else if bps >= 1e3 {
        format!("{:.2} Kbps", bps / 1e3)
    } else {
        format!("{:.0} bps", bps)
    }
}

/// Format RTT in human-readable form
pub fn format_rtt(rtt: Duration) -> String {
    let rtt_us = rtt.as_micros();
    if rtt_us >= 1_000_000 {
        format!("{:.2}s", rtt.as_secs_f64())
    } else if rtt_us >= 1_000 {
        format!("{:.2}ms", rtt_us as f64 / 1_000.0)
    } else {
        format!("{}µs", rtt_us)
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
        format!("{}.{:03}s", seconds, duration.subsec_millis())
    }
}

/// Display the end-of-transfer summary printed by the sender
pub fn display_transfer_stats(mode: ArqMode, frame_size: usize, stats: &TransferStats) {
    let rtt_avg = stats
        .rtt_average()
        .map(format_rtt)
        .unwrap_or_else(|| "N/A".to_string());
    let rtt_max = if stats.rtt_samples > 0 {
        format_rtt(stats.rtt_max)
    } else {
        "N/A".to_string()
    };

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ TRANSFER STATISTICS                                         │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Protocol:           {}", mode);
    println!("│ Frame size:         {} bytes", frame_size);
    println!(
        "│ Frames:             {} sent / {} delivered",
        stats.frames_sent, stats.frames_delivered
    );
    println!(
        "│ Retransmissions:    {} ({} timeouts)",
        stats.retransmissions, stats.timeouts
    );
    println!("│ Keepalives:         {}", stats.keepalives_sent);
    println!(
        "│ Delivered:          {}",
        format_bytes(stats.bytes_delivered)
    );
    println!(
        "│ Transmission time:  {}",
        format_duration(stats.elapsed)
    );
    println!(
        "│ Throughput:         {}",
        format_throughput(stats.throughput_bps())
    );
    println!("│ RTT:                {} avg / {} max", rtt_avg, rtt_max);
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Display the summary printed by the receiver on exit
pub fn display_receiver_stats(stats: &ReceiverStats, elapsed: Duration) {
    let rate = if elapsed.as_secs_f64() > 0.0 {
        stats.bytes_consumed as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ RECEIVER STATISTICS                                         │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!(
        "│ Frames:             {} received / {} accepted",
        stats.frames_received, stats.frames_accepted
    );
    println!(
        "│ Duplicates:         {}",
        stats.duplicate_frames
    );
    println!(
        "│ Dropped:            {} out of window / {} malformed / {} foreign",
        stats.frames_rejected, stats.malformed_frames, stats.foreign_datagrams
    );
    println!(
        "│ Keepalives:         {}",
        stats.keepalives_received
    );
    println!("│ Acks sent:          {}", stats.acks_sent);
    println!(
        "│ Written:            {}",
        format_bytes(stats.bytes_consumed)
    );
    println!("│ Elapsed:            {}", format_duration(elapsed));
    println!("│ Throughput:         {}", format_throughput(rate));
    println!("└─────────────────────────────────────────────────────────────┘");
}
