//! Human-readable renderings shared by the controllers and the CLI.

use std::time::Duration;
use time::OffsetDateTime;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Size in binary units: `B` below 1 KiB, then `KB`/`MB` with two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    }
}

/// Coarse age such as `"3m ago"`, rounded down to the largest whole unit.
pub fn format_age(at: OffsetDateTime, now: OffsetDateTime) -> String {
    let secs = (now - at).whole_seconds();
    if secs < 0 {
        return "just now".to_string();
    }
    let secs = secs as u64;
    let rounded = match secs {
        0..=59 => secs,
        60..=3599 => secs - secs % 60,
        3600..=86_399 => secs - secs % 3600,
        _ => secs - secs % 86_400,
    };
    format!("{} ago", humantime::format_duration(Duration::from_secs(rounded)))
}
