//! Progress line rendering.

use std::time::Duration;

use snapsend_core::ProgressUpdate;
use snapsend_core::size::format_bytes;

/// Renders one progress sample as a single console line.
///
/// `1.50GiB / 2.00GiB  75%  12.34MiB/s  0:01:05  ETA 0:00:20`
pub fn render_progress(update: &ProgressUpdate) -> String {
    let percent = if update.total_estimated > 0 {
        (update.bytes_transferred.min(update.total_estimated) * 100) / update.total_estimated
    } else {
        0
    };
    let mut line = format!(
        "{} / {}  {percent:>3}%  {}/s  {}",
        format_bytes(update.bytes_transferred),
        format_bytes(update.total_estimated),
        format_bytes(update.throughput),
        format_duration(update.elapsed),
    );
    if let Some(eta) = update.eta {
        line.push_str("  ETA ");
        line.push_str(&format_duration(eta));
    }
    line
}

/// Formats a duration as `H:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
