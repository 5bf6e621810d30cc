//! Terminal progress bar for acquisitions

use indicatif::{ProgressBar, ProgressStyle};
use rant_models::DownloadProgress;

const PB_STYLE: &str = "{spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {percent:>3}% {msg}";

const PB_CHARS: &str = "█▓▒░  ";

/// Resolution of the bar; fractions are mapped onto 0..=PB_LEN
const PB_LEN: u64 = 1000;

pub fn download_bar() -> ProgressBar {
    let pb = ProgressBar::new(PB_LEN);
    if let Ok(style) = ProgressStyle::with_template(PB_STYLE) {
        pb.set_style(style.progress_chars(PB_CHARS));
    }
    pb
}

/// Callback that drives `pb` from engine progress
pub fn reporter(pb: ProgressBar) -> impl FnMut(DownloadProgress) + Send {
    move |progress: DownloadProgress| {
        pb.set_position(position(progress.fraction));
        pb.set_message(progress.status);
    }
}

fn position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * PB_LEN as f64).round() as u64
}

/// Get human-readable size string
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.0} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
