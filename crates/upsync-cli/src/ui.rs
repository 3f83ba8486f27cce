//! Terminal output helpers.

use upsync_core::config::DEFAULT_CONFIG_FILE;
use upsync_core::sync::UploadStats;
use upsync_core::Error;

/// Message printed when the configuration lacks a required field.
pub fn missing_field_message(field: &str) -> String {
    format!("Required {DEFAULT_CONFIG_FILE} fields missing: {field}")
}

/// Print a fatal error with its code and suggestion.
pub fn handle_error(err: &Error) {
    match err.code() {
        Some(code) => eprintln!("Error [{code}]: {err}"),
        None => eprintln!("Error: {err}"),
    }

    if let Some(suggestion) = err.suggestion() {
        eprintln!();
        eprintln!("Suggestion:");
        for line in suggestion.lines() {
            eprintln!("  {line}");
        }
    }
}

/// One-line summary of what was uploaded.
pub fn format_summary(stats: &UploadStats) -> String {
    let mut summary = format!(
        "{} uploaded ({})",
        plural(stats.files_uploaded, "file"),
        format_bytes(stats.bytes_uploaded)
    );
    if stats.failures > 0 {
        summary.push_str(&format!(", {} failed", stats.failures));
    }
    if stats.resets > 0 {
        summary.push_str(&format!(", {}", plural(stats.resets, "reconnect")));
    }
    summary
}

fn plural(n: u64, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
