//! Helpers for sanitizing data before it enters tracing span attributes or
//! caller-visible job records.
//!
//! Raw tool output can be large and contains host paths, so only a short tail
//! of it is ever stored.

use std::path::Path;

/// Upper bound on the characters kept by [`summarize_tool_output`].
pub const MAX_SUMMARY_CHARS: usize = 400;

/// Number of trailing non-empty lines kept by [`summarize_tool_output`].
pub const SUMMARY_LINES: usize = 3;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Condenses captured stderr/stdout into a one-line summary.
///
/// Keeps the last few non-empty lines (tools print the actual error last),
/// replaces occurrences of `work_dir` with `<work>`, and truncates on a char
/// boundary.
pub fn summarize_tool_output(output: &str, work_dir: Option<&Path>) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let tail = &lines[lines.len().saturating_sub(SUMMARY_LINES)..];
    let mut summary = tail.join(" | ");

    if let Some(dir) = work_dir.and_then(|d| d.to_str()).filter(|d| !d.is_empty()) {
        summary = summary.replace(dir, "<work>");
    }

    if summary.chars().count() > MAX_SUMMARY_CHARS {
        let cut: String = summary.chars().take(MAX_SUMMARY_CHARS).collect();
        summary = format!("{}...", cut);
    }

    summary
}
