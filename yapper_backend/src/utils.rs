//! Shared helpers for timestamps, text truncation and ban durations.

use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;

pub const APP_NAME: &str = "yapper_backend";

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339()
}

pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Truncates to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn duration_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^(\d+)\s*(y|years?|mo|months?|w|weeks?|d|days?|h|hours?|m|mins?|minutes?|s|secs?|seconds?)?$",
            )
            .ok()
        })
        .as_ref()
}

/// Parses a human duration such as `"1h"`, `"3d"` or `"30 years"` into seconds.
///
/// A bare number is read as days. Returns `None` for anything unparseable or
/// too large to represent.
pub fn parse_duration_secs(input: &str) -> Option<i64> {
    let normalized = input.trim().to_ascii_lowercase();
    let captures = duration_pattern()?.captures(&normalized)?;
    let value: i64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2).map(|m| m.as_str()).unwrap_or("d");
    let multiplier = match unit {
        "y" | "year" | "years" => 31_536_000,
        "mo" | "month" | "months" => 2_592_000,
        "w" | "week" | "weeks" => 604_800,
        "d" | "day" | "days" => 86_400,
        "h" | "hour" | "hours" => 3_600,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        _ => return None,
    };
    value.checked_mul(multiplier)
}

/// Renders a remaining duration as `"2 days, 3 hours, 1 second"`.
pub fn format_time_left(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    let mut minutes = total_secs / 60;
    let seconds = total_secs % 60;
    let mut hours = minutes / 60;
    minutes %= 60;
    let mut days = hours / 24;
    hours %= 24;
    let mut weeks = days / 7;
    days %= 7;
    let mut months = weeks / 4;
    weeks %= 4;
    let years = months / 12;
    months %= 12;

    let parts = [
        (years, "year"),
        (months, "month"),
        (weeks, "week"),
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (seconds, "second"),
    ];
    let rendered: Vec<String> = parts
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            if *value > 1 {
                format!("{value} {unit}s")
            } else {
                format!("{value} {unit}")
            }
        })
        .collect();
    if rendered.is_empty() {
        "less than a second".to_string()
    } else {
        rendered.join(", ")
    }
}
