//! Shared formatting helpers.
//!
//! All functions are pure and total: negative sizes, NaN durations and
//! unknown status words degrade to a defined fallback instead of failing.
//! Byte sizes come in two styles, see [`FmtStyle`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Controls compact (table columns) vs verbose (metric lines) output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FmtStyle {
    /// Compact: no spaces, short suffixes ("1.5G", "512B")
    Compact,
    /// Detail: spaces, binary suffixes ("1.5 GiB", "512 B")
    Detail,
}

const DETAIL_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
const COMPACT_UNITS: [&str; 7] = ["B", "K", "M", "G", "T", "P", "E"];

// ---------------------------------------------------------------------------
// Sizes and durations
// ---------------------------------------------------------------------------

/// Format byte count with a binary unit.
///
/// The displayed number always lies in `[1, 1024)`; zero and negative
/// counts render as `"0 B"` (`"0B"` compact).
///
/// Detail:  `"512 B"`, `"1.5 KiB"`, `"100.3 MiB"`
/// Compact: `"512B"`, `"1.5K"`, `"100.3M"`
pub fn format_bytes(bytes: i64, style: FmtStyle) -> String {
    let (units, sep) = match style {
        FmtStyle::Compact => (&COMPACT_UNITS, ""),
        FmtStyle::Detail => (&DETAIL_UNITS, " "),
    };
    if bytes <= 0 {
        return format!("0{}{}", sep, units[0]);
    }
    if bytes < 1024 {
        return format!("{}{}{}", bytes, sep, units[0]);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < units.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    // 1023.96 would print as "1024.0"; promote to the next unit instead.
    if round1(value) >= 1024.0 && unit < units.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}{}", value, sep, units[unit])
}

/// Duration units above one second, coarsest last.
const DURATION_UNITS: [(f64, &str); 4] = [
    (1.0, "s"),
    (60.0, "min"),
    (3600.0, "h"),
    (86400.0, "d"),
];

/// Format a duration given in seconds.
///
/// Picks the coarsest unit that keeps the value at or above 1:
/// `0.5` -> `"500 ms"`, `90` -> `"1.5 min"`, `7200` -> `"2.0 h"`.
/// Zero, negative and non-finite input -> `"0 ms"`; positive values under
/// 0.05 ms -> `"<0.1 ms"`.
pub fn format_duration(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return "0 ms".to_string();
    }

    let ms = secs * 1000.0;
    if ms < 0.05 {
        return "<0.1 ms".to_string();
    }
    if ms < 1.0 {
        return format!("{:.1} ms", ms);
    }
    if ms.round() < 1000.0 {
        return format!("{:.0} ms", ms);
    }

    let mut idx = DURATION_UNITS
        .iter()
        .rposition(|(size, _)| secs >= *size)
        .unwrap_or(0);
    if let Some((next, _)) = DURATION_UNITS.get(idx + 1)
        && round1(secs / DURATION_UNITS[idx].0) >= next / DURATION_UNITS[idx].0
    {
        idx += 1;
    }
    let (size, unit) = DURATION_UNITS[idx];
    format!("{:.1} {}", secs / size, unit)
}

/// Format a measured latency (ping, probe timing).
pub fn format_latency(latency: Duration) -> String {
    format_duration(latency.as_secs_f64())
}

/// Format a percentage with one decimal, `"-"` for NaN.
pub fn format_percent(pct: f64) -> String {
    if pct.is_nan() {
        "-".to_string()
    } else {
        format!("{:.1}%", pct)
    }
}

/// Format a UTC timestamp as `"2024-03-01 12:00:05 UTC"`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Text normalization
// ---------------------------------------------------------------------------

/// Truncate to at most `max_chars` characters, ending with `…` when cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Collapse query text onto one line: newlines and tabs become single spaces.
pub fn normalize_query(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Status colours
// ---------------------------------------------------------------------------

/// Colour tag for a status indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusColor {
    Ok,
    Warning,
    Critical,
    Info,
    /// Unknown status.
    Neutral,
}

impl StatusColor {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusColor::Ok => "ok",
            StatusColor::Warning => "warning",
            StatusColor::Critical => "critical",
            StatusColor::Info => "info",
            StatusColor::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for StatusColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy)]
enum Match {
    Exact,
    Prefix,
}

/// Known status words. Checked in order, so longer prefixes come first.
const STATUS_VOCABULARY: &[(&str, Match, StatusColor)] = &[
    ("idle in transaction (aborted)", Match::Prefix, StatusColor::Critical),
    ("idle in transaction", Match::Prefix, StatusColor::Warning),
    ("disconnected", Match::Prefix, StatusColor::Critical),
    ("unavailable", Match::Prefix, StatusColor::Critical),
    ("unhealthy", Match::Exact, StatusColor::Critical),
    ("connected", Match::Prefix, StatusColor::Ok),
    ("healthy", Match::Exact, StatusColor::Ok),
    ("active", Match::Exact, StatusColor::Ok),
    ("ok", Match::Exact, StatusColor::Ok),
    ("critical", Match::Prefix, StatusColor::Critical),
    ("error", Match::Prefix, StatusColor::Critical),
    ("failed", Match::Prefix, StatusColor::Critical),
    ("fatal", Match::Prefix, StatusColor::Critical),
    ("panic", Match::Prefix, StatusColor::Critical),
    ("warning", Match::Prefix, StatusColor::Warning),
    ("degraded", Match::Exact, StatusColor::Warning),
    ("slow", Match::Exact, StatusColor::Warning),
    ("starting", Match::Prefix, StatusColor::Info),
    ("fastpath function call", Match::Exact, StatusColor::Info),
    ("idle", Match::Exact, StatusColor::Info),
    ("info", Match::Exact, StatusColor::Info),
];

/// Map a status word to its colour tag.
///
/// Case-insensitive, surrounding whitespace ignored. Anything outside the
/// known vocabulary maps to [`StatusColor::Neutral`].
pub fn status_color(status: &str) -> StatusColor {
    let normalized = status.trim().to_ascii_lowercase();
    STATUS_VOCABULARY
        .iter()
        .find(|(word, kind, _)| match kind {
            Match::Exact => normalized == *word,
            Match::Prefix => normalized.starts_with(word),
        })
        .map(|(_, _, color)| *color)
        .unwrap_or(StatusColor::Neutral)
}

/// Status word for a cache hit ratio (percent). `None` means no block
/// accesses yet.
pub fn cache_hit_status(ratio_pct: Option<f64>) -> &'static str {
    match ratio_pct {
        None => "info",
        Some(r) if r >= 99.0 => "ok",
        Some(r) if r >= 90.0 => "warning",
        Some(_) => "critical",
    }
}

/// Status word for connection slot usage.
pub fn connection_usage_status(used: i64, max: i64) -> &'static str {
    if max <= 0 {
        return "info";
    }
    let pct = used as f64 * 100.0 / max as f64;
    if pct < 70.0 {
        "ok"
    } else if pct < 90.0 {
        "warning"
    } else {
        "critical"
    }
}

/// Status word for a ping round trip.
pub fn latency_status(latency: Duration) -> &'static str {
    let ms = latency.as_secs_f64() * 1000.0;
    if ms < 50.0 {
        "ok"
    } else if ms < 250.0 {
        "degraded"
    } else {
        "slow"
    }
}
