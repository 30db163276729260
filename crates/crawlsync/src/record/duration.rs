//! Processing-time resolution.
//!
//! Producers report durations either as Go-style strings (`"1.5s"`,
//! `"150ms"`) or as bare numbers whose unit is not tagged. Both are
//! normalized to fractional milliseconds.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static RE_DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(ns|µs|ms|s)$").unwrap());

/// Bare numbers above this are taken to be nanoseconds, at or below it
/// milliseconds. A heuristic: a genuine 1001 s duration reported in
/// milliseconds is misread as ~1 ms.
pub const NANOS_THRESHOLD: f64 = 1_000_000.0;

/// Parses `<number><unit>` with unit in {ns, µs, ms, s} into milliseconds.
pub fn parse_duration_str(s: &str) -> Option<f64> {
    let caps = RE_DURATION.captures(s)?;
    let value: f64 = caps[1].parse().ok()?;
    let ms = match &caps[2] {
        "ns" => value / 1_000_000.0,
        "µs" => value / 1_000.0,
        "ms" => value,
        "s" => value * 1_000.0,
        _ => return None,
    };
    Some(ms)
}

/// Resolves a wire duration value to milliseconds. Anything that is not a
/// matching string or a number resolves to 0.
pub fn processing_time_ms(value: &Value) -> f64 {
    match value {
        Value::String(s) => parse_duration_str(s).unwrap_or(0.0),
        Value::Number(n) => {
            let raw = n.as_f64().unwrap_or(0.0);
            if raw > NANOS_THRESHOLD {
                raw / 1_000_000.0
            } else {
                raw
            }
        }
        _ => 0.0,
    }
}
