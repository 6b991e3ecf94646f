//! Human-friendly durations for admin commands (`1d12h`, `30m`, `90`).

use std::{sync::OnceLock, time::Duration};

use regex::Regex;

fn unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:(\d+)\s*([smhdw]))+$").unwrap_or_else(|e| panic!("bad regex: {e}"))
    })
}

fn group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*([smhdw])").unwrap_or_else(|e| panic!("bad regex: {e}"))
    })
}

/// Parse `<n><unit>` groups; a bare number is seconds. Zero is rejected.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return (secs > 0).then(|| Duration::from_secs(secs));
    }
    if !unit_re().is_match(s) {
        return None;
    }

    let mut total: u64 = 0;
    for caps in group_re().captures_iter(s) {
        let n: u64 = caps[1].parse().ok()?;
        let unit = match caps[2].to_ascii_lowercase().as_str() {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            _ => return None,
        };
        total = total.checked_add(n.checked_mul(unit)?)?;
    }
    (total > 0).then(|| Duration::from_secs(total))
}

pub fn format_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, size) in [("d", 86_400u64), ("h", 3_600), ("m", 60), ("s", 1)] {
        let n = secs / size;
        if n > 0 {
            out.push_str(&format!("{n}{unit}"));
            secs %= size;
        }
    }
    out
}
