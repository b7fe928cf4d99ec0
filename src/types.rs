use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

/// How a freshly spawned managed process proves that it is alive.
///
/// Parsed from strings such as `"stdout:^ready"`, `"delay:2s"` or
/// `"immediate"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub enum LivenessSpec {
    /// Alive as soon as the process has been spawned.
    Immediate,
    /// Alive once a stdout line matches the regex.
    StdoutMatch(Regex),
    /// Alive if the process is still running after the given duration.
    Delay(Duration),
}

impl Default for LivenessSpec {
    fn default() -> Self {
        LivenessSpec::Immediate
    }
}

impl PartialEq for LivenessSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LivenessSpec::Immediate, LivenessSpec::Immediate) => true,
            (LivenessSpec::StdoutMatch(a), LivenessSpec::StdoutMatch(b)) => {
                a.as_str() == b.as_str()
            }
            (LivenessSpec::Delay(a), LivenessSpec::Delay(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for LivenessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessSpec::Immediate => write!(f, "immediate"),
            LivenessSpec::StdoutMatch(re) => write!(f, "stdout:{}", re.as_str()),
            LivenessSpec::Delay(d) => write!(f, "delay:{}ms", d.as_millis()),
        }
    }
}

impl FromStr for LivenessSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("immediate") {
            return Ok(LivenessSpec::Immediate);
        }
        match s.split_once(':') {
            Some(("stdout", pattern)) => Regex::new(pattern)
                .map(LivenessSpec::StdoutMatch)
                .map_err(|e| format!("invalid liveness regex '{pattern}': {e}")),
            Some(("delay", dur)) => parse_duration(dur).map(LivenessSpec::Delay),
            _ => Err(format!(
                "invalid liveness probe: {s} (expected \"immediate\", \"stdout:<regex>\" or \"delay:<duration>\")"
            )),
        }
    }
}

impl TryFrom<String> for LivenessSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
