use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Hours,
    Minutes,
    Seconds,
}

impl Unit {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(Unit::Hours),
            "m" | "min" | "mins" | "minute" | "minutes" => Some(Unit::Minutes),
            "s" | "sec" | "secs" | "second" | "seconds" => Some(Unit::Seconds),
            _ => None,
        }
    }

    fn seconds(self) -> u64 {
        match self {
            Unit::Hours => 3600,
            Unit::Minutes => 60,
            Unit::Seconds => 1,
        }
    }
}

fn duration_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    // Unit words are matched whole so "min" can never be read as seconds.
    TOKEN.get_or_init(|| Regex::new(r"([0-9]+)\s*([a-z]+)").expect("duration regex is valid"))
}

/// Parse a free-text duration label such as `"3 h 1 min 23 s"` into seconds.
///
/// Returns `None` when the text holds no hour, minute or second token, which
/// keeps "no duration shown" apart from a genuine `0 s`. Only the first
/// occurrence of each unit counts; missing units contribute nothing.
pub fn parse_duration(text: &str) -> Option<u64> {
    let lowered = text.trim().to_lowercase();

    let mut hours: Option<u64> = None;
    let mut minutes: Option<u64> = None;
    let mut seconds: Option<u64> = None;

    for caps in duration_token().captures_iter(&lowered) {
        let Some(unit) = Unit::from_token(&caps[2]) else {
            continue;
        };
        // Absurdly long digit runs saturate instead of being dropped.
        let value = caps[1].parse::<u64>().unwrap_or(u64::MAX);
        let slot = match unit {
            Unit::Hours => &mut hours,
            Unit::Minutes => &mut minutes,
            Unit::Seconds => &mut seconds,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    if hours.is_none() && minutes.is_none() && seconds.is_none() {
        return None;
    }

    let total = [
        (hours, Unit::Hours),
        (minutes, Unit::Minutes),
        (seconds, Unit::Seconds),
    ]
    .into_iter()
    .fold(0u64, |acc, (value, unit)| {
        acc.saturating_add(value.unwrap_or(0).saturating_mul(unit.seconds()))
    });

    Some(total)
}
