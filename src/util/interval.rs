use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("Empty interval")]
    Empty,
    #[error("Invalid interval '{0}': expected a number with an optional s/m/h/d/w suffix")]
    Invalid(String),
    #[error("Interval '{0}' is too large")]
    Overflow(String),
}

/// Parse a polling interval such as `90`, `45s`, `15m`, `8h`, `1d` or `2w`.
///
/// A bare number is seconds. Suffixes are case-insensitive and may be
/// separated from the number by whitespace.
pub fn parse_interval(input: &str) -> Result<Duration, IntervalError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IntervalError::Empty);
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| IntervalError::Invalid(input.to_string()))?;

    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => return Err(IntervalError::Invalid(input.to_string())),
    };

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| IntervalError::Overflow(input.to_string()))
}
