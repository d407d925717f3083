//! ISO-8601 durations as announced in `refreshPeriod`.
//!
//! Calendar units use fixed sizes (a month is four weeks, a year is
//! 52 weeks of 4 weeks each) so the result never depends on a date.

use std::time::Duration;

use thiserror::Error;

const SECOND_MS: f64 = 1_000.0;
const MINUTE_MS: f64 = 60_000.0;
const HOUR_MS: f64 = 3_600_000.0;
const DAY_MS: f64 = 86_400_000.0;
const WEEK_MS: f64 = 604_800_000.0;
const MONTH_MS: f64 = 2_419_200_000.0;
const YEAR_MS: f64 = 125_798_400_000.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("duration is empty")]
    Empty,
    #[error("duration {0:?} does not start with 'P'")]
    MissingDesignator(String),
    #[error("duration {0:?} has no components")]
    NoComponents(String),
    #[error("duration {input:?} has an invalid component near {near:?}")]
    InvalidComponent { input: String, near: String },
    #[error("duration {0:?} is negative")]
    Negative(String),
}

/// Signed length of an ISO-8601 duration in milliseconds.
pub fn iso8601_millis(input: &str) -> Result<i64, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }
    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed),
    };
    let body = body
        .strip_prefix('P')
        .ok_or_else(|| DurationError::MissingDesignator(input.to_string()))?;
    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (body, None),
    };

    let mut total = 0.0;
    let mut components = 0;
    components += accumulate(
        input,
        date_part,
        &[('Y', YEAR_MS), ('M', MONTH_MS), ('W', WEEK_MS), ('D', DAY_MS)],
        &mut total,
    )?;
    if let Some(time) = time_part {
        let found = accumulate(
            input,
            time,
            &[('H', HOUR_MS), ('M', MINUTE_MS), ('S', SECOND_MS)],
            &mut total,
        )?;
        if found == 0 {
            return Err(DurationError::NoComponents(input.to_string()));
        }
        components += found;
    }
    if components == 0 {
        return Err(DurationError::NoComponents(input.to_string()));
    }
    Ok((sign * total).round() as i64)
}

/// Non-negative duration; negative periods are rejected.
pub fn iso8601_duration(input: &str) -> Result<Duration, DurationError> {
    let millis = iso8601_millis(input)?;
    if millis < 0 {
        return Err(DurationError::Negative(input.to_string()));
    }
    Ok(Duration::from_millis(millis as u64))
}

/// Walk `part` as `<number><unit>` pairs; units must appear in `units` order.
fn accumulate(
    input: &str,
    part: &str,
    units: &[(char, f64)],
    total: &mut f64,
) -> Result<usize, DurationError> {
    let invalid = |near: &str| DurationError::InvalidComponent {
        input: input.to_string(),
        near: near.to_string(),
    };
    let mut rest = part;
    let mut next_unit = 0;
    let mut found = 0;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
            .ok_or_else(|| invalid(rest))?;
        if digits == 0 {
            return Err(invalid(rest));
        }
        let value: f64 = rest[..digits]
            .replace(',', ".")
            .parse()
            .map_err(|_| invalid(rest))?;
        let unit = rest[digits..].chars().next().ok_or_else(|| invalid(rest))?;
        let position = units[next_unit..]
            .iter()
            .position(|(u, _)| *u == unit)
            .ok_or_else(|| invalid(rest))?;
        *total += value * units[next_unit + position].1;
        next_unit += position + 1;
        found += 1;
        rest = &rest[digits + unit.len_utf8()..];
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_and_minutes() {
        assert_eq!(iso8601_millis("PT1S"), Ok(1_000));
        assert_eq!(iso8601_millis("PT1.5S"), Ok(1_500));
        assert_eq!(iso8601_millis("PT0,25S"), Ok(250));
        assert_eq!(iso8601_millis("PT2M10S"), Ok(130_000));
        assert_eq!(iso8601_millis("PT1H"), Ok(3_600_000));
    }

    #[test]
    fn calendar_units_use_fixed_sizes() {
        assert_eq!(iso8601_millis("P1D"), Ok(86_400_000));
        assert_eq!(iso8601_millis("P1W"), Ok(604_800_000));
        assert_eq!(iso8601_millis("P1M"), Ok(2_419_200_000));
        assert_eq!(iso8601_millis("P1Y"), Ok(125_798_400_000));
        assert_eq!(iso8601_millis("P1DT1M"), Ok(86_460_000));
    }

    #[test]
    fn negative_durations_parse_but_are_not_periods() {
        assert_eq!(iso8601_millis("-PT3S"), Ok(-3_000));
        assert!(matches!(
            iso8601_duration("-PT3S"),
            Err(DurationError::Negative(_))
        ));
        assert_eq!(iso8601_duration("PT3S"), Ok(Duration::from_secs(3)));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(iso8601_millis(""), Err(DurationError::Empty));
        assert!(matches!(
            iso8601_millis("1S"),
            Err(DurationError::MissingDesignator(_))
        ));
        assert!(matches!(
            iso8601_millis("P"),
            Err(DurationError::NoComponents(_))
        ));
        assert!(matches!(
            iso8601_millis("PT"),
            Err(DurationError::NoComponents(_))
        ));
        assert!(matches!(
            iso8601_millis("PTS"),
            Err(DurationError::InvalidComponent { .. })
        ));
        assert!(matches!(
            iso8601_millis("PT1S2M"),
            Err(DurationError::InvalidComponent { .. })
        ));
    }
}
