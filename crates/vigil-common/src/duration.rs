//! Human duration grammar used by decision lifetimes and time-window filters.
//!
//! A duration is an optionally signed sequence of decimal numbers, each with
//! an optional fraction and a mandatory unit suffix, such as `"72h"`,
//! `"1h30m"`, `"1.5h"`, `"-4h"` or `"250ms"`. Valid units are `ns`, `us`
//! (or `µs`), `ms`, `s`, `m` and `h`. The bare string `"0"` is also accepted.
//!
//! # Examples
//!
//! ```
//! use chrono::Duration;
//! use vigil_common::duration::parse_duration;
//!
//! assert_eq!(parse_duration("4h").unwrap(), Duration::hours(4));
//! assert_eq!(parse_duration("1h30m").unwrap(), Duration::minutes(90));
//! assert_eq!(parse_duration("-1h").unwrap(), Duration::hours(-1));
//! assert!(parse_duration("4").is_err());
//! ```

use chrono::Duration;

const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

/// Fractions beyond this many digits cannot change a nanosecond result.
const MAX_FRACTION_DIGITS: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("invalid duration '{0}'")]
    Invalid(String),

    #[error("missing unit in duration '{0}'")]
    MissingUnit(String),

    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit { unit: String, input: String },

    #[error("duration '{0}' is out of range")]
    Overflow(String),
}

/// Parses a duration such as `"72h"` into a signed [`chrono::Duration`].
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };
    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let overflow = || DurationError::Overflow(input.to_string());
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = leading_digits(rest);
        let (int_part, after) = rest.split_at(int_len);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(tail) => tail.split_at(leading_digits(tail)),
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationError::Invalid(input.to_string()));
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        let scale = match UNITS.iter().find(|(name, _)| *name == unit) {
            Some((_, scale)) => *scale,
            None if unit.is_empty() => return Err(DurationError::MissingUnit(input.to_string())),
            None => {
                return Err(DurationError::UnknownUnit {
                    unit: unit.to_string(),
                    input: input.to_string(),
                })
            }
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;
        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
            let fraction: u128 = digits.parse().map_err(|_| overflow())?;
            let frac_nanos = fraction * scale / 10u128.pow(digits.len() as u32);
            nanos = nanos.checked_add(frac_nanos).ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        if total > i64::MAX as u128 {
            return Err(overflow());
        }
        rest = after;
    }

    let nanos = total as i64;
    Ok(Duration::nanoseconds(if negative { -nanos } else { nanos }))
}

fn leading_digits(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("72h").unwrap(), Duration::hours(72));
        assert_eq!(parse_duration("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_duration("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::milliseconds(250));
        assert_eq!(parse_duration("7us").unwrap(), Duration::microseconds(7));
        assert_eq!(parse_duration("7µs").unwrap(), Duration::microseconds(7));
        assert_eq!(parse_duration("9ns").unwrap(), Duration::nanoseconds(9));
    }

    #[test]
    fn parses_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::milliseconds(500));
        assert_eq!(
            parse_duration("2h45m30.5s").unwrap(),
            Duration::hours(2) + Duration::minutes(45) + Duration::milliseconds(30_500)
        );
    }

    #[test]
    fn parses_sign_and_zero() {
        assert_eq!(parse_duration("0").unwrap(), Duration::zero());
        assert_eq!(parse_duration("-0").unwrap(), Duration::zero());
        assert_eq!(parse_duration("-1h").unwrap(), Duration::hours(-1));
        assert_eq!(parse_duration("+10m").unwrap(), Duration::minutes(10));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_duration(""), Err(DurationError::Invalid(String::new())));
        assert!(matches!(parse_duration("-"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("."), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("h"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("10"), Err(DurationError::MissingUnit(_))));
        assert!(matches!(
            parse_duration("3d"),
            Err(DurationError::UnknownUnit { ref unit, .. }) if unit == "d"
        ));
        assert!(matches!(
            parse_duration("2024-01-01T00:00:00Z"),
            Err(DurationError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn rejects_overflow() {
        assert!(matches!(
            parse_duration("9999999999999999h"),
            Err(DurationError::Overflow(_))
        ));
        // whole part fits u128 after scaling, the fraction pushes it over
        assert!(matches!(
            parse_duration("94522879700260684295381835.9h"),
            Err(DurationError::Overflow(_))
        ));
        assert!(matches!(
            parse_duration("2562047h47m16.854775808s"),
            Err(DurationError::Overflow(_))
        ));
        assert_eq!(
            parse_duration("2562047h47m16.854775807s").unwrap(),
            Duration::nanoseconds(i64::MAX)
        );
    }
}
