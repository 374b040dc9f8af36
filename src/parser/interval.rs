//! Interval strings and calendar alignment
//!
//! # Examples
//!
//! ```text
//! 5min        300
//! -1h         -3600
//! 1h30min     5400
//! 2weeks      1209600
//! ```

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use nom::{
    character::complete::{alpha0, digit1, one_of},
    combinator::opt,
    multi::many1,
    sequence::pair,
    IResult,
};
use thiserror::Error;

/// Errors from interval parsing and alignment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntervalError {
    #[error("unknown time units in '{0}'")]
    UnknownTimeUnits(String),

    #[error("invalid interval '{0}'")]
    InvalidInterval(String),
}

/// Calendar unit of an interval component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    /// 30 days
    Months,
    /// 365 days
    Years,
}

impl TimeUnit {
    /// Match a unit by prefix; `mon` wins over the bare `m` for minutes
    pub fn parse(unit: &str) -> Option<Self> {
        let unit = unit.to_ascii_lowercase();
        let unit = unit.as_str();
        if unit.is_empty() {
            return None;
        }
        Some(if unit.starts_with('s') {
            Self::Seconds
        } else if unit.starts_with("min") {
            Self::Minutes
        } else if unit.starts_with("mon") {
            Self::Months
        } else if unit.starts_with('m') {
            Self::Minutes
        } else if unit.starts_with('h') {
            Self::Hours
        } else if unit.starts_with('d') {
            Self::Days
        } else if unit.starts_with('w') {
            Self::Weeks
        } else if unit.starts_with('y') {
            Self::Years
        } else {
            return None;
        })
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
            Self::Weeks => 7 * 86_400,
            Self::Months => 30 * 86_400,
            Self::Years => 365 * 86_400,
        }
    }
}

fn interval_parts(input: &str) -> IResult<&str, (Option<char>, Vec<(&str, &str)>)> {
    pair(opt(one_of("+-")), many1(pair(digit1, alpha0)))(input)
}

/// Parse an interval into signed seconds
///
/// `default_sign` applies when the string carries no explicit sign.
pub fn parse_interval(s: &str, default_sign: i64) -> Result<i64, IntervalError> {
    let trimmed = s.trim();
    let (rest, (sign, parts)) =
        interval_parts(trimmed).map_err(|_| IntervalError::InvalidInterval(s.to_string()))?;
    if !rest.is_empty() {
        return Err(IntervalError::InvalidInterval(s.to_string()));
    }

    let mut total: i64 = 0;
    for (count, unit) in parts {
        let unit = TimeUnit::parse(unit).ok_or_else(|| IntervalError::UnknownTimeUnits(s.to_string()))?;
        let count: i64 = count
            .parse()
            .map_err(|_| IntervalError::InvalidInterval(s.to_string()))?;
        total = count
            .checked_mul(unit.seconds())
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| IntervalError::InvalidInterval(s.to_string()))?;
    }

    let sign = match sign {
        Some('-') => -1,
        Some(_) => 1,
        None if default_sign < 0 => -1,
        None => 1,
    };
    Ok(sign * total)
}

/// Truncate `from` (UTC) to the start of the unit named by `align_to`
///
/// Leading digits are ignored, so `1minutes` aligns to the minute. A weeks
/// unit may carry a trailing ISO weekday, `weeks5` aligning to Friday.
pub fn start_align_to(from: i64, align_to: &str) -> Result<i64, IntervalError> {
    let unit_text = align_to.trim_start_matches(|c: char| c.is_ascii_digit() || c == '+' || c == '-');
    let unit_name = unit_text.trim_end_matches(|c: char| c.is_ascii_digit());
    let unit = TimeUnit::parse(unit_name)
        .ok_or_else(|| IntervalError::UnknownTimeUnits(align_to.to_string()))?;

    let aligned = match unit {
        TimeUnit::Seconds => from,
        TimeUnit::Minutes => from - from.rem_euclid(60),
        TimeUnit::Hours => from - from.rem_euclid(3_600),
        TimeUnit::Days => from - from.rem_euclid(86_400),
        TimeUnit::Weeks => {
            let weekday: i64 = match &unit_text[unit_name.len()..] {
                "" => 1,
                digits => digits
                    .parse()
                    .ok()
                    .filter(|d| (1..=7).contains(d))
                    .ok_or_else(|| IntervalError::UnknownTimeUnits(align_to.to_string()))?,
            };
            let day = from.div_euclid(86_400);
            // 1970-01-01 was a Thursday, ISO weekday 4
            let iso = (day + 3).rem_euclid(7) + 1;
            (day - (iso - weekday).rem_euclid(7)) * 86_400
        }
        TimeUnit::Months | TimeUnit::Years => {
            let date = Utc
                .timestamp_opt(from, 0)
                .single()
                .ok_or_else(|| IntervalError::InvalidInterval(align_to.to_string()))?
                .date_naive();
            let month = if unit == TimeUnit::Months { date.month() } else { 1 };
            NaiveDate::from_ymd_opt(date.year(), month, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(|| IntervalError::InvalidInterval(align_to.to_string()))?
                .and_utc()
                .timestamp()
        }
    };
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval_units() {
        assert_eq!(parse_interval("5min", 1), Ok(300));
        assert_eq!(parse_interval("5m", 1), Ok(300));
        assert_eq!(parse_interval("30s", 1), Ok(30));
        assert_eq!(parse_interval("1seconds", 1), Ok(1));
        assert_eq!(parse_interval("2h", 1), Ok(7_200));
        assert_eq!(parse_interval("1d", 1), Ok(86_400));
        assert_eq!(parse_interval("1w", 1), Ok(604_800));
        assert_eq!(parse_interval("1mon", 1), Ok(2_592_000));
        assert_eq!(parse_interval("1months", 1), Ok(2_592_000));
        assert_eq!(parse_interval("1y", 1), Ok(31_536_000));
        assert_eq!(parse_interval("1h30min", 1), Ok(5_400));
    }

    #[test]
    fn test_parse_interval_sign() {
        assert_eq!(parse_interval("1h", -1), Ok(-3_600));
        assert_eq!(parse_interval("-1h", 1), Ok(-3_600));
        assert_eq!(parse_interval("+1h", -1), Ok(3_600));
    }

    #[test]
    fn test_parse_interval_errors() {
        assert_eq!(
            parse_interval("1fortnight", 1),
            Err(IntervalError::UnknownTimeUnits("1fortnight".to_string()))
        );
        assert_eq!(
            parse_interval("5", 1),
            Err(IntervalError::UnknownTimeUnits("5".to_string()))
        );
        assert_eq!(parse_interval("", 1), Err(IntervalError::InvalidInterval(String::new())));
        assert_eq!(
            parse_interval("min", 1),
            Err(IntervalError::InvalidInterval("min".to_string()))
        );
        assert_eq!(
            parse_interval("1h!", 1),
            Err(IntervalError::InvalidInterval("1h!".to_string()))
        );
    }

    #[test]
    fn test_start_align_to() {
        let from = 1_410_346_740;
        assert_eq!(start_align_to(from, "seconds"), Ok(from));
        assert_eq!(start_align_to(1_410_346_745, "1minutes"), Ok(1_410_346_740));
        assert_eq!(start_align_to(from, "hours"), Ok(1_410_343_200));
        assert_eq!(start_align_to(from, "days"), Ok(1_410_307_200));
        assert_eq!(start_align_to(from, "weeks"), Ok(1_410_134_400));
        assert_eq!(start_align_to(from, "weeks5"), Ok(1_409_875_200));
        assert_eq!(start_align_to(from, "months"), Ok(1_409_529_600));
        assert_eq!(start_align_to(from, "y"), Ok(1_388_534_400));
        assert!(start_align_to(from, "fortnight").is_err());
    }
}
