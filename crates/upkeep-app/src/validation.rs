// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    Missing,
    InvalidMoney,
    NegativeMoney,
    InvalidDate,
    InvalidNumber,
    NegativeNumber,
    InvalidText,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("required value is missing"),
            Self::InvalidMoney => f.write_str("invalid money value"),
            Self::NegativeMoney => f.write_str("negative money value"),
            Self::InvalidDate => f.write_str("invalid date value"),
            Self::InvalidNumber => f.write_str("invalid numeric value"),
            Self::NegativeNumber => f.write_str("negative numeric value"),
            Self::InvalidText => f.write_str("expected a non-empty string"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Converts a dollar amount to whole cents, rounding to the nearest cent.
pub fn dollars_to_cents(dollars: f64) -> ValidationResult<i64> {
    if !dollars.is_finite() {
        return Err(ValidationError::InvalidMoney);
    }
    if dollars < 0.0 {
        return Err(ValidationError::NegativeMoney);
    }
    let cents = (dollars * 100.0).round();
    if cents > i64::MAX as f64 {
        return Err(ValidationError::InvalidMoney);
    }
    Ok(cents as i64)
}

pub fn non_negative(value: f64) -> ValidationResult<f64> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidNumber);
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeNumber);
    }
    Ok(value)
}

pub fn format_cents(cents: i64) -> String {
    let (sign, cents) = normalize_sign(cents);
    let dollars = cents / 100;
    let remainder = cents % 100;
    format!("{sign}${}.{:02}", comma_format(dollars), remainder)
}

pub fn format_compact_cents(cents: i64) -> String {
    let (sign, cents) = normalize_sign(cents);
    let dollars = (cents as f64) / 100.0;
    if dollars < 1000.0 {
        return format!("{sign}${:.0}", dollars);
    }

    let (value, suffix) = if dollars < 1_000_000.0 {
        (dollars / 1000.0, "k")
    } else {
        (dollars / 1_000_000.0, "M")
    };

    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract().abs() < f64::EPSILON {
        format!("{sign}${:.0}{suffix}", rounded)
    } else {
        format!("{sign}${rounded:.1}{suffix}")
    }
}

pub fn format_hours(hours: f64) -> String {
    if hours.fract().abs() < f64::EPSILON {
        format!("{hours:.0}h")
    } else {
        format!("{hours:.1}h")
    }
}

/// Accepts calendar dates and the common ISO 8601 timestamp layouts.
pub fn parse_date(raw: &str) -> ValidationResult<Date> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing);
    }
    if let Ok(value) = Date::parse(trimmed, &format_description!("[year]-[month]-[day]")) {
        return Ok(value);
    }
    parse_datetime(trimmed).map(|value| value.date())
}

pub fn parse_datetime(raw: &str) -> ValidationResult<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(value);
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    ) {
        return Ok(value.assume_utc());
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    Err(ValidationError::InvalidDate)
}

pub fn format_date(value: Date) -> String {
    value
        .format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "1970-01-01".to_owned())
}

fn normalize_sign(cents: i64) -> (&'static str, i64) {
    if cents < 0 {
        ("-", cents.saturating_abs())
    } else {
        ("", cents)
    }
}

fn comma_format(value: i64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    #[test]
    fn dollars_round_to_nearest_cent() {
        assert_eq!(dollars_to_cents(120.0), Ok(12_000));
        assert_eq!(dollars_to_cents(19.999), Ok(2_000));
        assert_eq!(dollars_to_cents(-1.0), Err(ValidationError::NegativeMoney));
        assert_eq!(dollars_to_cents(f64::NAN), Err(ValidationError::InvalidMoney));
    }

    #[test]
    fn cents_format_with_grouping() {
        assert_eq!(format_cents(27_000), "$270.00");
        assert_eq!(format_cents(123_456_789), "$1,234,567.89");
        assert_eq!(format_cents(-550), "-$5.50");
    }

    #[test]
    fn compact_cents_abbreviate_thousands() {
        assert_eq!(format_compact_cents(12_700), "$127");
        assert_eq!(format_compact_cents(250_000), "$2.5k");
        assert_eq!(format_compact_cents(300_000_000), "$3M");
    }

    #[test]
    fn hours_drop_trailing_zero() {
        assert_eq!(format_hours(3.0), "3h");
        assert_eq!(format_hours(3.5), "3.5h");
    }

    #[test]
    fn parse_date_accepts_date_and_timestamp_layouts() -> Result<(), Box<dyn std::error::Error>> {
        let expected = Date::from_calendar_date(2024, Month::August, 1)?;
        assert_eq!(parse_date("2024-08-01")?, expected);
        assert_eq!(parse_date("2024-08-01T09:30:00Z")?, expected);
        assert_eq!(parse_date("2024-08-01T09:30:00.250")?, expected);
        assert_eq!(parse_date("2024-08-01 09:30:00")?, expected);
        Ok(())
    }

    #[test]
    fn parse_date_rejects_garbage_and_blank() {
        assert_eq!(parse_date("last tuesday"), Err(ValidationError::InvalidDate));
        assert_eq!(parse_date("2024-13-40"), Err(ValidationError::InvalidDate));
        assert_eq!(parse_date("  "), Err(ValidationError::Missing));
    }
}
