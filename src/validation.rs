// ✅ Field Validation
// Required / email / phone / date-window / amount / state checks.
// Every validator returns the NORMALIZED value on success.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

use crate::states;

/// Days after "today" that a bond may still take effect (inclusive)
pub const DATE_WINDOW_DAYS: i64 = 365;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

/// Inline, user-visible validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

// ============================================================================
// PATTERNS
// ============================================================================

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

fn e164_pattern() -> &'static Regex {
    static E164: OnceLock<Regex> = OnceLock::new();
    E164.get_or_init(|| Regex::new(r"^\+\d{10,15}$").expect("valid phone regex"))
}

// ============================================================================
// VALIDATORS
// ============================================================================

/// Trimmed value must be non-empty
pub fn require(field: &str, input: &str) -> ValidationResult<String> {
    let value = input.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, "Please enter a value to continue."));
    }
    Ok(value.to_string())
}

/// `local@domain.tld`
pub fn validate_email(field: &str, input: &str) -> ValidationResult<String> {
    let value = require(field, input)?;
    if !email_pattern().is_match(&value) {
        return Err(ValidationError::new(
            field,
            "Please enter a valid email address (name@example.com).",
        ));
    }
    Ok(value)
}

/// Strip non-digits and prefix a country code.
///
/// 10 digits → `+1XXXXXXXXXX`, 11 digits starting with 1 → `+1XXXXXXXXXX`,
/// anything else → `+` + digits. Returns None when no digits are present.
pub fn normalize_phone(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        0 => None,
        10 => Some(format!("+1{}", digits)),
        11 if digits.starts_with('1') => Some(format!("+{}", digits)),
        _ => Some(format!("+{}", digits)),
    }
}

/// Normalized phone must be E.164-like: `+` and 10–15 digits
pub fn validate_phone(field: &str, input: &str) -> ValidationResult<String> {
    require(field, input)?;

    match normalize_phone(input) {
        Some(phone) if e164_pattern().is_match(&phone) => Ok(phone),
        _ => Err(ValidationError::new(
            field,
            "Please enter a valid phone number, including area code.",
        )),
    }
}

/// Accepts `YYYY-MM-DD` or `MM/DD/YYYY`
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let value = input.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .ok()
}

/// Inclusive window [today, today + 365 days]
pub fn date_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today, today + Duration::days(DATE_WINDOW_DAYS))
}

pub fn validate_date(field: &str, input: &str, today: NaiveDate) -> ValidationResult<NaiveDate> {
    require(field, input)?;

    let date = parse_date(input).ok_or_else(|| {
        ValidationError::new(field, "Please enter a date as YYYY-MM-DD or MM/DD/YYYY.")
    })?;

    let (earliest, latest) = date_window(today);
    if date < earliest || date > latest {
        return Err(ValidationError::new(
            field,
            format!(
                "Please choose a date between {} and {}.",
                earliest.format("%Y-%m-%d"),
                latest.format("%Y-%m-%d")
            ),
        ));
    }

    Ok(date)
}

/// Keep digits and the decimal point, then parse: "$25,000.00" → 25000.0
pub fn parse_amount(input: &str) -> Option<f64> {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    cleaned.parse::<f64>().ok()
}

/// Canonical string form of an amount: whole numbers drop the fraction
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{:.0}", amount)
    } else {
        format!("{}", amount)
    }
}

/// Bond limit must be a positive number once formatting is stripped
pub fn validate_bond_limit(field: &str, input: &str) -> ValidationResult<String> {
    require(field, input)?;

    match parse_amount(input) {
        Some(amount) if amount > 0.0 => Ok(format_amount(amount)),
        _ => Err(ValidationError::new(
            field,
            "Please enter the bond amount as a number (e.g. 25000).",
        )),
    }
}

/// Known abbreviation or full name → full name
pub fn validate_state(field: &str, input: &str) -> ValidationResult<String> {
    let value = require(field, input)?;

    states::canonical(&value)
        .map(str::to_string)
        .ok_or_else(|| {
            ValidationError::new(field, "Please enter a US state name or 2-letter abbreviation.")
        })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_require_rejects_blank() {
        assert!(require("city", "   ").is_err());
        assert_eq!(require("city", "  Austin ").unwrap(), "Austin");
    }

    #[test]
    fn test_email_pattern() {
        assert_eq!(validate_email("email", " jo@acme.com ").unwrap(), "jo@acme.com");
        assert!(validate_email("email", "jo@acme").is_err());
        assert!(validate_email("email", "jo acme@x.com").is_err());
        assert!(validate_email("email", "@acme.com").is_err());
        assert!(validate_email("email", "").is_err());
    }

    #[test]
    fn test_phone_ten_digits_gets_us_prefix() {
        assert_eq!(normalize_phone("(512) 555-0142").as_deref(), Some("+15125550142"));
        assert_eq!(validate_phone("phone", "512.555.0142").unwrap(), "+15125550142");
    }

    #[test]
    fn test_phone_eleven_digits_with_leading_one() {
        assert_eq!(normalize_phone("1-512-555-0142").as_deref(), Some("+15125550142"));
        assert_eq!(
            normalize_phone("1-512-555-0142"),
            normalize_phone("512-555-0142")
        );
    }

    #[test]
    fn test_phone_international_and_invalid() {
        assert_eq!(validate_phone("phone", "+44 20 7946 0958").unwrap(), "+442079460958");
        assert!(validate_phone("phone", "555-0142").is_err());
        assert!(validate_phone("phone", "1234567890123456").is_err());
        assert!(validate_phone("phone", "call me").is_err());
        assert_eq!(normalize_phone("no digits"), None);
    }

    #[test]
    fn test_date_window_is_closed_interval() {
        let today = day("2026-10-16");

        assert!(validate_date("date", "2026-10-16", today).is_ok());
        assert!(validate_date("date", "2027-10-16", today).is_ok());
        assert_eq!(
            validate_date("date", "10/17/2026", today).unwrap(),
            day("2026-10-17")
        );

        assert!(validate_date("date", "2026-10-15", today).is_err());
        assert!(validate_date("date", "2027-10-17", today).is_err());
        assert!(validate_date("date", "tomorrow", today).is_err());
    }

    #[test]
    fn test_date_window_spans_365_days_across_leap_year() {
        let today = day("2027-06-01");
        let (start, end) = date_window(today);
        assert_eq!(start, today);
        assert_eq!(end, day("2028-05-31"));
    }

    #[test]
    fn test_bond_limit_strips_formatting() {
        assert_eq!(validate_bond_limit("bond_limit", "$25,000").unwrap(), "25000");
        assert_eq!(validate_bond_limit("bond_limit", "25000.00").unwrap(), "25000");
        assert_eq!(validate_bond_limit("bond_limit", "1500.50").unwrap(), "1500.5");
        assert!(validate_bond_limit("bond_limit", "lots").is_err());
        assert!(validate_bond_limit("bond_limit", "0").is_err());
        assert!(validate_bond_limit("bond_limit", "1.2.3").is_err());
    }

    #[test]
    fn test_state_validation_expands_abbreviation() {
        assert_eq!(validate_state("state", "tx").unwrap(), "Texas");
        assert_eq!(validate_state("state", "north carolina").unwrap(), "North Carolina");
        assert!(validate_state("state", "Gondor").is_err());
    }
}
