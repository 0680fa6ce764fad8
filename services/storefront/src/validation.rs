//! Input validation utilities

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;

use crate::error::ApiError;

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    })
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    if !email_regex().is_match(email) {
        return Err("Invalid email".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 6 {
        return Err("Password must be at least 6 characters long".to_string());
    }

    Ok(())
}

/// Require at least `min` characters
pub fn validate_min_length(value: &str, min: usize) -> Result<(), String> {
    if value.chars().count() < min {
        return Err(format!("Must contain at least {} character(s)", min));
    }
    Ok(())
}

/// Require `value` to be one of `allowed`
pub fn validate_one_of(value: &str, allowed: &[&str]) -> Result<(), String> {
    if !allowed.contains(&value) {
        return Err(format!("Expected one of: {}", allowed.join(", ")));
    }
    Ok(())
}

/// Validate a service identifier slug
pub fn validate_service_id(id: &str) -> Result<(), String> {
    static SLUG_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex =
        SLUG_REGEX.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("Failed to compile slug regex"));

    if !regex.is_match(id) {
        return Err("Only lowercase letters, digits and dashes are allowed".to_string());
    }
    Ok(())
}

/// Validate an absolute http(s) URL
pub fn validate_url(url: &str) -> Result<(), String> {
    static URL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = URL_REGEX
        .get_or_init(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("Failed to compile url regex"));

    if !regex.is_match(url) {
        return Err("Invalid url".to_string());
    }
    Ok(())
}

/// Validate a `YYYY-MM-DD` calendar date
pub fn validate_date(date: &str) -> Result<(), String> {
    static DATE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = DATE_REGEX
        .get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Failed to compile date regex"));

    if !regex.is_match(date) || chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return Err("Expected a date as YYYY-MM-DD".to_string());
    }
    Ok(())
}

/// Validate an `HH:MM` time of day
pub fn validate_time(time: &str) -> Result<(), String> {
    static TIME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex =
        TIME_REGEX.get_or_init(|| Regex::new(r"^\d{2}:\d{2}$").expect("Failed to compile time regex"));

    if !regex.is_match(time) || chrono::NaiveTime::parse_from_str(time, "%H:%M").is_err() {
        return Err("Expected a time as HH:MM".to_string());
    }
    Ok(())
}

/// Derive a URL-safe identifier from a title
///
/// Runs of anything other than lowercase letters and digits collapse into a
/// single dash; leading and trailing dashes are removed.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Collects per-field errors and turns them into `ApiError::InvalidPayload`
#[derive(Debug, Default)]
pub struct Validator {
    field_errors: BTreeMap<&'static str, Vec<String>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, field: &'static str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.field_errors.entry(field).or_default().push(message);
        }
        self
    }

    /// Record an error when a required field is absent
    pub fn require<T>(&mut self, field: &'static str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.field_errors
                .entry(field)
                .or_default()
                .push("Required".to_string());
        }
        value
    }

    pub fn is_valid(&self) -> bool {
        self.field_errors.is_empty()
    }

    pub fn finish(&self) -> Result<(), ApiError> {
        if self.is_valid() {
            return Ok(());
        }
        Err(ApiError::InvalidPayload(json!({
            "formErrors": [],
            "fieldErrors": self.field_errors,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("Jane.Doe+shop@mail.example.co").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("test").is_err());
        assert!(validate_email("test@").is_err());
        assert!(validate_email("test@example").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Phone Repairs"), "phone-repairs");
        assert_eq!(slugify("  Laptops -- Brand New!  "), "laptops-brand-new");
        assert_eq!(slugify("iOS/Android"), "ios-android");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_validate_service_id() {
        assert!(validate_service_id("dev-web").is_ok());
        assert!(validate_service_id("Dev Web").is_err());
        assert!(validate_service_id("").is_err());
    }

    #[test]
    fn test_validate_date_and_time() {
        assert!(validate_date("2025-03-14").is_ok());
        assert!(validate_date("2025-02-30").is_err());
        assert!(validate_date("14/03/2025").is_err());
        assert!(validate_time("09:30").is_ok());
        assert!(validate_time("9:30").is_err());
        assert!(validate_time("25:00").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://cdn.example.com/x1.png").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_validator_collects_field_errors() {
        let mut validator = Validator::new();
        validator
            .check("email", validate_email("nope"))
            .check("password", validate_password("123"))
            .check("name", validate_min_length("Jane", 1));
        let missing: Option<&str> = validator.require("message", None);
        assert!(missing.is_none());

        match validator.finish() {
            Err(ApiError::InvalidPayload(details)) => {
                assert_eq!(details["fieldErrors"]["email"][0], "Invalid email");
                assert!(details["fieldErrors"]["password"].is_array());
                assert_eq!(details["fieldErrors"]["message"][0], "Required");
                assert!(details["fieldErrors"].get("name").is_none());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
