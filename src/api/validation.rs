//! Input validation for API requests.
//!
//! Each function returns `Err(message)` describing the first problem found.
//! Collect them into an `ApiError` with `ValidationErrorBuilder` from the
//! `error` module.

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{SignupRequest, UpdateAccountRequest};

use super::error::{ApiError, ValidationErrorBuilder};

pub const MAX_PASSWORD_LEN: usize = 128;
pub const MAX_CALORIE_GOAL: i64 = 20_000;
pub const MAX_PREFERENCES_LEN: usize = 1000;

lazy_static! {
    /// Letters, digits, underscore, dot and dash
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap();

    /// Deliberately loose: one @, no whitespace, a dot in the domain
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Validate a username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".to_string(),
        );
    }

    Ok(())
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a plaintext password before hashing
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    // Argon2 cost grows with input size
    if password.len() > MAX_PASSWORD_LEN {
        return Err(format!(
            "Password is too long (max {} characters)",
            MAX_PASSWORD_LEN
        ));
    }

    Ok(())
}

pub fn validate_calorie_goal(goal: i64) -> Result<(), String> {
    if !(0..=MAX_CALORIE_GOAL).contains(&goal) {
        return Err(format!(
            "Daily calorie goal must be between 0 and {}",
            MAX_CALORIE_GOAL
        ));
    }
    Ok(())
}

pub fn validate_preferences(preferences: &str) -> Result<(), String> {
    if preferences.chars().count() > MAX_PREFERENCES_LEN {
        return Err(format!(
            "Dietary preferences are too long (max {} characters)",
            MAX_PREFERENCES_LEN
        ));
    }
    Ok(())
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = ValidationErrorBuilder::new();
        errors
            .check("username", validate_username(self.username.trim()))
            .check("email", validate_email(self.email.trim()))
            .check("password", validate_password(&self.password));
        errors.finish()
    }
}

impl UpdateAccountRequest {
    /// Only fields that are present are checked
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = ValidationErrorBuilder::new();
        if let Some(email) = &self.email {
            errors.check("email", validate_email(email.trim()));
        }
        if let Some(password) = &self.password {
            errors.check("password", validate_password(password));
        }
        if let Some(goal) = self.daily_calorie_goal {
            errors.check("daily_calorie_goal", validate_calorie_goal(goal));
        }
        if let Some(preferences) = &self.dietary_preferences {
            errors.check("dietary_preferences", validate_preferences(preferences));
        }
        errors.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("bob_the.cook-2").is_ok());
        assert!(validate_username("abc").is_ok());

        assert!(validate_username("").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("a/b/c").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("first.last+tag@mail.example.org").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@nodot").is_err());
        assert!(validate_email("a b@x.com").is_err());
        assert!(validate_email("a@@x.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("pw1").is_ok());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LEN)).is_ok());

        assert!(validate_password("").is_err());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_calorie_goal() {
        assert!(validate_calorie_goal(0).is_ok());
        assert!(validate_calorie_goal(2000).is_ok());
        assert!(validate_calorie_goal(MAX_CALORIE_GOAL).is_ok());
        assert!(validate_calorie_goal(-1).is_err());
        assert!(validate_calorie_goal(MAX_CALORIE_GOAL + 1).is_err());
    }

    #[test]
    fn test_validate_preferences() {
        assert!(validate_preferences("").is_ok());
        assert!(validate_preferences("vegetarian, no nuts").is_ok());
        assert!(validate_preferences(&"é".repeat(MAX_PREFERENCES_LEN)).is_ok());
        assert!(validate_preferences(&"x".repeat(MAX_PREFERENCES_LEN + 1)).is_err());
    }

    #[test]
    fn test_signup_request_collects_all_errors() {
        let req = SignupRequest {
            username: "a".to_string(),
            email: "bad".to_string(),
            password: String::new(),
        };
        let err = req.validate().unwrap_err();
        assert!(err.message().contains("3 fields"));
    }

    #[test]
    fn test_update_request_checks_only_present_fields() {
        assert!(UpdateAccountRequest::default().validate().is_ok());

        let req = UpdateAccountRequest {
            daily_calorie_goal: Some(-5),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }
}
