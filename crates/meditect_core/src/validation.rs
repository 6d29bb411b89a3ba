//! Input checks applied before registration reaches the auth service.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::AuthError;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
        .is_match(email)
}

pub fn validate_registration(email: &str, password: &str, name: &str) -> Result<(), AuthError> {
    if !is_valid_email(email) {
        return Err(AuthError::InvalidInput("Please enter a valid email address".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if name.trim().is_empty() {
        return Err(AuthError::InvalidInput("Please enter your name".into()));
    }
    Ok(())
}
