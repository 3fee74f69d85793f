//! Request body validation.
//!
//! Every rule runs; failures are collected rather than returned on the first one.

use serde::Serialize;

use super::error::ApiError;

const MIN_NAME_LENGTH: usize = 3;
const MIN_PASSWORD_LENGTH: usize = 8;
const PASSWORD_SPECIALS: &str = "@$!%*?&";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// Collects field errors for one request.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&mut self, ok: bool, field: &'static str, message: &'static str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError { field, message });
        }
        self
    }

    pub fn name(&mut self, name: &str) -> &mut Self {
        self.check(
            name.trim().chars().count() >= MIN_NAME_LENGTH,
            "name",
            "Username must be at least 3 characters long",
        )
    }

    pub fn email(&mut self, email: &str) -> &mut Self {
        self.check(is_email(email), "email", "Email format: abcd@example.com")
    }

    pub fn password(&mut self, password: &str) -> &mut Self {
        self.check(
            is_strong_password(password),
            "password",
            "Password must be 8+ chars, with upper, lower, number & special char",
        )
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

/// Loose structural email check: one `@`, non-empty local part, dotted domain.
fn is_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

/// At least 8 characters from letters, digits and `@$!%*?&`, with one of each class.
fn is_strong_password(password: &str) -> bool {
    let allowed = |c: char| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c);

    password.chars().count() >= MIN_PASSWORD_LENGTH
        && password.chars().all(allowed)
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c))
}
