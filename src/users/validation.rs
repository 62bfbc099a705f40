use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::users::{error::ValidationError, model::Role};

lazy_static! {
    // ASCII word characters only, matching the account e-mail format.
    static ref EMAIL_RE: Regex =
        RegexBuilder::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$")
            .unicode(false)
            .build()
            .expect("email regex compiles");
}

/// Trimmed, lower-cased form used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Blank phone numbers are treated as absent.
pub fn normalize_phone_number(phone: Option<String>) -> Option<String> {
    phone.filter(|p| !p.trim().is_empty())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_phone_number(phone: &str) -> bool {
    phone.len() == 10 && phone.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_valid_role(role: &str) -> bool {
    role.parse::<Role>().is_ok()
}

pub fn require<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// Field values checked before every write. `email` must already be normalized.
pub struct Fields<'a> {
    pub first_name: &'a str,
    pub email: &'a str,
    pub phone_number: Option<&'a str>,
}

/// Runs every schema rule in order and reports the first failure.
pub fn validate(fields: &Fields<'_>) -> Result<(), ValidationError> {
    require("firstName", Some(fields.first_name))?;
    let email = require("email", Some(fields.email))?;
    if !is_valid_email(email) {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    if let Some(phone) = fields.phone_number {
        if !is_valid_phone_number(phone) {
            return Err(ValidationError::InvalidPhoneNumber);
        }
    }
    Ok(())
}
