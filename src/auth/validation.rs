use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::auth::dto::RegisterRequest;

pub const NAME_MAX_CHARS: usize = 255;
pub const PASSWORD_MIN_CHARS: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Field name -> every reason that field was rejected.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, reason: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Registration input that passed every syntactic rule.
#[derive(Debug, Clone)]
pub struct ValidRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Check every registration rule and collect all failures, not just the first.
///
/// Email uniqueness needs the user store and is checked by the caller, which
/// appends to the same error map.
pub fn validate_registration(
    req: &RegisterRequest,
) -> Result<ValidRegistration, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let name = required_string(&mut errors, "name", req.name.as_ref()).map(str::trim);
    if let Some(name) = name {
        if name.chars().count() > NAME_MAX_CHARS {
            errors.add(
                "name",
                format!("The name field must not be greater than {NAME_MAX_CHARS} characters."),
            );
        }
    }

    let email = required_string(&mut errors, "email", req.email.as_ref()).map(normalize_email);
    if let Some(email) = &email {
        if !is_valid_email(email) {
            errors.add("email", "The email field must be a valid email address.");
        }
    }

    let password = required_string(&mut errors, "password", req.password.as_ref());
    if let Some(password) = password {
        let confirmation = req.password_confirmation.as_ref().and_then(Value::as_str);
        if confirmation != Some(password) {
            errors.add("password", "The password field confirmation does not match.");
        }
        if password.chars().count() < PASSWORD_MIN_CHARS {
            errors.add(
                "password",
                format!("The password field must be at least {PASSWORD_MIN_CHARS} characters."),
            );
        }
    }

    match (name, email, password) {
        (Some(name), Some(email), Some(password)) if errors.is_empty() => Ok(ValidRegistration {
            name: name.to_string(),
            email,
            password: password.to_string(),
        }),
        // every None above recorded an error
        _ => Err(errors),
    }
}

/// `required|string`: missing, null and empty values fail `required`; anything
/// present but not a JSON string fails `string`.
fn required_string<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&'a Value>,
) -> Option<&'a str> {
    match value {
        None | Some(Value::Null) => {
            errors.add(field, format!("The {field} field is required."));
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.add(field, format!("The {field} field is required."));
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            errors.add(field, format!("The {field} field must be a string."));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> RegisterRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn valid_registration_normalizes_email() {
        let ok = validate_registration(&request(json!({
            "name": "Ada Lovelace",
            "email": "  Ada@Example.COM ",
            "password": "analytical",
            "password_confirmation": "analytical",
        })))
        .unwrap();
        assert_eq!(ok.email, "ada@example.com");
        assert_eq!(ok.name, "Ada Lovelace");
    }

    #[test]
    fn name_is_trimmed_before_length_check_and_storage() {
        let padded = format!("  {}  ", "n".repeat(NAME_MAX_CHARS));
        let ok = validate_registration(&request(json!({
            "name": padded,
            "email": "ada@example.com",
            "password": "analytical",
            "password_confirmation": "analytical",
        })))
        .unwrap();
        assert_eq!(ok.name, "n".repeat(NAME_MAX_CHARS));
    }

    #[test]
    fn empty_body_reports_every_required_field() {
        let errors = validate_registration(&request(json!({}))).unwrap_err();
        assert_eq!(errors.field("name"), ["The name field is required."]);
        assert_eq!(errors.field("email"), ["The email field is required."]);
        assert_eq!(errors.field("password"), ["The password field is required."]);
    }

    #[test]
    fn collects_all_failures_across_fields() {
        let errors = validate_registration(&request(json!({
            "name": "x".repeat(256),
            "email": "not-an-email",
            "password": "short",
            "password_confirmation": "different",
        })))
        .unwrap_err();

        assert_eq!(errors.field("name").len(), 1);
        assert_eq!(
            errors.field("email"),
            ["The email field must be a valid email address."]
        );
        assert_eq!(
            errors.field("password"),
            [
                "The password field confirmation does not match.",
                "The password field must be at least 8 characters."
            ]
        );
    }

    #[test]
    fn mismatched_confirmation_fails_even_when_all_else_is_valid() {
        let errors = validate_registration(&request(json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "long-enough-password",
            "password_confirmation": "long-enough-passw0rd",
        })))
        .unwrap_err();
        assert!(errors.field("name").is_empty());
        assert_eq!(
            errors.field("password"),
            ["The password field confirmation does not match."]
        );
    }

    #[test]
    fn missing_confirmation_does_not_match() {
        let errors = validate_registration(&request(json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "long-enough-password",
        })))
        .unwrap_err();
        assert_eq!(errors.field("password").len(), 1);
    }

    #[test]
    fn non_string_fields_fail_the_string_rule() {
        let errors = validate_registration(&request(json!({
            "name": 42,
            "email": ["ada@example.com"],
            "password": 12345678,
            "password_confirmation": 12345678,
        })))
        .unwrap_err();
        assert_eq!(errors.field("name"), ["The name field must be a string."]);
        assert_eq!(errors.field("email"), ["The email field must be a string."]);
        assert_eq!(
            errors.field("password"),
            ["The password field must be a string."]
        );
    }

    #[test]
    fn name_limit_counts_characters_not_bytes() {
        let ok = validate_registration(&request(json!({
            "name": "é".repeat(255),
            "email": "ada@example.com",
            "password": "analytical",
            "password_confirmation": "analytical",
        })));
        assert!(ok.is_ok());
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("@c.de"));
    }
}
