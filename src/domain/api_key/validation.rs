//! API key validation rules

use thiserror::Error;

use super::entity::Scope;

/// Errors raised while validating key input
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyValidationError {
    #[error("Key name cannot be empty")]
    EmptyName,

    #[error("Key name exceeds maximum length of {0} characters")]
    NameTooLong(usize),

    #[error("Unknown scope: '{0}'")]
    UnknownScope(String),

    #[error("At least one scope is required")]
    NoScopes,
}

const MAX_KEY_NAME_LENGTH: usize = 100;

/// Required prefix marker for every FinSight secret.
pub const SECRET_PREFIX: &str = "fsk_";

/// Minimum total length of a well-formed secret (`fsk_` + random body).
pub const MIN_SECRET_LENGTH: usize = 40;

/// Length of the display prefix extracted from a secret.
pub const DISPLAY_PREFIX_LENGTH: usize = 12;

/// Validate a key display name.
pub fn validate_key_name(name: &str) -> Result<(), ApiKeyValidationError> {
    if name.trim().is_empty() {
        return Err(ApiKeyValidationError::EmptyName);
    }

    if name.len() > MAX_KEY_NAME_LENGTH {
        return Err(ApiKeyValidationError::NameTooLong(MAX_KEY_NAME_LENGTH));
    }

    Ok(())
}

/// Parse a scope string against the fixed vocabulary.
pub fn parse_scope(scope: &str) -> Result<Scope, ApiKeyValidationError> {
    match scope {
        "read" => Ok(Scope::Read),
        "write" => Ok(Scope::Write),
        "admin" => Ok(Scope::Admin),
        other => Err(ApiKeyValidationError::UnknownScope(other.to_string())),
    }
}

/// True iff `scope` is a non-empty member of the scope vocabulary.
pub fn is_valid_scope(scope: &str) -> bool {
    parse_scope(scope).is_ok()
}

/// Parse a full scope list, rejecting empty lists and unknown entries.
pub fn parse_scopes<I, S>(scopes: I) -> Result<Vec<Scope>, ApiKeyValidationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parsed: Vec<Scope> = scopes
        .into_iter()
        .map(|s| parse_scope(s.as_ref()))
        .collect::<Result<_, _>>()?;

    if parsed.is_empty() {
        return Err(ApiKeyValidationError::NoScopes);
    }

    Ok(parsed)
}

/// Check a presented secret's shape before any store lookup.
///
/// A well-formed secret starts with `fsk_`, is at least 40 characters
/// overall, and its body is limited to `[A-Za-z0-9_]`. This is a cheap
/// gate, not an authenticity check.
pub fn is_valid_secret_format(secret: &str) -> bool {
    if !secret.starts_with(SECRET_PREFIX) {
        return false;
    }

    if secret.len() < MIN_SECRET_LENGTH {
        return false;
    }

    secret[SECRET_PREFIX.len()..]
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_key_names() {
        assert!(validate_key_name("Production Key").is_ok());
        assert!(validate_key_name("ci").is_ok());
    }

    #[test]
    fn test_empty_key_name() {
        assert_eq!(
            validate_key_name("   "),
            Err(ApiKeyValidationError::EmptyName)
        );
    }

    #[test]
    fn test_key_name_too_long() {
        let long = "a".repeat(101);
        assert_eq!(
            validate_key_name(&long),
            Err(ApiKeyValidationError::NameTooLong(100))
        );
    }

    #[test]
    fn test_scope_vocabulary() {
        assert!(is_valid_scope("read"));
        assert!(is_valid_scope("write"));
        assert!(is_valid_scope("admin"));
        assert!(!is_valid_scope(""));
        assert!(!is_valid_scope("READ"));
        assert!(!is_valid_scope("delete"));
    }

    #[test]
    fn test_parse_scopes_rejects_unknown() {
        let result = parse_scopes(["read", "billing"]);
        assert_eq!(
            result,
            Err(ApiKeyValidationError::UnknownScope("billing".to_string()))
        );
    }

    #[test]
    fn test_parse_scopes_rejects_empty_list() {
        let empty: [&str; 0] = [];
        assert_eq!(parse_scopes(empty), Err(ApiKeyValidationError::NoScopes));
    }

    #[test]
    fn test_secret_format_accepts_well_formed() {
        let secret = format!("fsk_{}", "a".repeat(40));
        assert!(is_valid_secret_format(&secret));
    }

    #[test]
    fn test_secret_format_rejects_missing_prefix() {
        let secret = format!("sk_{}", "a".repeat(40));
        assert!(!is_valid_secret_format(&secret));
        assert!(!is_valid_secret_format(""));
    }

    #[test]
    fn test_secret_format_rejects_short_input() {
        assert!(!is_valid_secret_format("fsk_abc123"));
    }

    #[test]
    fn test_secret_format_rejects_bad_characters() {
        let secret = format!("fsk_{}!", "a".repeat(40));
        assert!(!is_valid_secret_format(&secret));

        let secret = format!("fsk_{} {}", "a".repeat(20), "b".repeat(20));
        assert!(!is_valid_secret_format(&secret));
    }
}
