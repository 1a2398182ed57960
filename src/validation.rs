//! Input validation for directory commands
//!
//! Validates and sanitizes caller input before any external call is made.
//! Every failure is a [`DirectoryError::Validation`] naming the offending field.

use crate::error::{DirectoryError, DirectoryResult};

/// Maximum UPN length accepted by the directory
const MAX_UPN_LENGTH: usize = 113;

/// Maximum display name length
const MAX_DISPLAY_NAME_LENGTH: usize = 256;

/// Maximum mail nickname length
const MAX_MAIL_NICKNAME_LENGTH: usize = 64;

/// Validate a user principal name and return its normalized (trimmed,
/// lower-cased) form
pub fn validate_upn(upn: &str) -> DirectoryResult<String> {
    let trimmed = upn.trim();

    if trimmed.is_empty() {
        return Err(DirectoryError::validation("upn", "must not be empty"));
    }
    if trimmed.chars().count() > MAX_UPN_LENGTH {
        return Err(DirectoryError::validation(
            "upn",
            format!("exceeds {MAX_UPN_LENGTH} characters"),
        ));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(DirectoryError::validation("upn", "must not contain whitespace"));
    }

    let mut parts = trimmed.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => {
            return Err(DirectoryError::validation(
                "upn",
                "must contain exactly one '@'",
            ))
        }
    };

    if local.is_empty() {
        return Err(DirectoryError::validation("upn", "local part is empty"));
    }
    if domain.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.')
    {
        return Err(DirectoryError::validation(
            "upn",
            format!("invalid domain '{domain}'"),
        ));
    }

    Ok(trimmed.to_lowercase())
}

/// Validate a display name and return it trimmed
pub fn validate_display_name(name: &str) -> DirectoryResult<String> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(DirectoryError::validation("display_name", "must not be empty"));
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(DirectoryError::validation(
            "display_name",
            format!("exceeds {MAX_DISPLAY_NAME_LENGTH} characters"),
        ));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(DirectoryError::validation(
            "display_name",
            "must not contain control characters",
        ));
    }

    Ok(trimmed.to_string())
}

/// Sanitize a mail nickname to `[a-z0-9._-]`, at most 64 characters
pub fn sanitize_mail_nickname(raw: &str) -> DirectoryResult<String> {
    let sanitized: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_MAIL_NICKNAME_LENGTH)
        .collect();

    let sanitized = sanitized.trim_matches('.').to_string();
    if sanitized.is_empty() {
        return Err(DirectoryError::validation(
            "mail_nickname",
            format!("'{raw}' has no usable characters"),
        ));
    }
    Ok(sanitized)
}

/// Mail nickname derived from the UPN's local part
pub fn derive_mail_nickname(upn: &str) -> String {
    let local = upn.split('@').next().unwrap_or(upn);
    sanitize_mail_nickname(local).unwrap_or_else(|_| "user".to_string())
}

/// Validate an opaque directory id (team id, SKU id, membership id)
pub fn validate_id(field: &str, id: &str) -> DirectoryResult<String> {
    let trimmed = id.trim();

    if trimmed.is_empty() {
        return Err(DirectoryError::validation(field, "must not be empty"));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(DirectoryError::validation(
            field,
            "must not contain whitespace or '/'",
        ));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_upns_are_normalized() {
        assert_eq!(
            validate_upn("  Ada.Lovelace@School.EDU ").unwrap(),
            "ada.lovelace@school.edu"
        );
    }

    #[test]
    fn test_invalid_upns() {
        for upn in [
            "",
            "no-at-sign",
            "two@@school.edu",
            "a@b@school.edu",
            "@school.edu",
            "ada@localhost",
            "ada@.edu",
            "ada lovelace@school.edu",
        ] {
            assert!(validate_upn(upn).is_err(), "{upn} should be rejected");
        }

        let long = format!("{}@school.edu", "a".repeat(110));
        assert!(validate_upn(&long).is_err());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(validate_display_name("  7B Science ").unwrap(), "7B Science");
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name("bad\u{0007}name").is_err());
        assert!(validate_display_name(&"x".repeat(257)).is_err());
    }

    #[test]
    fn test_mail_nickname_sanitization() {
        assert_eq!(sanitize_mail_nickname("Ada Lovelace!").unwrap(), "adalovelace");
        assert_eq!(derive_mail_nickname("o'brien.sean@school.edu"), "obrien.sean");
        assert!(sanitize_mail_nickname("!!!").is_err());
        assert_eq!(sanitize_mail_nickname(&"a".repeat(100)).unwrap().len(), 64);
    }

    #[test]
    fn test_ids() {
        assert_eq!(validate_id("team_id", " abc-123 ").unwrap(), "abc-123");
        assert!(validate_id("team_id", "").is_err());
        assert!(validate_id("team_id", "a/b").is_err());
        assert!(validate_id("sku_id", "a b").is_err());
    }

    proptest! {
        #[test]
        fn sanitized_nicknames_use_allowed_alphabet(raw in "\\PC{1,80}") {
            if let Ok(nickname) = sanitize_mail_nickname(&raw) {
                prop_assert!(nickname.len() <= 64);
                prop_assert!(nickname
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')));
            }
        }
    }
}
