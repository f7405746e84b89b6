//! Shape validation for the wire-level identifiers the spec pins down
//! exactly: E.164 numbers, tenant slugs, and message bodies. These are
//! deliberately format checks only, no normalization, no auto-prefixing,
//! matching the gateway's "does not normalize" stance on phone numbers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::MAX_MESSAGE_BODY_LEN;

static E164_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").unwrap());
static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

pub fn is_e164(value: &str) -> bool {
    E164_RE.is_match(value)
}

pub fn is_valid_slug(value: &str) -> bool {
    !value.is_empty() && SLUG_RE.is_match(value)
}

pub fn is_valid_message_body(value: &str) -> bool {
    !value.is_empty() && value.chars().count() <= MAX_MESSAGE_BODY_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e164_accepts_well_formed_numbers() {
        assert!(is_e164("+60123456789"));
        assert!(is_e164("+1234567890123"));
    }

    #[test]
    fn e164_rejects_missing_plus_or_leading_zero() {
        assert!(!is_e164("60123456789"));
        assert!(!is_e164("+0123456789"));
        assert!(!is_e164("+1"));
    }

    #[test]
    fn slug_rejects_uppercase_and_punctuation() {
        assert!(is_valid_slug("acme-corp"));
        assert!(!is_valid_slug("Acme_Corp"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn message_body_rejects_overlong_payloads() {
        assert!(is_valid_message_body("hello"));
        assert!(!is_valid_message_body(""));
        assert!(!is_valid_message_body(&"x".repeat(MAX_MESSAGE_BODY_LEN + 1)));
    }
}
