//! Subject and name validation shared by the configuration builders.
//!
//! Subjects may contain the wildcards `*` and `>`; stream names, consumer
//! durable names, and subject *tokens* used as identifiers may not. This
//! mirrors the distinction the NATS server itself draws between a subject
//! pattern and a bare name.

use once_cell::sync::Lazy;
use regex::Regex;

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\s\.\*>]"#).expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s").expect("valid regex"));

/// True if `name` is safe to use as a stream name, consumer durable name, or
/// other server-side identifier: no whitespace, no wildcards, no `.`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !INVALID_NAME_CHARS.is_match(name)
}

/// True if `subject` is a syntactically plausible publish/subscribe subject:
/// non-empty, no whitespace. Wildcards are allowed here, unlike in names.
pub fn is_valid_subject(subject: &str) -> bool {
    !subject.is_empty() && !WHITESPACE.is_match(subject)
}

/// True if `prefix` is usable as a JetStream API prefix: non-empty and free
/// of the wildcard characters `>` and `*`.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && !prefix.contains('>') && !prefix.contains('*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wildcards_and_dots_in_names() {
        assert!(is_valid_name("orders"));
        assert!(!is_valid_name("orders.>"));
        assert!(!is_valid_name("orders.*"));
        assert!(!is_valid_name("order s"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn allows_wildcards_in_subjects() {
        assert!(is_valid_subject("orders.*"));
        assert!(is_valid_subject("orders.>"));
        assert!(!is_valid_subject("orders with spaces"));
        assert!(!is_valid_subject(""));
    }

    #[test]
    fn prefix_rejects_wildcards_only() {
        assert!(is_valid_prefix("$JS.API."));
        assert!(!is_valid_prefix("$JS.API.>"));
        assert!(!is_valid_prefix("*"));
        assert!(!is_valid_prefix(""));
    }
}
