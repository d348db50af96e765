//! # Normalization
//!
//! String normalization shared by the claim ledger, the frontier and the graph.
//!
//! Every index key in the store is built from these functions, so changing one
//! changes which records are considered duplicates.

use crate::ClaimGraphError;
use crate::primitives::{MAX_KEY_LENGTH, MAX_VALUE_LENGTH};

/// Separator used inside composite index keys.
pub(crate) const KEY_SEP: &str = "\u{1f}";

/// Canonical identity key: uppercase, ASCII alphanumerics only.
///
/// `"ce-285a"`, `"CE 285A"` and `"CE285A"` all map to `"CE285A"`.
#[must_use]
pub fn canonical_key(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Case-folded alias form used by case-insensitive identity lookups.
#[must_use]
pub fn fold_alias(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalized claim value: trimmed, inner whitespace collapsed, lowercased.
#[must_use]
pub fn normalize_value(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lowercased host of a URL with any leading `www.` removed.
///
/// Returns `None` when the URL cannot be parsed or has no host.
#[must_use]
pub fn domain_of(raw_url: &str) -> Option<String> {
    let parsed = url::Url::parse(raw_url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Normalize a bare domain the same way [`domain_of`] normalizes URL hosts.
#[must_use]
pub fn normalize_domain(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    lowered
        .strip_prefix("www.")
        .unwrap_or(&lowered)
        .to_string()
}

/// Validate a string that becomes part of a composite index key.
///
/// Rejects empty strings, overlong strings, and control characters (which
/// would collide with [`KEY_SEP`]).
pub fn validate_key(label: &str, value: &str) -> Result<(), ClaimGraphError> {
    if value.trim().is_empty() {
        return Err(ClaimGraphError::InvalidInput(format!("{label} is empty")));
    }
    if value.len() > MAX_KEY_LENGTH {
        return Err(ClaimGraphError::InvalidInput(format!(
            "{label} length {} exceeds maximum {} bytes",
            value.len(),
            MAX_KEY_LENGTH
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(ClaimGraphError::InvalidInput(format!(
            "{label} contains control characters"
        )));
    }
    Ok(())
}

/// Validate a free-form value (frontier task value, claim value).
///
/// Same rules as [`validate_key`] with the larger [`MAX_VALUE_LENGTH`] limit.
pub fn validate_value(label: &str, value: &str) -> Result<(), ClaimGraphError> {
    if value.trim().is_empty() {
        return Err(ClaimGraphError::InvalidInput(format!("{label} is empty")));
    }
    if value.len() > MAX_VALUE_LENGTH {
        return Err(ClaimGraphError::InvalidInput(format!(
            "{label} length {} exceeds maximum {} bytes",
            value.len(),
            MAX_VALUE_LENGTH
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(ClaimGraphError::InvalidInput(format!(
            "{label} contains control characters"
        )));
    }
    Ok(())
}

/// Join key parts with [`KEY_SEP`].
pub(crate) fn compose_key(parts: &[&str]) -> String {
    parts.join(KEY_SEP)
}

/// Half-open bounds covering every key that starts with `prefix` + [`KEY_SEP`].
///
/// The upper bound replaces the separator with the next code point, so the
/// range is exact as long as key parts never contain control characters.
pub(crate) fn prefix_bounds(prefix: &str) -> (String, String) {
    let mut start = String::with_capacity(prefix.len() + 1);
    start.push_str(prefix);
    start.push_str(KEY_SEP);
    let mut end = String::with_capacity(prefix.len() + 1);
    end.push_str(prefix);
    end.push('\u{20}');
    (start, end)
}

/// Zero-padded decimal so numeric key parts sort lexicographically.
pub(crate) fn padded(n: u64) -> String {
    format!("{n:020}")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_strips_punctuation_and_uppercases() {
        assert_eq!(canonical_key("ce-285a"), "CE285A");
        assert_eq!(canonical_key(" CE 285A "), "CE285A");
        assert_eq!(canonical_key("HP LaserJet Pro M1132"), "HPLASERJETPROM1132");
    }

    #[test]
    fn normalize_value_collapses_whitespace() {
        assert_eq!(normalize_value("  10200   Pages "), "10200 pages");
    }

    #[test]
    fn domain_of_strips_www() {
        assert_eq!(
            domain_of("https://www.NIX.ru/price/x.html").as_deref(),
            Some("nix.ru")
        );
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn validate_key_rejects_control_chars() {
        assert!(validate_key("job_id", "job-1").is_ok());
        assert!(validate_key("job_id", "").is_err());
        assert!(validate_key("job_id", "a\u{1f}b").is_err());
        assert!(validate_key("job_id", &"x".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }

    #[test]
    fn validate_value_allows_long_urls() {
        let url = format!("https://nix.ru/{}", "a".repeat(1000));
        assert!(validate_value("value", &url).is_ok());
        assert!(validate_value("value", &"x".repeat(MAX_VALUE_LENGTH + 1)).is_err());
        assert!(validate_value("value", "line\nbreak").is_err());
    }

    #[test]
    fn prefix_bounds_cover_composed_keys() {
        let (start, end) = prefix_bounds("job-1");
        let inside = compose_key(&["job-1", "00000000000000000007"]);
        let outside = compose_key(&["job-10", "00000000000000000001"]);
        assert!(inside.as_str() >= start.as_str() && inside.as_str() < end.as_str());
        assert!(!(outside.as_str() >= start.as_str() && outside.as_str() < end.as_str()));
    }

    #[test]
    fn padded_sorts_numerically() {
        assert!(padded(9) < padded(10));
    }
}
