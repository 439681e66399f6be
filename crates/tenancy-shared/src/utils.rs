//! Utility functions

use uuid::Uuid;

pub fn is_valid_uuid(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}

/// Normalize a candidate slug: trim, lowercase, collapse whitespace and
/// underscores into hyphens. Character-set validation happens separately.
pub fn normalize_slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_hyphen = false;
    for c in raw.trim().to_lowercase().chars() {
        let mapped = if c.is_whitespace() || c == '_' { '-' } else { c };
        if mapped == '-' {
            if !last_hyphen && !out.is_empty() {
                out.push('-');
            }
            last_hyphen = true;
        } else {
            out.push(mapped);
            last_hyphen = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// True when the slug is made of lowercase alphanumerics and hyphens only.
pub fn is_slug_charset(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug("  My Team  "), "my-team");
        assert_eq!(normalize_slug("a__b  c"), "a-b-c");
        assert_eq!(normalize_slug("Trailing-"), "trailing");
    }

    #[test]
    fn test_slug_charset() {
        assert!(is_slug_charset("acme-eu-2"));
        assert!(!is_slug_charset("Acme"));
        assert!(!is_slug_charset("a b"));
        assert!(!is_slug_charset(""));
    }
}
