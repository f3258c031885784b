//! Administrator configuration from environment variables.
//!
//! `ADMIN_IDS` holds a comma-separated list of chat user ids allowed to run
//! administrative commands such as creating promo codes.

use std::collections::HashSet;

/// Parses a comma-separated id list, skipping blanks and malformed entries.
#[must_use]
pub fn parse_admin_ids(raw: &str) -> HashSet<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Reads the administrator set from `ADMIN_IDS`.
#[must_use]
pub fn get_admin_ids() -> HashSet<i64> {
    std::env::var("ADMIN_IDS")
        .map(|raw| parse_admin_ids(&raw))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_admin_ids() {
        let ids = parse_admin_ids(" 8217088275, 1076328217 ,,oops");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&8_217_088_275));
        assert!(ids.contains(&1_076_328_217));
    }

    #[test]
    fn test_parse_admin_ids_empty() {
        assert!(parse_admin_ids("").is_empty());
    }
}
