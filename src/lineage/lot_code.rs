//! Lot code conventions.
//!
//! Split children are named `{parent}-{suffix}`. Lots created before
//! `parent_lot_id` was recorded can only be linked to their parent through
//! this naming convention, so [`legacy_parent_codes`] recovers that link.
//! It is a fallback and never overrides an explicit parent reference.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static SPLIT_CHILD_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<parent>.+)-(?P<suffix>[A-Z])$").expect("split child code regex is valid")
});

static SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{1,8}$").expect("suffix regex is valid"));

/// Parent code of a legacy split child, e.g. `BRW-2025-0001-B` → `BRW-2025-0001`.
pub fn split_parent_code(code: &str) -> Option<&str> {
    SPLIT_CHILD_CODE
        .captures(code)
        .and_then(|caps| caps.name("parent"))
        .map(|m| m.as_str())
}

pub fn child_code(parent_code: &str, suffix: &str) -> String {
    format!("{}-{}", parent_code, suffix)
}

/// Suffix for the `index`-th split target: A, B, … Z, then AA, AB, …
pub fn default_suffix(index: usize) -> String {
    let mut n = index;
    let mut out = Vec::new();
    loop {
        out.push((b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    out.iter().rev().collect()
}

pub fn is_valid_suffix(suffix: &str) -> bool {
    SUFFIX.is_match(suffix)
}

/// Parent codes named by legacy split children that exist in `known`.
pub fn legacy_parent_codes<'a, I>(candidates: I, known: &HashSet<&str>) -> HashSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .filter_map(split_parent_code)
        .filter(|parent| known.contains(parent))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_split_child_codes() {
        assert_eq!(split_parent_code("BRW-2025-0001-A"), Some("BRW-2025-0001"));
        assert_eq!(split_parent_code("IPA-7-C"), Some("IPA-7"));
        assert_eq!(split_parent_code("BRW-2025-0001"), None);
        assert_eq!(split_parent_code("BRW-2025-0001-a"), None);
        assert_eq!(split_parent_code("-A"), None);
        assert_eq!(split_parent_code(""), None);
    }

    #[test]
    fn default_suffixes_run_through_the_alphabet() {
        assert_eq!(default_suffix(0), "A");
        assert_eq!(default_suffix(1), "B");
        assert_eq!(default_suffix(25), "Z");
        assert_eq!(default_suffix(26), "AA");
        assert_eq!(default_suffix(27), "AB");
    }

    #[test]
    fn suffix_rules() {
        assert!(is_valid_suffix("A"));
        assert!(is_valid_suffix("KEG2"));
        assert!(!is_valid_suffix(""));
        assert!(!is_valid_suffix("a"));
        assert!(!is_valid_suffix("TOO-LONG"));
    }

    #[test]
    fn legacy_parent_only_consumed_when_present() {
        let codes = ["BRW-1", "BRW-1-A", "BRW-1-B", "BRW-2-A", "BRW-3"];
        let known: HashSet<&str> = codes.iter().copied().collect();
        let consumed = legacy_parent_codes(codes, &known);
        assert!(consumed.contains("BRW-1"));
        assert!(!consumed.contains("BRW-2"));
        assert!(!consumed.contains("BRW-3"));
        assert_eq!(consumed.len(), 1);
    }
}
