//! Bin code parsing
//!
//! Wire grammar (bit-exact): `01<ZONE>-<AISLE>-<POSITION>-<SHELF>`,
//! ASCII, hyphen-separated. The zone is the first segment with the
//! leading `01` stripped. An unparseable code degrades to the first
//! segment as-is: malformed rows are accepted with conservative
//! defaults rather than rejected.

use regex::Regex;
use std::sync::OnceLock;

fn bin_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Unwrap is safe on a literal pattern; checked by tests.
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^01([A-Za-z0-9]+)-[A-Za-z0-9]+-[A-Za-z0-9]+-[A-Za-z0-9]+$").unwrap()
    })
}

/// Extract the zone code from a storage bin code.
pub fn extract_zone(bin_code: &str) -> String {
    if let Some(captures) = bin_code_pattern().captures(bin_code.trim()) {
        return captures[1].to_string();
    }
    // Fallback: first hyphen segment, untouched.
    bin_code
        .trim()
        .split('-')
        .next()
        .unwrap_or(bin_code)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_01_from_well_formed_codes() {
        assert_eq!(extract_zone("01D-02-015-03"), "D");
        assert_eq!(extract_zone("01MEZ2-11-001-01"), "MEZ2");
    }

    #[test]
    fn malformed_codes_yield_first_segment_as_is() {
        assert_eq!(extract_zone("DOCK-4"), "DOCK");
        assert_eq!(extract_zone("01D"), "01D");
        assert_eq!(extract_zone(""), "");
        assert_eq!(extract_zone("X-1-2"), "X");
    }

    #[test]
    fn whitespace_is_tolerated() {
        assert_eq!(extract_zone(" 01I-01-001-02 "), "I");
    }
}
