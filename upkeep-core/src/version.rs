//! Dotted-numeric version comparison.
//!
//! Versions are compared as zero-padded tuples of integers. Parsing is
//! deliberately lenient: a segment that is not a plain non-negative integer
//! (`"x"`, `"rc1"`, `"-1"`, an empty segment) counts as `0` instead of being
//! rejected, so `"1.x"` equals `"1.0"` and `"abc"` equals `"0"`. An all-digit
//! segment too large for `u64` saturates to `u64::MAX` and still orders above
//! every smaller value. Callers that need strict validation must do it
//! before comparing.

use std::cmp::Ordering;
use std::fmt;

/// Ordered sequence of version components parsed from a dotted string.
///
/// Equality and ordering treat missing trailing components as zero, so
/// `1.2` and `1.2.0` are the same version.
#[derive(Debug, Clone, Default)]
pub struct VersionTuple(Vec<u64>);

impl VersionTuple {
    /// Parse a dotted version string. Never fails.
    pub fn parse(version: &str) -> Self {
        Self(version.split('.').map(parse_segment).collect())
    }

    /// Component at `index`, or `0` past the end.
    fn component(&self, index: usize) -> u64 {
        self.0.get(index).copied().unwrap_or(0)
    }
}

impl PartialEq for VersionTuple {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionTuple {}

impl PartialOrd for VersionTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", part)?;
            first = false;
        }
        Ok(())
    }
}

impl From<&str> for VersionTuple {
    fn from(version: &str) -> Self {
        Self::parse(version)
    }
}

fn parse_segment(segment: &str) -> u64 {
    let segment = segment.trim();
    match segment.parse::<u64>() {
        Ok(n) => n,
        Err(_) if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) => u64::MAX,
        Err(_) => 0,
    }
}

/// Compare two dotted version strings.
///
/// `Ordering` is `#[repr(i8)]`, so `compare(a, b) as i8` gives the
/// conventional `-1 / 0 / 1`.
pub fn compare(a: &str, b: &str) -> Ordering {
    VersionTuple::parse(a).cmp(&VersionTuple::parse(b))
}

/// Returns true if `candidate` is strictly newer than `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_comparison() {
        assert_eq!(compare("2.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare("0.1.0", "0.0.99"), Ordering::Greater);
        assert_eq!(compare("0.0.1", "0.0.2"), Ordering::Less);
        assert_eq!(compare("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare("0.0.1", "0.0.1"), Ordering::Equal);
    }

    #[test]
    fn test_trailing_zero_padding() {
        assert_eq!(compare("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare("1.2.0.0", "1.2"), Ordering::Equal);
        assert_eq!(compare("1.2", "1.2.0.1"), Ordering::Less);
        assert_eq!(VersionTuple::parse("3"), VersionTuple::parse("3.0.0"));
    }

    #[test]
    fn test_lenient_segments_count_as_zero() {
        assert_eq!(compare("1.x", "1.0"), Ordering::Equal);
        assert_eq!(compare("abc", "0"), Ordering::Equal);
        assert_eq!(compare("", "0.0"), Ordering::Equal);
        assert_eq!(compare("1..2", "1.0.2"), Ordering::Equal);
        assert_eq!(compare("1.2-rc1", "1.0"), Ordering::Equal);
        assert_eq!(compare("-1", "0"), Ordering::Equal);
    }

    #[test]
    fn test_oversized_segment_saturates() {
        assert_eq!(compare("99999999999999999999999", "1"), Ordering::Greater);
        assert_eq!(compare("1.99999999999999999999999", "1.18446744073709551615"), Ordering::Equal);
        assert_eq!(compare("2.0", "1.99999999999999999999999"), Ordering::Greater);
    }

    #[test]
    fn test_sign_mapping() {
        assert_eq!(compare("2.0", "1.0") as i8, 1);
        assert_eq!(compare("1.0", "2.0") as i8, -1);
        assert_eq!(compare("1.0", "1") as i8, 0);
    }

    #[test]
    fn test_antisymmetry_and_reflexivity() {
        let versions = ["0", "0.1", "1", "1.0.0", "1.2", "1.10", "2.0.1", "1.x", " 3 ", "10.0.0.1"];
        for a in versions {
            assert_eq!(compare(a, a), Ordering::Equal, "{} vs itself", a);
            for b in versions {
                assert_eq!(compare(a, b), compare(b, a).reverse(), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("0.5.0", "0.4.9"));
        assert!(!is_newer("0.5.0", "0.5"));
        assert!(!is_newer("0.4", "0.5"));
    }

    #[test]
    fn test_display_keeps_segment_count() {
        assert_eq!(VersionTuple::parse("1.x.3").to_string(), "1.0.3");
        assert_eq!(VersionTuple::from("1.2").to_string(), "1.2");
    }
}
