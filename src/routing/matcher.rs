//! Path segment matching.
//!
//! # Responsibilities
//! - Match one path segment exactly (case-sensitive, verbatim)
//! - Match one path segment against a capturing pattern and extract the
//!   decoded value of its group
//!
//! # Design Decisions
//! - A capture pattern is anchored to the whole segment
//! - Exactly one capture group per pattern: one segment yields one variable
//! - Captured values are percent-decoded with `+` read as a space; exact
//!   segments are compared undecoded

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::routing::RouteError;

/// Wrapped around a capture pattern so that a top-level alternation is
/// anchored as a whole.
const ANCHOR_OPEN: &str = "^(?:";
const ANCHOR_CLOSE: &str = ")$";

/// Matches a single path segment.
#[derive(Debug, Clone)]
pub enum SegmentMatcher {
    /// Segment must equal this string.
    Exact(String),
    /// Segment must fully match this pattern; its single group is captured.
    Capture(Regex),
}

impl SegmentMatcher {
    /// Parse one pattern segment. A segment wrapped in parentheses is a
    /// capture (`(\d+)`), anything else is exact.
    pub fn parse(segment: &str) -> Result<Self, RouteError> {
        if !(segment.starts_with('(') && segment.ends_with(')')) {
            return Ok(SegmentMatcher::Exact(segment.to_string()));
        }

        let anchored = format!("{}{}{}", ANCHOR_OPEN, segment, ANCHOR_CLOSE);
        let regex = Regex::new(&anchored).map_err(|e| RouteError::InvalidPattern {
            segment: segment.to_string(),
            reason: e.to_string(),
        })?;
        // captures_len counts the implicit whole-match group.
        if regex.captures_len() != 2 {
            return Err(RouteError::InvalidPattern {
                segment: segment.to_string(),
                reason: "a capture segment must contain exactly one group".to_string(),
            });
        }
        Ok(SegmentMatcher::Capture(regex))
    }

    /// Match `segment`, pushing the decoded capture (if any) onto `vars`.
    pub fn match_segment(&self, segment: &str, vars: &mut Vec<String>) -> bool {
        match self {
            SegmentMatcher::Exact(expected) => expected == segment,
            SegmentMatcher::Capture(regex) => match regex.captures(segment) {
                Some(caps) => {
                    let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                    vars.push(decode_component(raw));
                    true
                }
                None => false,
            },
        }
    }

    pub fn is_capture(&self) -> bool {
        matches!(self, SegmentMatcher::Capture(_))
    }

    /// Whether some segment could satisfy both matchers.
    ///
    /// Two distinct patterns are assumed to overlap: deciding regex
    /// intersection is not worth it for a registration-time warning.
    pub fn may_overlap(&self, other: &SegmentMatcher) -> bool {
        match (self, other) {
            (SegmentMatcher::Exact(a), SegmentMatcher::Exact(b)) => a == b,
            (SegmentMatcher::Exact(s), SegmentMatcher::Capture(r))
            | (SegmentMatcher::Capture(r), SegmentMatcher::Exact(s)) => r.is_match(s),
            (SegmentMatcher::Capture(_), SegmentMatcher::Capture(_)) => true,
        }
    }

    /// Pattern text, for logs.
    pub fn as_str(&self) -> &str {
        match self {
            SegmentMatcher::Exact(s) => s,
            SegmentMatcher::Capture(r) => r
                .as_str()
                .strip_prefix(ANCHOR_OPEN)
                .and_then(|s| s.strip_suffix(ANCHOR_CLOSE))
                .unwrap_or(r.as_str()),
        }
    }
}

/// Percent-decode a URL component, reading `+` as a space.
pub fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_matches_verbatim() {
        let m = SegmentMatcher::parse("hostname").unwrap();
        let mut vars = Vec::new();
        assert!(m.match_segment("hostname", &mut vars));
        assert!(!m.match_segment("Hostname", &mut vars));
        assert!(!m.match_segment("host%6Eame", &mut vars));
        assert!(vars.is_empty());
    }

    #[test]
    fn capture_is_anchored_and_decoded() {
        let m = SegmentMatcher::parse(r"(\d+)").unwrap();
        assert!(m.is_capture());
        let mut vars = Vec::new();
        assert!(m.match_segment("42", &mut vars));
        assert!(!m.match_segment("42a", &mut vars));
        assert!(!m.match_segment("a42", &mut vars));
        assert_eq!(vars, vec!["42".to_string()]);

        let any = SegmentMatcher::parse("(.+)").unwrap();
        let mut vars = Vec::new();
        assert!(any.match_segment("Write+Ahead%20Log", &mut vars));
        assert_eq!(vars, vec!["Write Ahead Log".to_string()]);
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let m = SegmentMatcher::parse(r"(?:all)|(\d+)").unwrap();
        assert_eq!(m.as_str(), r"(?:all)|(\d+)");

        let mut vars = Vec::new();
        assert!(!m.match_segment("zzz42", &mut vars));
        assert!(!m.match_segment("allxyz", &mut vars));
        assert!(!m.match_segment("42zzz", &mut vars));
        assert!(vars.is_empty());

        assert!(m.match_segment("42", &mut vars));
        assert!(m.match_segment("all", &mut vars));
        // The group did not take part in matching "all".
        assert_eq!(vars, vec!["42".to_string(), String::new()]);
    }

    #[test]
    fn capture_requires_one_group() {
        assert!(SegmentMatcher::parse(r"(\d+)-(\d+)").is_err());
        assert!(SegmentMatcher::parse("([a-z)").is_err());
        assert_eq!(
            SegmentMatcher::parse(r"((?:ab)+)").unwrap().as_str(),
            r"((?:ab)+)"
        );
    }

    #[test]
    fn overlap() {
        let exact = SegmentMatcher::parse("reset").unwrap();
        let digits = SegmentMatcher::parse(r"(\d+)").unwrap();
        let word = SegmentMatcher::parse(r"(\w+)").unwrap();
        assert!(exact.may_overlap(&SegmentMatcher::parse("reset").unwrap()));
        assert!(!exact.may_overlap(&digits));
        assert!(exact.may_overlap(&word));
        assert!(digits.may_overlap(&word));
    }
}
