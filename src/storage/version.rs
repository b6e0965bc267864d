//! Version-string parsing and ordering for external tools.
//!
//! Adapters gate optional capabilities on the installed client version.
//! Version strings are dotted sequences whose pieces may embed an
//! alphabetic pre-release tag (`2.0.0pre2` parses to `2 . 0 . 0 pre 2`);
//! comparison is element-wise with tags sorting before numbers, and a
//! shorter sequence is greater unless the longer one's first extra
//! element is a tag (`2.0.0pre2 < 2.0.0 < 2.0.1`).

use std::cmp::Ordering;

/// One element of a parsed version: a number or a pre-release tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Num(u64),
    Tag(String),
}

/// Parse a version string into its mixed numeric/tag sequence.
///
/// Only the first whitespace-delimited token is considered, so trailing
/// qualifiers like `2.16.5 (release)` are ignored.
pub fn parse(version: &str) -> Vec<Part> {
    let token = version.split_whitespace().next().unwrap_or("");
    let mut parts = Vec::new();
    for piece in token.split('.') {
        let mut digits = String::new();
        let mut tag = String::new();
        for c in piece.chars() {
            if c.is_ascii_digit() {
                if !tag.is_empty() {
                    parts.push(Part::Tag(std::mem::take(&mut tag)));
                }
                digits.push(c);
            } else {
                if !digits.is_empty() {
                    if let Ok(n) = std::mem::take(&mut digits).parse() {
                        parts.push(Part::Num(n));
                    }
                }
                tag.push(c);
            }
        }
        if !digits.is_empty() {
            if let Ok(n) = digits.parse() {
                parts.push(Part::Num(n));
            }
        }
        if !tag.is_empty() {
            parts.push(Part::Tag(tag));
        }
    }
    parts
}

/// Compare two parsed versions element-wise.
///
/// Numbers compare numerically and tags lexicographically; a number is
/// always greater than a tag in the same position. When one sequence is
/// a prefix of the other, the longer one wins unless its first extra
/// element is a tag, which marks it as a pre-release of the shorter.
pub fn compare(current: &[Part], other: &[Part]) -> Ordering {
    for (c, o) in current.iter().zip(other.iter()) {
        let ord = match (c, o) {
            (Part::Num(a), Part::Num(b)) => a.cmp(b),
            (Part::Tag(a), Part::Tag(b)) => a.cmp(b),
            (Part::Num(_), Part::Tag(_)) => Ordering::Greater,
            (Part::Tag(_), Part::Num(_)) => Ordering::Less,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    match current.len().cmp(&other.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater => match current[other.len()] {
            Part::Tag(_) => Ordering::Less,
            Part::Num(_) => Ordering::Greater,
        },
        Ordering::Less => match other[current.len()] {
            Part::Tag(_) => Ordering::Greater,
            Part::Num(_) => Ordering::Less,
        },
    }
}

/// Convenience wrapper comparing two unparsed version strings.
pub fn compare_str(current: &str, other: &str) -> Ordering {
    compare(&parse(current), &parse(other))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        assert_eq!(
            parse("2.3.1 (release)"),
            vec![Part::Num(2), Part::Num(3), Part::Num(1)]
        );
    }

    #[test]
    fn test_parse_pre_release_tag() {
        assert_eq!(
            parse("2.0.0pre2"),
            vec![
                Part::Num(2),
                Part::Num(0),
                Part::Num(0),
                Part::Tag("pre".to_string()),
                Part::Num(2)
            ]
        );
    }

    #[test]
    fn test_numeric_ordering() {
        assert_eq!(compare_str("2.3.1", "2.3.1"), Ordering::Equal);
        assert_eq!(compare_str("2.3.1", "2.3.2"), Ordering::Less);
        assert_eq!(compare_str("2.3.1", "2.3.0"), Ordering::Greater);
        assert_eq!(compare_str("2.3.1", "3"), Ordering::Less);
    }

    #[test]
    fn test_mismatched_length() {
        // Longer wins when the extra element is numeric...
        assert_eq!(compare_str("2.3.1.1", "2.3.1"), Ordering::Greater);
        assert_eq!(compare_str("2.3.1", "2.3.1.1"), Ordering::Less);
        // ...but loses when it marks a pre-release.
        assert_eq!(compare_str("2.0.0pre2", "2.0.0"), Ordering::Less);
        assert_eq!(compare_str("2.0.0", "2.0.0pre2"), Ordering::Greater);
    }

    #[test]
    fn test_tag_against_number() {
        assert_eq!(compare_str("2.3.1", "2.3.0a.5"), Ordering::Greater);
        assert_eq!(compare_str("2.3.1", "2.3.1a.5"), Ordering::Greater);
    }

    #[test]
    fn test_pre_release_sequences() {
        assert_eq!(compare_str("2.0.0pre2", "3"), Ordering::Less);
        assert_eq!(compare_str("2.0.0pre2", "2.0.1"), Ordering::Less);
        assert_eq!(compare_str("2.0.0pre2", "2.0.0pre1"), Ordering::Greater);
        assert_eq!(compare_str("2.0.0pre2", "2.0.0pre2"), Ordering::Equal);
        assert_eq!(compare_str("2.0.0pre2", "2.0.0pre3"), Ordering::Less);
        assert_eq!(compare_str("2.0.0pre2", "2.0.0a3"), Ordering::Greater);
        assert_eq!(compare_str("2.0.0pre2", "2.0.0rc1"), Ordering::Less);
    }

    #[test]
    fn test_ordering_is_antisymmetric_and_transitive() {
        let versions = ["1.9", "2.0.0a3", "2.0.0pre2", "2.0.0rc1", "2.0.0", "2.0.1", "2.3.1"];
        for (i, a) in versions.iter().enumerate() {
            for (j, b) in versions.iter().enumerate() {
                let forward = compare_str(a, b);
                let backward = compare_str(b, a);
                assert_eq!(forward, backward.reverse(), "{a} vs {b}");
                if i < j {
                    assert_eq!(forward, Ordering::Less, "{a} vs {b}");
                }
            }
        }
    }
}
