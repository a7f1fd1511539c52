//! Semantic versions for bundle manifests.
//!
//! Bundle versions are a restricted form of semver: a numeric
//! `major.minor.patch` core, optionally followed by one of the pre-release
//! tags `prealpha`, `alpha`, `beta` or `rc` and an optional build number
//! (`1.2.0-beta.3`). A build may also be written as a tag, which stands for
//! the tag's rank (`1.2.0-beta.alpha` is `1.2.0-beta.1`). Build metadata
//! (`+...`) is not accepted.
//!
//! Parsing never panics. Text that does not conform yields `None` rather
//! than a default value, so callers can tell "unparseable" apart from the
//! `0.0.0` "not installed" sentinel.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Version string meaning "nothing installed".
pub const NULL_VERSION: &str = "0.0.0";

/// Longest version string accepted by [`SemanticVersion::parse`].
pub const MAX_VERSION_LENGTH: usize = 256;

/// Pre-release tag, in ascending precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrereleaseTag {
    Prealpha,
    Alpha,
    Beta,
    Rc,
}

impl PrereleaseTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prealpha => "prealpha",
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Rc => "rc",
        }
    }

    /// Build number a tag stands for when used in the build position.
    pub fn rank(&self) -> u64 {
        *self as u64
    }

    fn from_identifier(s: &str) -> Option<Self> {
        match s {
            "prealpha" => Some(Self::Prealpha),
            "alpha" => Some(Self::Alpha),
            "beta" => Some(Self::Beta),
            "rc" => Some(Self::Rc),
            _ => None,
        }
    }
}

/// Pre-release component: a tag plus build number (0 when omitted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prerelease {
    pub tag: PrereleaseTag,
    pub build: u64,
}

/// A parsed bundle version.
///
/// Ordering compares the numeric triple, then pre-release presence (a
/// release ranks above any pre-release of the same triple), then the tag,
/// then the build number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<Prerelease>,
}

/// Error returned by the [`FromStr`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("'{0}' is not a valid semantic version")]
pub struct VersionParseError(String);

impl SemanticVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    pub const fn with_prerelease(mut self, tag: PrereleaseTag, build: u64) -> Self {
        self.prerelease = Some(Prerelease { tag, build });
        self
    }

    /// The "not installed" sentinel, `0.0.0`.
    pub const fn null() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn is_null(&self) -> bool {
        *self == Self::null()
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Parse a version string, returning `None` for anything non-conforming.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() || text.len() > MAX_VERSION_LENGTH {
            return None;
        }
        let parsed = semver::Version::parse(text).ok()?;
        if !parsed.build.is_empty() {
            return None;
        }

        let prerelease = if parsed.pre.is_empty() {
            None
        } else {
            let mut identifiers = parsed.pre.as_str().split('.');
            let tag = identifiers
                .next()
                .and_then(PrereleaseTag::from_identifier)?;
            let build = match identifiers.next() {
                Some(build) => match build.parse::<u64>() {
                    Ok(number) => number,
                    Err(_) => PrereleaseTag::from_identifier(build)?.rank(),
                },
                None => 0,
            };
            if identifiers.next().is_some() {
                return None;
            }
            Some(Prerelease { tag, build })
        };

        Some(Self {
            major: parsed.major,
            minor: parsed.minor,
            patch: parsed.patch,
            prerelease,
        })
    }

    pub fn is_greater(&self, other: &Self) -> bool {
        self > other
    }

    pub fn is_lower(&self, other: &Self) -> bool {
        self < other
    }

    pub fn is_equal(&self, other: &Self) -> bool {
        self == other
    }
}

impl Default for SemanticVersion {
    fn default() -> Self {
        Self::null()
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}.{}", pre.tag.as_str(), pre.build)?;
        }
        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| VersionParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_rejects_incomplete_core() {
        for input in ["", "0", "0.0", "0.0.", "1..1", "..1", ".7.", "1.0.prealpha"] {
            assert!(SemanticVersion::parse(input).is_none(), "{input}");
        }
    }

    #[test]
    fn test_parse_rejects_negative_numbers() {
        assert!(SemanticVersion::parse("-1.4.4").is_none());
        assert!(SemanticVersion::parse("1.-55.4").is_none());
        assert!(SemanticVersion::parse("2.3.-9").is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_tags_and_build_metadata() {
        assert!(SemanticVersion::parse("1.0.1-rand").is_none());
        assert!(SemanticVersion::parse("1.0.1-cool").is_none());
        assert!(SemanticVersion::parse("1.0.1-.1").is_none());
        assert!(SemanticVersion::parse("1.0.1-beta.1.2").is_none());
        assert!(SemanticVersion::parse("1.0.1+build.5").is_none());
    }

    #[test]
    fn test_parse_rejects_overlong_input() {
        let long = format!("1.0.{}", "1".repeat(MAX_VERSION_LENGTH));
        assert!(SemanticVersion::parse(&long).is_none());
    }

    #[test]
    fn test_parse_core_and_prerelease() {
        let plain = v("2.10.3");
        assert_eq!((plain.major, plain.minor, plain.patch), (2, 10, 3));
        assert!(!plain.is_prerelease());

        let pre = v("1.0.0-rc.4");
        assert_eq!(
            pre.prerelease,
            Some(Prerelease {
                tag: PrereleaseTag::Rc,
                build: 4
            })
        );
    }

    #[test]
    fn test_tag_without_build_is_build_zero() {
        assert!(v("1.0.0-beta").is_equal(&v("1.0.0-beta.0")));
        assert!(v("1.0.0-beta").is_lower(&v("1.0.0-beta.1")));
    }

    #[test]
    fn test_tag_as_build_uses_tag_rank() {
        assert_eq!(v("1.2.3-beta.prealpha"), v("1.2.3-beta.0"));
        assert_eq!(v("1.2.3-alpha.alpha"), v("1.2.3-alpha.1"));
        assert_eq!(v("1.2.3-alpha.beta"), v("1.2.3-alpha.2"));
        assert_eq!(v("1.2.3-prealpha.rc"), v("1.2.3-prealpha.3"));
        assert_eq!(v("1.0.0-beta.alpha").to_string(), "1.0.0-beta.1");
        assert!(SemanticVersion::parse("1.2.3-beta.gamma").is_none());
    }

    #[test]
    fn test_precedence() {
        assert!(v("2.0.0").is_greater(&v("1.99.99")));
        assert!(v("1.2.0").is_greater(&v("1.1.9")));
        assert!(v("1.1.2").is_greater(&v("1.1.1")));
        assert!(v("1.0.0").is_greater(&v("1.0.0-rc.9")));
        assert!(v("1.0.0-rc").is_greater(&v("1.0.0-beta.7")));
        assert!(v("1.0.0-alpha").is_greater(&v("1.0.0-prealpha.3")));
        assert!(v("1.0.0-alpha.2").is_greater(&v("1.0.0-alpha.1")));
    }

    #[test]
    fn test_null_version() {
        let null = v(NULL_VERSION);
        assert!(null.is_null());
        assert!(null.is_equal(&SemanticVersion::null()));
        assert!(!null.is_greater(&SemanticVersion::null()));
        assert!(v("0.0.1-prealpha").is_greater(&null));
    }

    #[test]
    fn test_from_str_error() {
        let err = "nope".parse::<SemanticVersion>().unwrap_err();
        assert_eq!(err.to_string(), "'nope' is not a valid semantic version");
    }

    fn arb_version() -> impl Strategy<Value = SemanticVersion> {
        let tag = prop_oneof![
            Just(PrereleaseTag::Prealpha),
            Just(PrereleaseTag::Alpha),
            Just(PrereleaseTag::Beta),
            Just(PrereleaseTag::Rc),
        ];
        (
            0u64..50,
            0u64..50,
            0u64..50,
            proptest::option::of((tag, 0u64..20)),
        )
            .prop_map(|(major, minor, patch, pre)| SemanticVersion {
                major,
                minor,
                patch,
                prerelease: pre.map(|(tag, build)| Prerelease { tag, build }),
            })
    }

    proptest! {
        #[test]
        fn prop_display_parse_roundtrip(version in arb_version()) {
            prop_assert_eq!(SemanticVersion::parse(&version.to_string()), Some(version));
        }

        #[test]
        fn prop_exactly_one_relation_holds(a in arb_version(), b in arb_version()) {
            let relations = [a.is_greater(&b), a.is_lower(&b), a.is_equal(&b)];
            prop_assert_eq!(relations.iter().filter(|r| **r).count(), 1);
            prop_assert_eq!(a.is_greater(&b), b.is_lower(&a));
        }

        #[test]
        fn prop_order_is_transitive(
            a in arb_version(),
            b in arb_version(),
            c in arb_version(),
        ) {
            if a < b && b < c {
                prop_assert!(a < c);
            }
        }
    }
}
