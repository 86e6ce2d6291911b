// SPDX-License-Identifier: MPL-2.0

//! Constraints over the versions of a project.
//!
//! A [Constraint] is a predicate over [PairedVersion]s.
//! Semantic version ranges are represented with [Ranges] from the
//! `version-ranges` crate, so unions and intersections of intervals
//! are handled exactly.
//!
//! An exclusive upper bound such as `<2.0.0` is stored as `<2.0.0-0`,
//! the smallest pre-release of `2.0.0`. This keeps `2.0.0-beta` out of `<2.0.0`.

use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use semver::{Comparator, Op, Prerelease};
use thiserror::Error;
use version_ranges::Ranges;

use crate::version::{parse_semver_tag, PairedVersion, Revision, Version};

/// Set of acceptable versions for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// Every version.
    Any,
    /// No version at all.
    None,
    /// Exactly one revision.
    Revision(Revision),
    /// A branch, whatever revision it points at.
    Branch(String),
    /// A tag that is not a semantic version.
    Tag(String),
    /// Semantic versions within a set of intervals.
    Range(Ranges<semver::Version>),
    /// Exactly one semantic version.
    Version(semver::Version),
}

/// Two exact revision pins that cannot both hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("revision {left} and revision {right} are mutually exclusive")]
pub struct IncompatibleConstraints {
    /// One revision.
    pub left: Revision,
    /// The other one.
    pub right: Revision,
}

/// Error returned when a string is not a valid version range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version constraint {input:?}: {reason}")]
pub struct InvalidConstraint {
    /// The string that failed to parse.
    pub input: String,
    /// Why it failed.
    pub reason: String,
}

impl Constraint {
    /// Intersection of two constraints.
    ///
    /// [Constraint::Any] is the identity and [Constraint::None] absorbs.
    /// Two different revisions are an error rather than an empty constraint,
    /// so callers can tell mutually exclusive pins apart from an empty range.
    pub fn intersect(&self, other: &Self) -> Result<Self, IncompatibleConstraints> {
        use Constraint::*;
        let c = match (self, other) {
            (Any, c) | (c, Any) => c.clone(),
            (None, _) | (_, None) => None,
            (Revision(a), Revision(b)) => {
                if a == b {
                    Revision(a.clone())
                } else {
                    return Err(IncompatibleConstraints {
                        left: a.clone(),
                        right: b.clone(),
                    });
                }
            }
            (Revision(_), _) | (_, Revision(_)) => None,
            (Branch(a), Branch(b)) if a == b => Branch(a.clone()),
            (Tag(a), Tag(b)) if a == b => Tag(a.clone()),
            (Version(a), Version(b)) if a == b => Version(a.clone()),
            (Version(v), Range(r)) | (Range(r), Version(v)) if r.contains(v) => Version(v.clone()),
            (Range(a), Range(b)) => Self::from_ranges(a.intersection(b)),
            _ => None,
        };
        Ok(c)
    }

    /// Normalized constraint for a set of intervals.
    pub fn from_ranges(ranges: Ranges<semver::Version>) -> Self {
        if ranges.is_empty() {
            return Self::None;
        }
        match ranges.as_singleton() {
            Some(v) => Self::Version(v.clone()),
            None => Self::Range(ranges),
        }
    }

    /// Whether a listed version satisfies this constraint.
    /// Revision pins compare the underlying revision,
    /// every other kind looks at the version name.
    pub fn matches(&self, pv: &PairedVersion) -> bool {
        match self {
            Self::Revision(rev) => pv.revision() == rev,
            _ => self.matches_version(pv.version()),
        }
    }

    /// Whether an unpaired version satisfies this constraint.
    pub fn matches_version(&self, version: &Version) -> bool {
        match (self, version) {
            (Self::Any, _) => true,
            (Self::None, _) => false,
            (Self::Revision(a), Version::Revision(b)) => a == b,
            (Self::Branch(a), Version::Branch { name, .. }) => a == name,
            (Self::Tag(a), Version::Tag(b)) => a == b,
            (Self::Tag(a), Version::Semver(v)) => parse_semver_tag(a).as_ref() == Some(v),
            (Self::Range(r), Version::Semver(v)) => r.contains(v),
            (Self::Version(a), Version::Semver(v)) => a == v,
            _ => false,
        }
    }

    /// The exact revision this constraint pins, if any.
    pub fn as_revision(&self) -> Option<&Revision> {
        match self {
            Self::Revision(rev) => Some(rev),
            _ => None,
        }
    }

    /// Whether no version can satisfy this constraint.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether every version satisfies this constraint.
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Constraint accepting exactly the given version.
    pub fn exact(version: &Version) -> Self {
        match version {
            Version::Semver(v) => Self::Version(v.clone()),
            Version::Branch { name, .. } => Self::Branch(name.clone()),
            Version::Tag(tag) => Self::Tag(tag.clone()),
            Version::Revision(rev) => Self::Revision(rev.clone()),
        }
    }

    /// Interpret the `version` field of a manifest.
    ///
    /// Valid range syntax gives a range or an exact version.
    /// Anything else is taken as the name of a plain tag.
    pub fn from_version_str(s: &str) -> Self {
        match s.parse() {
            Ok(c) => c,
            Err(_) => Self::Tag(s.to_string()),
        }
    }
}

// Parsing #####################################################################

impl FromStr for Constraint {
    type Err = InvalidConstraint;

    /// Parse a semantic version constraint.
    ///
    /// `*` or an empty string is [Constraint::Any].
    /// A bare version, with an optional `v` or `=` prefix, is an exact [Constraint::Version].
    /// Otherwise comparators are separated by commas and alternatives by `||`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::Any);
        }
        if let Some(v) = parse_exact(s) {
            return Ok(Self::Version(v));
        }
        let mut ranges = Ranges::empty();
        for alternative in s.split("||") {
            let alternative = alternative.trim();
            let part = match parse_exact(alternative) {
                Some(v) => Ranges::singleton(v),
                None => parse_req(alternative).map_err(|reason| InvalidConstraint {
                    input: s.to_string(),
                    reason,
                })?,
            };
            ranges = ranges.union(&part);
        }
        Ok(Self::from_ranges(ranges))
    }
}

fn parse_exact(s: &str) -> Option<semver::Version> {
    let trimmed = s
        .strip_prefix('=')
        .map(str::trim_start)
        .or_else(|| s.strip_prefix('v'))
        .unwrap_or(s);
    semver::Version::parse(trimmed).ok()
}

fn parse_req(s: &str) -> Result<Ranges<semver::Version>, String> {
    let req = semver::VersionReq::parse(s).map_err(|e| e.to_string())?;
    req.comparators
        .iter()
        .try_fold(Ranges::full(), |acc, cmp| {
            Ok(acc.intersection(&comparator_range(cmp)?))
        })
}

/// Lowest pre-release of a version, used for exclusive upper bounds.
fn floor(major: u64, minor: u64, patch: u64) -> semver::Version {
    let mut v = semver::Version::new(major, minor, patch);
    v.pre = Prerelease::new("0").unwrap_or(Prerelease::EMPTY);
    v
}

fn comparator_range(cmp: &Comparator) -> Result<Ranges<semver::Version>, String> {
    let major = cmp.major;
    let full = |minor: u64, patch: u64| {
        let mut v = semver::Version::new(major, minor, patch);
        v.pre = cmp.pre.clone();
        v
    };
    let range = match (cmp.op, cmp.minor, cmp.patch) {
        (Op::Exact, Some(minor), Some(patch)) => Ranges::singleton(full(minor, patch)),
        (Op::Exact | Op::Tilde | Op::Wildcard | Op::Caret, None, _) => {
            Ranges::between(full(0, 0), floor(major + 1, 0, 0))
        }
        (Op::Exact | Op::Tilde | Op::Wildcard, Some(minor), None) => {
            Ranges::between(full(minor, 0), floor(major, minor + 1, 0))
        }
        (Op::Greater, Some(minor), Some(patch)) => Ranges::strictly_higher_than(full(minor, patch)),
        (Op::Greater, Some(minor), None) => Ranges::higher_than(semver::Version::new(major, minor + 1, 0)),
        (Op::Greater, None, _) => Ranges::higher_than(semver::Version::new(major + 1, 0, 0)),
        (Op::GreaterEq, minor, patch) => {
            Ranges::higher_than(full(minor.unwrap_or(0), patch.unwrap_or(0)))
        }
        (Op::Less, minor, patch) => {
            let (minor, patch) = (minor.unwrap_or(0), patch.unwrap_or(0));
            if cmp.pre.is_empty() {
                Ranges::strictly_lower_than(floor(major, minor, patch))
            } else {
                Ranges::strictly_lower_than(full(minor, patch))
            }
        }
        (Op::LessEq, Some(minor), Some(patch)) => Ranges::lower_than(full(minor, patch)),
        (Op::LessEq, Some(minor), None) => Ranges::strictly_lower_than(floor(major, minor + 1, 0)),
        (Op::LessEq, None, _) => Ranges::strictly_lower_than(floor(major + 1, 0, 0)),
        (Op::Tilde, Some(minor), Some(patch)) => {
            Ranges::between(full(minor, patch), floor(major, minor + 1, 0))
        }
        (Op::Caret, Some(minor), patch) => {
            let lower = full(minor, patch.unwrap_or(0));
            let upper = match (major, minor, patch) {
                (0, 0, Some(patch)) => floor(0, 0, patch + 1),
                (0, minor, _) => floor(0, minor + 1, 0),
                (major, _, _) => floor(major + 1, 0, 0),
            };
            Ranges::between(lower, upper)
        }
        (op, _, _) => return Err(format!("unsupported operator {:?}", op)),
    };
    Ok(range)
}

// Display #####################################################################

struct Lower<'a>(&'a Bound<semver::Version>);
struct Upper<'a>(&'a Bound<semver::Version>);

impl fmt::Display for Lower<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Bound::Included(v) => write!(f, ">={}", v),
            Bound::Excluded(v) => write!(f, ">{}", v),
            Bound::Unbounded => Ok(()),
        }
    }
}

impl fmt::Display for Upper<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Bound::Included(v) => write!(f, "<={}", v),
            Bound::Excluded(v) if v.pre.as_str() == "0" => {
                write!(f, "<{}", semver::Version::new(v.major, v.minor, v.patch))
            }
            Bound::Excluded(v) => write!(f, "<{}", v),
            Bound::Unbounded => Ok(()),
        }
    }
}

fn fmt_ranges(ranges: &Ranges<semver::Version>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (idx, (lower, upper)) in ranges.iter().enumerate() {
        if idx > 0 {
            f.write_str(" || ")?;
        }
        match (lower, upper) {
            (Bound::Unbounded, Bound::Unbounded) => f.write_str("*")?,
            (Bound::Included(a), Bound::Included(b)) if a == b => write!(f, "={}", a)?,
            (Bound::Unbounded, _) => write!(f, "{}", Upper(upper))?,
            (_, Bound::Unbounded) => write!(f, "{}", Lower(lower))?,
            _ => write!(f, "{}, {}", Lower(lower), Upper(upper))?,
        }
    }
    Ok(())
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::None => f.write_str("none"),
            Self::Revision(rev) => write!(f, "{}", rev),
            Self::Branch(name) => write!(f, "{}", name),
            Self::Tag(tag) => write!(f, "{}", tag),
            Self::Range(ranges) => fmt_ranges(ranges, f),
            Self::Version(v) => write!(f, "{}", v),
        }
    }
}

// TESTS #######################################################################
