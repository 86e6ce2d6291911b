// SPDX-License-Identifier: MPL-2.0

//! Versions as they exist in a version control repository.
//!
//! A repository exposes branches, tags and revisions.
//! Tags that parse as semantic versions are [Version::Semver],
//! the other ones are kept verbatim as [Version::Tag].
//! Every listed version is paired with the immutable [Revision]
//! it currently points at, see [PairedVersion].

use std::cmp::Ordering;
use std::fmt;

/// Immutable content identifier, such as a git commit hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Wrap a revision identifier.
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Revision {
    fn from(rev: &str) -> Self {
        Self::new(rev)
    }
}

impl From<String> for Revision {
    fn from(rev: String) -> Self {
        Self(rev)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A version of a project, as named by its repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// A tag that parses as a semantic version.
    Semver(semver::Version),
    /// A branch. The default branch is the one a plain clone checks out.
    Branch {
        /// Branch name.
        name: String,
        /// Whether this is the repository default branch.
        default: bool,
    },
    /// A tag that is not a semantic version.
    Tag(String),
    /// A bare revision, not reachable through any name.
    Revision(Revision),
}

impl Version {
    /// Interpret a tag name: semantic versions (with an optional `v` prefix)
    /// become [Version::Semver], anything else is a plain [Version::Tag].
    pub fn from_tag(name: &str) -> Self {
        match parse_semver_tag(name) {
            Some(v) => Self::Semver(v),
            None => Self::Tag(name.to_string()),
        }
    }

    /// A non default branch.
    pub fn branch(name: impl Into<String>) -> Self {
        Self::Branch {
            name: name.into(),
            default: false,
        }
    }

    /// The default branch of a repository.
    pub fn default_branch(name: impl Into<String>) -> Self {
        Self::Branch {
            name: name.into(),
            default: true,
        }
    }

    /// Pair this version with the revision it points at.
    pub fn pair(self, revision: impl Into<Revision>) -> PairedVersion {
        PairedVersion::new(self, revision)
    }

    /// The semantic version, if this is one.
    pub fn as_semver(&self) -> Option<&semver::Version> {
        match self {
            Self::Semver(v) => Some(v),
            _ => None,
        }
    }
}

/// Parse a tag name as a semantic version, accepting a leading `v`.
pub(crate) fn parse_semver_tag(name: &str) -> Option<semver::Version> {
    let trimmed = name.strip_prefix('v').unwrap_or(name);
    semver::Version::parse(trimmed).ok()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semver(v) => write!(f, "{}", v),
            Self::Branch { name, .. } => write!(f, "{}", name),
            Self::Tag(tag) => write!(f, "{}", tag),
            Self::Revision(rev) => write!(f, "{}", rev),
        }
    }
}

/// A version together with the revision it currently resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairedVersion {
    version: Version,
    revision: Revision,
}

impl PairedVersion {
    /// Pair a version with a revision.
    /// A bare [Version::Revision] is always paired with itself.
    pub fn new(version: Version, revision: impl Into<Revision>) -> Self {
        let revision = match &version {
            Version::Revision(rev) => rev.clone(),
            _ => revision.into(),
        };
        Self { version, revision }
    }

    /// A bare revision with no name attached.
    pub fn bare(revision: Revision) -> Self {
        Self {
            version: Version::Revision(revision.clone()),
            revision,
        }
    }

    /// The named version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The underlying revision.
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Whether this is a bare revision.
    pub fn is_bare(&self) -> bool {
        matches!(self.version, Version::Revision(_))
    }
}

impl fmt::Display for PairedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Version::Revision(rev) => write!(f, "{}", rev),
            version => write!(f, "{} ({})", version, short(&self.revision)),
        }
    }
}

fn short(rev: &Revision) -> &str {
    let s = rev.as_str();
    s.get(..8).unwrap_or(s)
}

// Preference order ############################################################

/// Where pre-releases sit relative to branches in the preference order.
///
/// Both choices are reasonable when a range admits a pre-release
/// and a branch is also acceptable, so this is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PrereleasePolicy {
    /// Releases, then pre-releases, then branches.
    #[default]
    BeforeBranches,
    /// Releases, then branches, then pre-releases.
    AfterBranches,
}

/// Parameters of the preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionOrder {
    /// Prefer the lowest semantic versions instead of the highest.
    pub downgrade: bool,
    /// Placement of pre-releases.
    pub prerelease_policy: PrereleasePolicy,
}

impl VersionOrder {
    /// Compare two versions, the preferred one being the lesser.
    pub fn compare(&self, a: &Version, b: &Version) -> Ordering {
        let class = |v: &Version| self.class(v);
        class(a).cmp(&class(b)).then_with(|| match (a, b) {
            (Version::Semver(x), Version::Semver(y)) => {
                if self.downgrade {
                    x.cmp(y)
                } else {
                    y.cmp(x)
                }
            }
            (Version::Branch { name: x, .. }, Version::Branch { name: y, .. }) => x.cmp(y),
            (Version::Tag(x), Version::Tag(y)) => x.cmp(y),
            (Version::Revision(x), Version::Revision(y)) => x.cmp(y),
            _ => Ordering::Equal,
        })
    }

    fn class(&self, v: &Version) -> u8 {
        let after = self.prerelease_policy == PrereleasePolicy::AfterBranches;
        match v {
            Version::Semver(sv) if sv.pre.is_empty() => 0,
            Version::Semver(_) if after => 3,
            Version::Semver(_) => 1,
            Version::Branch { default: true, .. } if after => 1,
            Version::Branch { default: true, .. } => 2,
            Version::Branch { .. } if after => 2,
            Version::Branch { .. } => 3,
            Version::Tag(_) => 4,
            Version::Revision(_) => 5,
        }
    }
}

/// Sort candidates so that the preferred one comes first.
///
/// The locked version, when present among the candidates, always comes first.
/// Otherwise the order is: releases, pre-releases, default branch,
/// other branches, plain tags and finally bare revisions
/// (see [PrereleasePolicy] for the relative place of pre-releases).
/// Ties are broken on the revision so the order never depends on the input order.
pub fn sort_preference(
    candidates: &mut [PairedVersion],
    locked: Option<&PairedVersion>,
    order: &VersionOrder,
) {
    candidates.sort_by(|a, b| {
        let a_locked = locked == Some(a);
        let b_locked = locked == Some(b);
        b_locked
            .cmp(&a_locked)
            .then_with(|| order.compare(a.version(), b.version()))
            .then_with(|| a.revision().cmp(b.revision()))
    });
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;

    fn pv(v: Version, rev: &str) -> PairedVersion {
        v.pair(rev)
    }

    fn names(list: &[PairedVersion]) -> Vec<String> {
        list.iter().map(|p| p.version().to_string()).collect()
    }

    fn sample() -> Vec<PairedVersion> {
        vec![
            pv(Version::Revision(Revision::new("ffff")), "ffff"),
            pv(Version::from_tag("v1.0.0"), "a"),
            pv(Version::Tag("nightly".into()), "b"),
            pv(Version::branch("feature"), "c"),
            pv(Version::from_tag("2.0.0-beta.1"), "d"),
            pv(Version::default_branch("master"), "e"),
            pv(Version::from_tag("1.2.0"), "f"),
        ]
    }

    #[test]
    fn upgrade_order() {
        let mut list = sample();
        sort_preference(&mut list, None, &VersionOrder::default());
        assert_eq!(
            names(&list),
            ["1.2.0", "1.0.0", "2.0.0-beta.1", "master", "feature", "nightly", "ffff"]
        );
    }

    #[test]
    fn downgrade_order() {
        let mut list = sample();
        let order = VersionOrder {
            downgrade: true,
            ..VersionOrder::default()
        };
        sort_preference(&mut list, None, &order);
        assert_eq!(
            names(&list),
            ["1.0.0", "1.2.0", "2.0.0-beta.1", "master", "feature", "nightly", "ffff"]
        );
    }

    #[test]
    fn prereleases_after_branches() {
        let mut list = sample();
        let order = VersionOrder {
            prerelease_policy: PrereleasePolicy::AfterBranches,
            ..VersionOrder::default()
        };
        sort_preference(&mut list, None, &order);
        assert_eq!(
            names(&list),
            ["1.2.0", "1.0.0", "master", "feature", "2.0.0-beta.1", "nightly", "ffff"]
        );
    }

    #[test]
    fn locked_comes_first() {
        let mut list = sample();
        let locked = pv(Version::branch("feature"), "c");
        sort_preference(&mut list, Some(&locked), &VersionOrder::default());
        assert_eq!(list[0], locked);
        assert_eq!(list[1].version().to_string(), "1.2.0");
    }

    #[test]
    fn order_does_not_depend_on_input_order() {
        let mut forward = sample();
        let mut backward = sample();
        backward.reverse();
        sort_preference(&mut forward, None, &VersionOrder::default());
        sort_preference(&mut backward, None, &VersionOrder::default());
        assert_eq!(forward, backward);
    }

    #[test]
    fn tags() {
        assert_eq!(
            Version::from_tag("v1.2.3"),
            Version::Semver(semver::Version::new(1, 2, 3))
        );
        assert_eq!(Version::from_tag("release-7"), Version::Tag("release-7".into()));
    }

    #[test]
    fn bare_revision_pairs_with_itself() {
        let p = PairedVersion::new(Version::Revision(Revision::new("abc")), "ignored");
        assert_eq!(p.revision().as_str(), "abc");
        assert!(p.is_bare());
    }
}
