// SPDX-License-Identifier: MPL-2.0

//! Locks: the exact revisions a solve settled on.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::project::{ProjectIdentifier, ProjectRoot};
use crate::version::{PairedVersion, Revision, Version};

/// File name of a lock.
pub const LOCK_NAME: &str = "deps.lock";

/// One pinned project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedProject {
    /// The project and where it was fetched from.
    pub id: ProjectIdentifier,
    /// Version name, absent when the revision was selected directly.
    pub version: Option<Version>,
    /// The pinned revision.
    pub revision: Revision,
    /// Packages used, relative to the project root (`.` is the root itself).
    pub packages: Vec<String>,
    /// Hex encoded SHA-256 of the revision and the used packages.
    pub digest: String,
}

impl LockedProject {
    /// The pinned version paired with its revision.
    pub fn paired(&self) -> PairedVersion {
        match &self.version {
            Some(v) => PairedVersion::new(v.clone(), self.revision.clone()),
            None => PairedVersion::bare(self.revision.clone()),
        }
    }

    /// Full import paths of the used packages.
    pub fn package_paths(&self) -> impl Iterator<Item = String> + '_ {
        let root = self.id.root.as_str();
        self.packages.iter().map(move |p| {
            if p == "." {
                root.to_string()
            } else {
                format!("{}/{}", root, p)
            }
        })
    }
}

impl fmt::Display for LockedProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.paired())
    }
}

/// Pinned projects, sorted by root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lock {
    /// Hash of the inputs the lock was computed from.
    pub memo: Option<String>,
    /// Pinned projects.
    pub projects: Vec<LockedProject>,
}

/// Errors reading a lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Not valid TOML, or not the expected shape.
    #[error("unable to parse lock: {0}")]
    Toml(#[from] toml::de::Error),
    /// The lock cannot be written as TOML.
    #[error("unable to write lock: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// A project has both a branch and a version.
    #[error("multiple versions specified for {name}, can only specify one")]
    MultipleVersions {
        /// The project.
        name: String,
    },
    /// A project appears twice.
    #[error("multiple entries for {name} in lock")]
    DuplicateProject {
        /// The project.
        name: String,
    },
}

/// On disk shape of a lock. Fields are in the order they are written.
#[derive(Serialize, Deserialize)]
struct RawLock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memo: Option<String>,
    #[serde(default)]
    projects: Vec<RawLockedProject>,
}

#[derive(Serialize, Deserialize)]
struct RawLockedProject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    digest: String,
    name: String,
    #[serde(default)]
    packages: Vec<String>,
    revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl From<&LockedProject> for RawLockedProject {
    fn from(p: &LockedProject) -> Self {
        let (branch, version) = match &p.version {
            Some(Version::Branch { name, .. }) => (Some(name.clone()), None),
            Some(Version::Semver(v)) => (None, Some(v.to_string())),
            Some(Version::Tag(tag)) => (None, Some(tag.clone())),
            Some(Version::Revision(_)) | None => (None, None),
        };
        Self {
            branch,
            digest: p.digest.clone(),
            name: p.id.root.to_string(),
            packages: p.packages.clone(),
            revision: p.revision.to_string(),
            source: p.id.source.clone(),
            version,
        }
    }
}

impl Lock {
    /// Build a lock, sorting projects by root.
    pub fn new(memo: Option<String>, mut projects: Vec<LockedProject>) -> Self {
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        Self { memo, projects }
    }

    /// The entry for a root.
    pub fn get(&self, root: &ProjectRoot) -> Option<&LockedProject> {
        self.projects.iter().find(|p| &p.id.root == root)
    }

    /// Parse a lock.
    pub fn from_toml_str(s: &str) -> Result<Self, LockError> {
        let raw: RawLock = toml::from_str(s)?;
        let mut seen = BTreeMap::new();
        for p in raw.projects {
            let version = match (p.branch, p.version) {
                (Some(_), Some(_)) => return Err(LockError::MultipleVersions { name: p.name }),
                (Some(branch), None) => Some(Version::branch(branch)),
                (None, Some(version)) => Some(Version::from_tag(&version)),
                (None, None) => None,
            };
            let root = ProjectRoot::new(p.name);
            if seen.contains_key(&root) {
                return Err(LockError::DuplicateProject {
                    name: root.to_string(),
                });
            }
            let id = ProjectIdentifier {
                root: root.clone(),
                source: p.source.filter(|s| !s.is_empty()),
            };
            seen.insert(
                root,
                LockedProject {
                    id,
                    version,
                    revision: Revision::new(p.revision),
                    packages: p.packages,
                    digest: p.digest,
                },
            );
        }
        Ok(Self {
            memo: raw.memo,
            projects: seen.into_values().collect(),
        })
    }

    /// Serialize to TOML, keys in alphabetical order.
    pub fn to_toml_string(&self) -> Result<String, LockError> {
        let raw = RawLock {
            memo: self.memo.clone(),
            projects: self.projects.iter().map(RawLockedProject::from).collect(),
        };
        Ok(toml::to_string_pretty(&raw)?)
    }
}

/// Difference between two locks, by project root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockDiff {
    /// Projects only in the new lock.
    pub added: Vec<LockedProject>,
    /// Projects only in the old lock.
    pub removed: Vec<LockedProject>,
    /// Projects in both with a different source, version, revision or package list,
    /// as `(old, new)`.
    pub changed: Vec<(LockedProject, LockedProject)>,
}

impl LockDiff {
    /// Compare two locks.
    pub fn between(old: &Lock, new: &Lock) -> Self {
        let old_map: BTreeMap<_, _> = old.projects.iter().map(|p| (&p.id.root, p)).collect();
        let new_map: BTreeMap<_, _> = new.projects.iter().map(|p| (&p.id.root, p)).collect();
        let mut diff = Self::default();
        for (root, p) in &new_map {
            match old_map.get(root) {
                None => diff.added.push((*p).clone()),
                Some(o) => {
                    if o.id != p.id
                        || o.version != p.version
                        || o.revision != p.revision
                        || o.packages != p.packages
                    {
                        diff.changed.push(((*o).clone(), (*p).clone()));
                    }
                }
            }
        }
        for (root, p) in &old_map {
            if !new_map.contains_key(root) {
                diff.removed.push((*p).clone());
            }
        }
        diff
    }

    /// Whether both locks pin the same projects the same way.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK: &str = r#"memo = "0123abcd"

[[projects]]
  branch = "master"
  digest = "feed"
  name = "github.com/a/branchy"
  packages = ["."]
  revision = "aaaa"

[[projects]]
  name = "github.com/b/bare"
  packages = [".", "sub/pkg"]
  revision = "bbbb"
  source = "https://example.com/fork.git"

[[projects]]
  digest = "beef"
  name = "github.com/c/tagged"
  packages = ["."]
  revision = "cccc"
  version = "1.4.0"
"#;

    #[test]
    fn golden_read() {
        let lock = Lock::from_toml_str(LOCK).unwrap();
        assert_eq!(lock.memo.as_deref(), Some("0123abcd"));
        assert_eq!(lock.projects.len(), 3);
        let bare = lock.get(&ProjectRoot::new("github.com/b/bare")).unwrap();
        assert!(bare.version.is_none());
        assert!(bare.paired().is_bare());
        assert_eq!(
            bare.package_paths().collect::<Vec<_>>(),
            ["github.com/b/bare", "github.com/b/bare/sub/pkg"]
        );
        let branchy = lock.get(&ProjectRoot::new("github.com/a/branchy")).unwrap();
        assert!(matches!(&branchy.version, Some(Version::Branch { name, .. }) if name == "master"));
    }

    #[test]
    fn written_lock_reads_back() {
        let lock = Lock::from_toml_str(LOCK).unwrap();
        let written = lock.to_toml_string().unwrap();
        assert_eq!(Lock::from_toml_str(&written).unwrap(), lock);
        assert!(written.starts_with("memo = \"0123abcd\""));
        assert_eq!(written.matches("[[projects]]").count(), 3);
        // Absent values are left out rather than written empty.
        assert_eq!(written.matches("digest").count(), 2);
        assert_eq!(written.matches("source").count(), 1);
        assert!(!written.contains("branch = \"\""));
    }

    #[test]
    fn empty_lock() {
        let written = Lock::default().to_toml_string().unwrap();
        assert_eq!(Lock::from_toml_str(&written).unwrap(), Lock::default());
        assert!(!written.contains("memo"));
    }

    #[test]
    fn branch_and_version() {
        let err = Lock::from_toml_str(
            r#"
            [[projects]]
              branch = "master"
              name = "github.com/a/b"
              revision = "aaaa"
              version = "1.0.0"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, LockError::MultipleVersions { .. }));
    }

    #[test]
    fn diff() {
        let old = Lock::from_toml_str(LOCK).unwrap();
        let mut new = old.clone();
        new.projects.remove(0);
        new.projects[1].revision = Revision::new("dddd");
        new.projects.push(LockedProject {
            id: ProjectIdentifier::new("github.com/d/new"),
            version: None,
            revision: Revision::new("eeee"),
            packages: vec![".".into()],
            digest: String::new(),
        });
        let diff = LockDiff::between(&old, &new);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.removed[0].id.root.as_str(), "github.com/a/branchy");
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].1.revision.as_str(), "dddd");
        assert!(LockDiff::between(&old, &old).is_empty());
    }
}
