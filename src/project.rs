// SPDX-License-Identifier: MPL-2.0

//! Projects, their identifiers and the packages they contain.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::constraint::Constraint;
use crate::lock::Lock;
use crate::manifest::Manifest;
use crate::version::PairedVersion;

/// Import path prefix of a fetchable unit, typically a repository root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectRoot(String);

impl ProjectRoot {
    /// Create a project root from its import path.
    pub fn new(root: impl Into<String>) -> Self {
        Self(root.into())
    }

    /// The import path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an import path belongs to this project.
    pub fn contains_import(&self, path: &str) -> bool {
        match path.strip_prefix(self.0.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl From<&str> for ProjectRoot {
    fn from(root: &str) -> Self {
        Self::new(root)
    }
}

impl From<String> for ProjectRoot {
    fn from(root: String) -> Self {
        Self(root)
    }
}

impl fmt::Display for ProjectRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A project root together with an optional alternate location
/// to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectIdentifier {
    /// The project root.
    pub root: ProjectRoot,
    /// Alternate source, such as a fork URL.
    pub source: Option<String>,
}

impl ProjectIdentifier {
    /// Identifier fetched from the location deduced from the root.
    pub fn new(root: impl Into<ProjectRoot>) -> Self {
        Self {
            root: root.into(),
            source: None,
        }
    }

    /// Identifier fetched from an alternate location.
    pub fn with_source(root: impl Into<ProjectRoot>, source: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            source: Some(source.into()),
        }
    }

    /// The location the project is actually fetched from.
    pub fn location(&self) -> &str {
        self.source.as_deref().unwrap_or(self.root.as_str())
    }
}

impl From<ProjectRoot> for ProjectIdentifier {
    fn from(root: ProjectRoot) -> Self {
        Self { root, source: None }
    }
}

impl fmt::Display for ProjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{} (from {})", self.root, source),
            None => write!(f, "{}", self.root),
        }
    }
}

/// What a project declares about one of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectProperties {
    /// Alternate source location.
    pub source: Option<String>,
    /// Acceptable versions.
    pub constraint: Constraint,
}

impl Default for ProjectProperties {
    fn default() -> Self {
        Self {
            source: None,
            constraint: Constraint::Any,
        }
    }
}

impl From<Constraint> for ProjectProperties {
    fn from(constraint: Constraint) -> Self {
        Self {
            source: None,
            constraint,
        }
    }
}

/// A project at a given version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    /// The project.
    pub id: ProjectIdentifier,
    /// The selected version.
    pub version: PairedVersion,
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Packages of a project at some revision, each with the import paths it uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageTree {
    packages: BTreeMap<String, BTreeSet<String>>,
}

impl PackageTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package and its imports.
    pub fn insert<I, S>(&mut self, package: impl Into<String>, imports: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages
            .entry(package.into())
            .or_default()
            .extend(imports.into_iter().map(Into::into));
    }

    /// Builder flavour of [insert](Self::insert).
    pub fn with<I, S>(mut self, package: impl Into<String>, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(package, imports);
        self
    }

    /// All package import paths, sorted.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Imports of a package, if it exists.
    pub fn imports(&self, package: &str) -> Option<&BTreeSet<String>> {
        self.packages.get(package)
    }

    /// Whether the tree has no package.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Packages of this tree reachable from the given ones by following imports.
    /// An empty starting set means every package.
    /// Starting packages absent from the tree are ignored.
    pub fn reachable<'a, I>(&self, from: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut stack: Vec<&str> = from
            .into_iter()
            .filter(|p| self.packages.contains_key(*p))
            .collect();
        if stack.is_empty() {
            return self.packages.keys().cloned().collect();
        }
        let mut seen = BTreeSet::new();
        while let Some(pkg) = stack.pop() {
            if !seen.insert(pkg.to_string()) {
                continue;
            }
            if let Some(imports) = self.packages.get(pkg) {
                for import in imports {
                    if self.packages.contains_key(import) && !seen.contains(import) {
                        stack.push(import);
                    }
                }
            }
        }
        seen
    }

    /// Imports of the given packages that are not packages of this tree.
    pub fn external_imports(&self, packages: &BTreeSet<String>) -> BTreeSet<String> {
        packages
            .iter()
            .filter_map(|p| self.packages.get(p))
            .flatten()
            .filter(|import| !self.packages.contains_key(*import))
            .cloned()
            .collect()
    }
}

/// What a source returns for a project at a revision.
#[derive(Debug, Clone, Default)]
pub struct ProjectInfo {
    /// The project manifest. Empty when the project has none.
    pub manifest: Manifest,
    /// The lock shipped by the project, if any.
    pub lock: Option<Lock>,
    /// Packages of the project.
    pub packages: PackageTree,
}

/// Import paths to leave out of the solve.
///
/// A rule is either an exact import path, or a path ending in `/...`
/// which also matches every import path below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoredRuleset {
    exact: BTreeSet<String>,
    prefixes: BTreeSet<String>,
}

impl IgnoredRuleset {
    /// Build a ruleset from the `ignored` list of a manifest.
    pub fn new<'a, I>(rules: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut set = Self::default();
        for rule in rules {
            match rule.strip_suffix("/...") {
                Some(prefix) => set.prefixes.insert(prefix.to_string()),
                None => set.exact.insert(rule.clone()),
            };
        }
        set
    }

    /// Whether an import path is ignored.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.exact.contains(path)
            || self
                .prefixes
                .iter()
                .any(|prefix| ProjectRoot::new(prefix.as_str()).contains_import(path))
    }

    /// Whether there is no rule.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_contains_import() {
        let root = ProjectRoot::new("github.com/foo/bar");
        assert!(root.contains_import("github.com/foo/bar"));
        assert!(root.contains_import("github.com/foo/bar/baz"));
        assert!(!root.contains_import("github.com/foo/barbaz"));
        assert!(!root.contains_import("github.com/foo"));
    }

    #[test]
    fn ignore_rules() {
        let rules = vec![
            "github.com/a/b".to_string(),
            "github.com/c/...".to_string(),
        ];
        let ignored = IgnoredRuleset::new(&rules);
        assert!(ignored.is_ignored("github.com/a/b"));
        assert!(!ignored.is_ignored("github.com/a/b/sub"));
        assert!(ignored.is_ignored("github.com/c"));
        assert!(ignored.is_ignored("github.com/c/d/e"));
        assert!(!ignored.is_ignored("github.com/cd"));
    }

    #[test]
    fn reachable_packages() {
        let tree = PackageTree::new()
            .with("r", ["r/util", "x/y"])
            .with("r/util", ["z"])
            .with("r/cmd", ["w"]);
        let from_root = tree.reachable(["r"]);
        assert_eq!(
            from_root.iter().map(String::as_str).collect::<Vec<_>>(),
            ["r", "r/util"]
        );
        assert_eq!(tree.reachable(std::iter::empty()).len(), 3);
        let ext = tree.external_imports(&from_root);
        assert_eq!(ext.iter().map(String::as_str).collect::<Vec<_>>(), ["x/y", "z"]);
    }
}
