// SPDX-License-Identifier: MPL-2.0

//! The result of a successful solve.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::internal::core::{Selected, Solved};
use crate::lock::{Lock, LockedProject};
use crate::project::{PackageTree, ProjectRoot};
use crate::solver::SolveParameters;
use crate::version::{Revision, Version};

/// A revision for every project the root requires, as a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// The pinned projects, with the digest of the solve inputs as memo.
    pub lock: Lock,
    /// Number of candidate versions tried.
    pub attempts: usize,
}

impl Solution {
    pub(crate) fn from_selections(params: &SolveParameters, solved: Solved) -> Self {
        let projects = solved.selections.iter().map(locked_project).collect();
        Self {
            lock: Lock::new(Some(params.hash_inputs()), projects),
            attempts: solved.attempts,
        }
    }
}

fn locked_project(selected: &Selected) -> LockedProject {
    let atom = &selected.atom;
    let tree = &selected.info.packages;
    let used = tree.reachable(selected.packages.iter().map(String::as_str));
    let version = match atom.version.version() {
        Version::Revision(_) => None,
        version => Some(version.clone()),
    };
    LockedProject {
        id: atom.id.clone(),
        version,
        revision: atom.version.revision().clone(),
        packages: used
            .iter()
            .map(|pkg| relative(&atom.id.root, pkg))
            .collect(),
        digest: digest(&atom.id.root, atom.version.revision(), tree, &used),
    }
}

/// Path of a package relative to its project root, `.` for the root package.
fn relative(root: &ProjectRoot, package: &str) -> String {
    match package.strip_prefix(root.as_str()) {
        Some("") => ".".to_string(),
        Some(rest) => rest.trim_start_matches('/').to_string(),
        None => package.to_string(),
    }
}

/// Hex encoded SHA-256 of a revision and of the imports of the used packages.
pub fn digest(
    root: &ProjectRoot,
    revision: &Revision,
    tree: &PackageTree,
    used: &BTreeSet<String>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.as_str().as_bytes());
    hasher.update(b"@");
    hasher.update(revision.as_str().as_bytes());
    for package in used {
        hasher.update(b"\n");
        hasher.update(package.as_bytes());
        for import in tree.imports(package).into_iter().flatten() {
            hasher.update(b" ");
            hasher.update(import.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}
