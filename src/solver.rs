// SPDX-License-Identifier: MPL-2.0

//! Version solving by conflict-directed backjumping.
//!
//! The solver keeps a stack of decisions, one per project it had to pick
//! a version for. Every requirement it records remembers which decisions
//! it exists because of. When all candidates of a decision are rejected,
//! the union of those causes tells how far up the stack the problem lies,
//! and the search jumps straight there instead of retrying the decisions
//! in between.
//!
//! ## API
//!
//! ```
//! # use std::sync::Arc;
//! # use revsolve::constraint::Constraint;
//! # use revsolve::manifest::Manifest;
//! # use revsolve::project::ProjectProperties;
//! # use revsolve::solver::{resolve, SolveParameters};
//! # use revsolve::source::{MemorySource, SourceBackend, SourceMgr, SourceMgrConfig};
//! # use revsolve::version::Version;
//! #
//! let memory = Arc::new(MemorySource::new());
//! memory.add_version("example.com/a", Version::from_tag("v1.0.0"), []);
//! let sm = SourceMgr::with_backends(
//!     SourceMgrConfig::default(),
//!     vec![memory as Arc<dyn SourceBackend>],
//! );
//!
//! let mut manifest = Manifest::default();
//! manifest.dependencies.insert(
//!     "example.com/a".into(),
//!     ProjectProperties::from("^1.0.0".parse::<Constraint>()?),
//! );
//! let params = SolveParameters::new("example.com/root", manifest);
//! let solution = resolve(&sm, &params)?;
//! assert_eq!(solution.lock.projects.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Versions of the projects, and their manifests, are provided by a
//! [SourceManager]. The call to [resolve] returns a [Solution] holding
//! the lock, or a [SolveError] explaining as well as possible
//! why no solution exists.

use std::collections::BTreeSet;

use log::info;
use sha2::{Digest, Sha256};

use crate::error::SolveError;
use crate::internal::core::State;
use crate::lock::Lock;
use crate::manifest::Manifest;
use crate::project::{PackageTree, ProjectRoot};
use crate::solution::Solution;
use crate::source::{CancelToken, SourceManager};
use crate::version::{PrereleasePolicy, VersionOrder};

/// Everything a solve depends on, apart from the sources.
#[derive(Debug, Clone)]
pub struct SolveParameters {
    /// Import path of the project being solved.
    pub root: ProjectRoot,
    /// Its manifest.
    pub manifest: Manifest,
    /// Its packages. Imports of projects that are not declared
    /// in the manifest become requirements too.
    pub root_packages: PackageTree,
    /// A previous solution, used as preferences only.
    pub lock: Option<Lock>,
    /// Ignore every locked version.
    pub change_all: bool,
    /// Ignore the locked version of these projects.
    pub to_change: BTreeSet<ProjectRoot>,
    /// Prefer the lowest acceptable versions.
    pub downgrade: bool,
    /// Where pre-releases sit relative to branches.
    pub prerelease_policy: PrereleasePolicy,
    /// Stops the solve, and the fetches it started, when cancelled.
    pub cancel: CancelToken,
}

impl SolveParameters {
    /// Parameters for a root project and its manifest, with no lock.
    pub fn new(root: impl Into<ProjectRoot>, manifest: Manifest) -> Self {
        Self {
            root: root.into(),
            manifest,
            root_packages: PackageTree::default(),
            lock: None,
            change_all: false,
            to_change: BTreeSet::new(),
            downgrade: false,
            prerelease_policy: PrereleasePolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Set the packages of the root project.
    pub fn with_packages(mut self, packages: PackageTree) -> Self {
        self.root_packages = packages;
        self
    }

    /// Prefer the versions of a previous solution.
    pub fn with_lock(mut self, lock: Lock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Ignore every locked version.
    pub fn change_all(mut self) -> Self {
        self.change_all = true;
        self
    }

    /// Ignore the locked version of one project.
    pub fn change(mut self, root: impl Into<ProjectRoot>) -> Self {
        self.to_change.insert(root.into());
        self
    }

    /// Prefer the lowest acceptable versions.
    pub fn downgrade(mut self, downgrade: bool) -> Self {
        self.downgrade = downgrade;
        self
    }

    /// Set the pre-release placement.
    pub fn with_prerelease_policy(mut self, policy: PrereleasePolicy) -> Self {
        self.prerelease_policy = policy;
        self
    }

    /// Use this token to cancel the solve.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn order(&self) -> VersionOrder {
        VersionOrder {
            downgrade: self.downgrade,
            prerelease_policy: self.prerelease_policy,
        }
    }

    /// Check the parameters are consistent.
    pub fn validate(&self) -> Result<(), SolveError> {
        if self.root.as_str().is_empty() {
            return Err(SolveError::InvalidParameters(
                "the root import path is empty".into(),
            ));
        }
        if self.manifest.dependencies.contains_key(&self.root)
            || self.manifest.overrides.contains_key(&self.root)
        {
            return Err(SolveError::InvalidParameters(format!(
                "{} cannot depend on itself",
                self.root
            )));
        }
        if !self.to_change.is_empty() {
            let Some(lock) = &self.lock else {
                return Err(SolveError::InvalidParameters(
                    "projects to change were given without a lock".into(),
                ));
            };
            for root in &self.to_change {
                if lock.get(root).is_none() {
                    return Err(SolveError::InvalidParameters(format!(
                        "{} is not in the lock and cannot be changed",
                        root
                    )));
                }
            }
        }
        Ok(())
    }

    /// Hex encoded SHA-256 of the inputs that determine a solution:
    /// the manifest, the imports of the root packages and the pre-release policy.
    ///
    /// A lock whose memo equals this digest was produced from the same inputs.
    pub fn hash_inputs(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.manifest.to_toml_string().as_bytes());
        let all = self.root_packages.reachable(std::iter::empty::<&str>());
        for import in self.root_packages.external_imports(&all) {
            if !self.root.contains_import(&import) {
                hasher.update(import.as_bytes());
                hasher.update(b"\n");
            }
        }
        hasher.update(format!("{:?}", self.prerelease_policy).as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Main function of the library.
/// Finds a revision for every project the root transitively requires.
pub fn resolve<S: SourceManager + ?Sized>(
    source_manager: &S,
    params: &SolveParameters,
) -> Result<Solution, SolveError> {
    params.validate()?;
    info!("solving dependencies of {}", params.root);
    let solved = State::init(source_manager, params).solve()?;
    let solution = Solution::from_selections(params, solved);
    info!(
        "solved {} with {} projects after {} attempts",
        params.root,
        solution.lock.projects.len(),
        solution.attempts
    );
    Ok(solution)
}
