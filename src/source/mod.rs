// SPDX-License-Identifier: MPL-2.0

//! Access to project metadata stored in version control repositories.
//!
//! The solver only talks to a [SourceManager].
//! [SourceMgr] is the provided implementation: it routes each project to a
//! [SourceBackend], one per version control system, and caches what they return.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::lock::LockError;
use crate::manifest::ManifestError;
use crate::project::{ProjectIdentifier, ProjectInfo, ProjectRoot};
use crate::version::{PairedVersion, Revision};

mod cache;
mod command;
pub mod deduce;
mod git;
mod hg;
mod imports;
mod memory;

pub use cache::{CacheStats, SourceMgr, SourceMgrConfig};
pub use git::{parse_ls_remote, GitSource};
pub use hg::HgSource;
pub use imports::ImportScanner;
pub use memory::{synthetic_revision, MemorySource};

/// Errors of a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The revision does not exist in the repository.
    #[error("revision {revision} does not exist in {project}")]
    UnknownRevision {
        /// The project.
        project: ProjectIdentifier,
        /// The missing revision.
        revision: Revision,
    },
    /// No backend accepts this project.
    #[error("no source backend can handle {0}")]
    NoBackend(ProjectIdentifier),
    /// The project root of an import path cannot be determined.
    #[error("unable to deduce the project root of {0}")]
    Undeducible(String),
    /// The repository cannot be reached.
    #[error("{project} is unreachable: {reason}")]
    Unreachable {
        /// The project.
        project: ProjectIdentifier,
        /// Why.
        reason: String,
    },
    /// A version control command exited with an error.
    #[error("`{command}` failed: {stderr}")]
    Command {
        /// The command line.
        command: String,
        /// What it printed on stderr.
        stderr: String,
    },
    /// A version control command did not finish in time.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        /// The command line.
        command: String,
        /// The limit.
        timeout: Duration,
    },
    /// Local I/O failure.
    #[error("{context}")]
    Io {
        /// What was being done.
        context: String,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The manifest of a project at some revision is invalid.
    #[error("invalid manifest in {project}")]
    Manifest {
        /// The project.
        project: ProjectIdentifier,
        /// The underlying error.
        source: ManifestError,
    },
    /// The lock of a project at some revision is invalid.
    #[error("invalid lock in {project}")]
    Lock {
        /// The project.
        project: ProjectIdentifier,
        /// The underlying error.
        source: LockError,
    },
    /// The fetch was cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// Cooperative cancellation signal, shared by clones.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the solver needs to know about projects.
///
/// Implementations are expected to cache: the solver calls these methods
/// again every time it reconsiders a project.
/// Every fetch gets the token of the solve asking for it and gives up with
/// [SourceError::Cancelled] once that token is cancelled.
pub trait SourceManager {
    /// Whether the project can be fetched at all.
    fn source_exists(&self, id: &ProjectIdentifier, cancel: &CancelToken)
        -> Result<bool, SourceError>;

    /// Every version of the project, in no particular order.
    fn list_versions(
        &self,
        id: &ProjectIdentifier,
        cancel: &CancelToken,
    ) -> Result<Arc<[PairedVersion]>, SourceError>;

    /// Manifest, lock and packages of the project at a revision.
    fn get_manifest_and_lock(
        &self,
        id: &ProjectIdentifier,
        revision: &Revision,
        cancel: &CancelToken,
    ) -> Result<Arc<ProjectInfo>, SourceError>;

    /// The root of the project providing an import path.
    fn deduce_root(&self, import_path: &str) -> Result<ProjectRoot, SourceError>;

    /// Hint that the versions of these projects will be needed soon.
    fn prefetch(&self, _ids: &[ProjectIdentifier], _cancel: &CancelToken) {}
}

/// A version control system.
pub trait SourceBackend: Send + Sync {
    /// Short name, used in logs.
    fn name(&self) -> &str;

    /// Whether this backend is in charge of the project.
    fn handles(&self, id: &ProjectIdentifier) -> bool;

    /// Whether the repository exists and can be reached.
    fn exists(&self, id: &ProjectIdentifier, cancel: &CancelToken) -> Result<bool, SourceError>;

    /// Every branch and tag of the repository with the revision it points at.
    fn list_versions(
        &self,
        id: &ProjectIdentifier,
        cancel: &CancelToken,
    ) -> Result<Vec<PairedVersion>, SourceError>;

    /// Manifest, lock and packages at a revision.
    ///
    /// Requirements come from the manifest and from the imports of the packages.
    /// The git and Mercurial backends only know imports when given an [ImportScanner].
    fn project_info(
        &self,
        id: &ProjectIdentifier,
        revision: &Revision,
        cancel: &CancelToken,
    ) -> Result<ProjectInfo, SourceError>;

    /// The project root providing an import path, when this backend can tell.
    fn deduce_root(&self, _import_path: &str) -> Option<ProjectRoot> {
        None
    }
}
