// SPDX-License-Identifier: MPL-2.0

//! Handling solver errors.

use thiserror::Error;

use crate::project::ProjectIdentifier;
use crate::report::Diagnostic;
use crate::source::SourceError;

/// Errors that may occur while solving dependencies.
#[derive(Error, Debug)]
pub enum SolveError {
    /// Dependents pin mutually exclusive revisions of a project.
    #[error("incompatible constraints, no solution for {}", .0.root)]
    IncompatibleConstraints(Box<Diagnostic>),

    /// A project has no version at all, or none that satisfies its constraints.
    #[error("no versions of {} are available", .0.root)]
    NoVersionsAvailable(Box<Diagnostic>),

    /// Every combination of candidate versions was rejected.
    #[error("no solution, all candidates of {} were exhausted", .0.root)]
    Exhausted(Box<Diagnostic>),

    /// Fetching metadata of a project failed.
    /// Possibly transient: the whole solve can be retried.
    #[error("unable to fetch {project}")]
    SourceUnreachable {
        /// The project.
        project: ProjectIdentifier,
        /// What went wrong.
        source: SourceError,
    },

    /// The solve was cancelled.
    #[error("solving was cancelled")]
    Cancelled,

    /// The parameters are inconsistent.
    #[error("invalid solve parameters: {0}")]
    InvalidParameters(String),

    /// Something unexpected happened.
    #[error("{0}")]
    Failure(String),
}

/// Kind of a [SolveError], for callers that only need to branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [SolveError::IncompatibleConstraints].
    IncompatibleConstraints,
    /// See [SolveError::NoVersionsAvailable].
    NoVersionsAvailable,
    /// See [SolveError::Exhausted].
    Exhausted,
    /// See [SolveError::SourceUnreachable].
    SourceUnreachable,
    /// See [SolveError::Cancelled].
    Cancelled,
    /// See [SolveError::InvalidParameters].
    InvalidParameters,
    /// See [SolveError::Failure].
    Failure,
}

impl SolveError {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IncompatibleConstraints(_) => ErrorKind::IncompatibleConstraints,
            Self::NoVersionsAvailable(_) => ErrorKind::NoVersionsAvailable,
            Self::Exhausted(_) => ErrorKind::Exhausted,
            Self::SourceUnreachable { .. } => ErrorKind::SourceUnreachable,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidParameters(_) => ErrorKind::InvalidParameters,
            Self::Failure(_) => ErrorKind::Failure,
        }
    }

    /// The diagnostic of a search failure.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::IncompatibleConstraints(d) | Self::NoVersionsAvailable(d) | Self::Exhausted(d) => {
                Some(d)
            }
            _ => None,
        }
    }

    /// Wrap a source error, keeping cancellation distinguishable.
    pub(crate) fn from_source(project: &ProjectIdentifier, source: SourceError) -> Self {
        match source {
            SourceError::Cancelled => Self::Cancelled,
            source => Self::SourceUnreachable {
                project: project.clone(),
                source,
            },
        }
    }
}
