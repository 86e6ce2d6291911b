// SPDX-License-Identifier: MPL-2.0

//! Build a report as clear as possible as to why
//! dependency solving failed.

use std::fmt::{self, Write};

use crate::constraint::Constraint;
use crate::project::{Atom, ProjectRoot};

/// Why a candidate version, or a whole project, was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Two dependents pin different revisions.
    IncompatiblePins,
    /// Two dependents require versions that have nothing in common.
    DisjointConstraints,
    /// Two dependents want the project from different sources.
    SourceMismatch,
    /// A dependent does not accept the version already selected.
    SelectedVersionRejected {
        /// The selected version.
        selected: Atom,
    },
    /// Versions exist but none satisfies the constraints.
    NoMatchingVersion,
    /// The project has no version at all, or does not exist.
    NoVersions,
    /// The candidate revision cannot be fetched.
    RevisionUnavailable,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompatiblePins => f.write_str("mutually exclusive revision pins"),
            Self::DisjointConstraints => f.write_str("constraints with no version in common"),
            Self::SourceMismatch => f.write_str("conflicting sources"),
            Self::SelectedVersionRejected { selected } => {
                write!(f, "the selected {} is not acceptable", selected)
            }
            Self::NoMatchingVersion => f.write_str("no version matches the constraints"),
            Self::NoVersions => f.write_str("no version is available"),
            Self::RevisionUnavailable => f.write_str("the revision cannot be fetched"),
        }
    }
}

/// A requirement that took part in a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Culprit {
    /// The project that requires, `None` for the root project.
    pub dependent: Option<Atom>,
    /// What it requires.
    pub constraint: Constraint,
    /// Alternate source it requires, if any.
    pub source: Option<String>,
    /// Selected projects leading from the root project to the dependent.
    pub chain: Vec<Atom>,
}

/// One rejection recorded during the search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The project whose constraints clashed.
    pub target: ProjectRoot,
    /// The candidate that was being tried, if any.
    pub candidate: Option<Atom>,
    /// Why.
    pub reason: ConflictReason,
    /// Requirements involved.
    pub culprits: Vec<Culprit>,
}

/// Everything known about a failed solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The project that ran out of candidates last.
    pub root: ProjectRoot,
    /// The conflicts that explain the failure.
    pub conflicts: Vec<Conflict>,
    /// Number of candidate versions tried.
    pub attempts: usize,
}

impl Diagnostic {
    /// Dependents blamed by at least one conflict, without duplicates.
    pub fn dependents(&self) -> Vec<&Atom> {
        let mut out: Vec<&Atom> = Vec::new();
        for culprit in self.conflicts.iter().flat_map(|c| &c.culprits) {
            if let Some(atom) = &culprit.dependent {
                if !out.contains(&atom) {
                    out.push(atom);
                }
            }
        }
        out
    }

    /// Whether one of the conflicts is between revision pins.
    pub fn has_incompatible_pins(&self) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.reason == ConflictReason::IncompatiblePins)
    }
}

/// Reporter trait.
pub trait Reporter {
    /// Output type of the report.
    type Output;

    /// Generate a report from the diagnostic
    /// describing the resolution failure.
    fn report(diagnostic: &Diagnostic) -> Self::Output;
}

/// Default reporter able to generate an explanation as a [String].
pub struct DefaultStringReporter;

impl DefaultStringReporter {
    fn culprit(out: &mut String, target: &ProjectRoot, culprit: &Culprit) {
        let who = match &culprit.dependent {
            Some(atom) => atom.to_string(),
            None => "the root project".to_string(),
        };
        let _ = write!(out, "  {} requires {}", who, target);
        if !culprit.constraint.is_any() {
            let _ = write!(out, " {}", culprit.constraint);
        }
        if let Some(source) = &culprit.source {
            let _ = write!(out, " from {}", source);
        }
        if culprit.chain.len() > 1 {
            let chain: Vec<String> = culprit.chain.iter().map(|a| a.id.root.to_string()).collect();
            let _ = write!(out, " (via {})", chain.join(" -> "));
        }
        out.push('\n');
    }
}

impl Reporter for DefaultStringReporter {
    type Output = String;

    fn report(diagnostic: &Diagnostic) -> Self::Output {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Unable to find versions for {} after {} attempts.",
            diagnostic.root, diagnostic.attempts
        );
        for conflict in &diagnostic.conflicts {
            match &conflict.candidate {
                Some(candidate) => {
                    let _ = writeln!(
                        out,
                        "{} rejected because of {} on {}:",
                        candidate, conflict.reason, conflict.target
                    );
                }
                None => {
                    let _ = writeln!(out, "{}: {}:", conflict.target, conflict.reason);
                }
            }
            for culprit in &conflict.culprits {
                Self::culprit(&mut out, &conflict.target, culprit);
            }
        }
        out
    }
}
