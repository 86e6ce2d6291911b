// SPDX-License-Identifier: MPL-2.0

//! Candidate versions of a project, in the order they are tried.

use std::collections::VecDeque;

use crate::constraint::Constraint;
use crate::project::ProjectIdentifier;
use crate::report::ConflictReason;
use crate::source::{CancelToken, SourceError, SourceManager};
use crate::version::{sort_preference, PairedVersion, VersionOrder};

/// Lazy sequence of the candidates of one decision.
///
/// When a preferred version is known (from a lock) and acceptable,
/// it is handed out first and the project is only listed if it fails.
#[derive(Debug, Clone)]
pub struct VersionQueue {
    id: ProjectIdentifier,
    constraint: Constraint,
    preferred: Option<PairedVersion>,
    pending: VecDeque<PairedVersion>,
    listed: bool,
    exists: bool,
    total: usize,
    excluded: Vec<PairedVersion>,
    tried: usize,
}

impl VersionQueue {
    pub fn new<S: SourceManager + ?Sized>(
        sm: &S,
        cancel: &CancelToken,
        id: ProjectIdentifier,
        constraint: Constraint,
        preferred: Option<PairedVersion>,
        order: &VersionOrder,
    ) -> Result<Self, SourceError> {
        let preferred = preferred.filter(|pv| constraint.matches(pv));
        let mut queue = Self {
            id,
            constraint,
            pending: preferred.iter().cloned().collect(),
            preferred,
            listed: false,
            exists: true,
            total: 0,
            excluded: Vec::new(),
            tried: 0,
        };
        if queue.preferred.is_none() {
            queue.list(sm, cancel, order)?;
        }
        Ok(queue)
    }

    fn list<S: SourceManager + ?Sized>(
        &mut self,
        sm: &S,
        cancel: &CancelToken,
        order: &VersionOrder,
    ) -> Result<(), SourceError> {
        self.listed = true;
        if !sm.source_exists(&self.id, cancel)? {
            self.exists = false;
            return Ok(());
        }
        let versions = sm.list_versions(&self.id, cancel)?;
        self.total = versions.len();
        let mut candidates = Vec::new();
        for pv in versions.iter() {
            if self.constraint.matches(pv) {
                candidates.push(pv.clone());
            } else {
                self.excluded.push(pv.clone());
            }
        }
        if let Some(rev) = self.constraint.as_revision() {
            if !candidates.iter().any(|pv| pv.revision() == rev) {
                candidates.push(PairedVersion::bare(rev.clone()));
            }
        }
        sort_preference(&mut candidates, self.preferred.as_ref(), order);
        if self.tried > 0 {
            // The preferred version was already handed out.
            if let Some(preferred) = &self.preferred {
                candidates.retain(|pv| pv.revision() != preferred.revision());
            }
        }
        self.pending.extend(candidates);
        Ok(())
    }

    /// Next candidate to try, listing the project if needed.
    pub fn next<S: SourceManager + ?Sized>(
        &mut self,
        sm: &S,
        cancel: &CancelToken,
        order: &VersionOrder,
    ) -> Result<Option<PairedVersion>, SourceError> {
        if self.pending.is_empty() && !self.listed {
            self.list(sm, cancel, order)?;
        }
        let next = self.pending.pop_front();
        if next.is_some() {
            self.tried += 1;
        }
        Ok(next)
    }

    /// Number of candidates left, counting an unlisted project as one.
    pub fn len_hint(&self) -> usize {
        self.pending.len()
    }

    /// Listed versions the constraint filtered out.
    pub fn excluded(&self) -> &[PairedVersion] {
        &self.excluded
    }

    pub fn tried(&self) -> usize {
        self.tried
    }

    /// Why no candidate at all was found.
    pub fn empty_reason(&self) -> ConflictReason {
        if !self.exists || self.total == 0 {
            ConflictReason::NoVersions
        } else {
            ConflictReason::NoMatchingVersion
        }
    }
}
