// SPDX-License-Identifier: MPL-2.0

//! Core model and functions
//! of the conflict-directed backjumping search.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::debug;

use crate::error::SolveError;
use crate::internal::arena::{Arena, Id};
use crate::internal::graph::{Edge, EdgeId, GraphConflict, ProjectGraph};
use crate::internal::queue::VersionQueue;
use crate::manifest::Manifest;
use crate::project::{
    Atom, IgnoredRuleset, PackageTree, ProjectIdentifier, ProjectInfo, ProjectProperties,
    ProjectRoot,
};
use crate::report::{Conflict, ConflictReason, Diagnostic};
use crate::solver::SolveParameters;
use crate::source::{SourceError, SourceManager};
use crate::version::{PairedVersion, VersionOrder};

/// The level of a decision is its place in the decision stack.
pub type DecisionId = Id<Decision>;

/// A project the search is picking a version for.
#[derive(Debug)]
pub struct Decision {
    id: ProjectIdentifier,
    queue: VersionQueue,
    /// First edge allocated after this decision was taken.
    edge_mark: EdgeId,
    /// Earlier decisions that caused candidates of this one to be rejected.
    conflict_set: BTreeSet<DecisionId>,
    conflicts: Vec<Conflict>,
}

/// A project of a successful solve.
#[derive(Debug, Clone)]
pub struct Selected {
    pub atom: Atom,
    pub info: Arc<ProjectInfo>,
    /// Packages that were expanded, empty when the whole project was.
    pub packages: BTreeSet<String>,
}

/// Outcome of a successful search.
#[derive(Debug, Clone)]
pub struct Solved {
    pub selections: Vec<Selected>,
    pub attempts: usize,
}

/// Why a candidate cannot be selected, and which decisions are to blame.
struct Rejection {
    conflict: Conflict,
    causes: BTreeSet<DecisionId>,
}

/// Packages of a selected project whose imports still have to become edges.
struct Expansion {
    atom: Atom,
    info: Arc<ProjectInfo>,
    packages: BTreeSet<String>,
    /// Whether the manifest dependencies are included.
    declared: bool,
    causes: BTreeSet<DecisionId>,
}

type Requirements = BTreeMap<ProjectRoot, (ProjectProperties, BTreeSet<String>)>;

/// Current state of the search.
pub struct State<'a, S: ?Sized> {
    sm: &'a S,
    params: &'a SolveParameters,
    order: VersionOrder,
    ignored: IgnoredRuleset,
    graph: ProjectGraph,
    decisions: Arena<Decision>,
    attempts: usize,
}

impl<'a, S: SourceManager + ?Sized> State<'a, S> {
    /// Initialization of the search state.
    pub fn init(sm: &'a S, params: &'a SolveParameters) -> Self {
        Self {
            sm,
            params,
            order: params.order(),
            ignored: params.manifest.ignored_ruleset(),
            graph: ProjectGraph::new(),
            decisions: Arena::new(),
            attempts: 0,
        }
    }

    /// Run the search to completion.
    pub fn solve(mut self) -> Result<Solved, SolveError> {
        self.seed()?;
        loop {
            if self.params.cancel.is_cancelled() {
                debug!("cancelled after {} attempts", self.attempts);
                return Err(SolveError::Cancelled);
            }
            let Some((id, queue)) = self.pick_next()? else {
                return Ok(self.into_solved());
            };
            let level = self.decisions.alloc(Decision {
                id,
                queue,
                edge_mark: self.graph.mark(),
                conflict_set: BTreeSet::new(),
                conflicts: Vec::new(),
            });
            debug!(
                "decision {} on {}",
                level.into_raw(),
                self.decisions[level].id
            );
            self.advance(level)?;
        }
    }

    /// Requirements of the root project.
    fn seed(&mut self) -> Result<(), SolveError> {
        let params = self.params;
        let tree = &params.root_packages;
        let packages = tree.reachable(std::iter::empty::<&str>());
        let requirements = self.requirements(&params.root, &params.manifest, true, tree, &packages)?;
        for (root, (declared, imported)) in requirements {
            let edge = self.edge(None, root, declared, imported, BTreeSet::new());
            if let Err(conflict) = self.graph.add_or_tighten(edge.clone()) {
                let diagnostic = Diagnostic {
                    root: edge.target.root.clone(),
                    conflicts: vec![Conflict {
                        target: edge.target.root.clone(),
                        candidate: None,
                        reason: conflict.reason,
                        culprits: vec![self.graph.culprit(&edge)],
                    }],
                    attempts: 0,
                };
                return Err(SolveError::NoVersionsAvailable(Box::new(diagnostic)));
            }
        }
        Ok(())
    }

    /// The unsatisfied project with the fewest candidates, ties broken by name.
    fn pick_next(&self) -> Result<Option<(ProjectIdentifier, VersionQueue)>, SolveError> {
        let mut best: Option<(usize, ProjectIdentifier, VersionQueue)> = None;
        for root in self.graph.unsatisfied_roots() {
            let id = self.graph.identifier(&root);
            let constraint = self.graph.effective_constraint(&root);
            let preferred = self.preferred(&id);
            let queue = VersionQueue::new(
                self.sm,
                &self.params.cancel,
                id.clone(),
                constraint,
                preferred,
                &self.order,
            )
            .map_err(|err| SolveError::from_source(&id, err))?;
            let count = queue.len_hint();
            let better = match &best {
                None => true,
                Some((c, b, _)) => (count, &id.root) < (*c, &b.root),
            };
            if better {
                best = Some((count, id, queue));
            }
        }
        Ok(best.map(|(_, id, queue)| (id, queue)))
    }

    /// Locked version to try first: from the root lock,
    /// otherwise from the lock of an already selected project.
    fn preferred(&self, id: &ProjectIdentifier) -> Option<PairedVersion> {
        let params = self.params;
        if params.change_all || params.to_change.contains(&id.root) {
            return None;
        }
        let locked = params
            .lock
            .as_ref()
            .and_then(|lock| lock.get(&id.root))
            .or_else(|| {
                self.graph
                    .selections()
                    .find_map(|sel| sel.info.lock.as_ref().and_then(|lock| lock.get(&id.root)))
            })?;
        (locked.id.location() == id.location()).then(|| locked.paired())
    }

    /// Try candidates of a decision until one fits,
    /// backjumping when a decision runs out of candidates.
    fn advance(&mut self, mut level: DecisionId) -> Result<(), SolveError> {
        loop {
            let next = {
                let decision = &mut self.decisions[level];
                decision
                    .queue
                    .next(self.sm, &self.params.cancel, &self.order)
                    .map_err(|err| SolveError::from_source(&decision.id, err))?
            };
            match next {
                Some(version) => {
                    self.attempts += 1;
                    if self.try_candidate(level, version)? {
                        return Ok(());
                    }
                }
                None => {
                    self.record_empty(level);
                    let causes = self.exhaustion_causes(level);
                    match causes.last().copied() {
                        None => return Err(self.failure(level)),
                        Some(target) => {
                            self.backjump(level, target, causes);
                            level = target;
                        }
                    }
                }
            }
        }
    }

    fn try_candidate(&mut self, level: DecisionId, version: PairedVersion) -> Result<bool, SolveError> {
        let atom = Atom {
            id: self.decisions[level].id.clone(),
            version,
        };
        debug!("trying {}", atom);
        let info = match self.sm.get_manifest_and_lock(
            &atom.id,
            atom.version.revision(),
            &self.params.cancel,
        ) {
            Ok(info) => info,
            Err(SourceError::UnknownRevision { .. }) => {
                let rejection = self.unavailable(level, &atom);
                self.reject(level, &atom, rejection);
                return Ok(false);
            }
            Err(err) => return Err(SolveError::from_source(&atom.id, err)),
        };
        self.graph.select(atom.clone(), level, info.clone());
        match self.expand(level, &atom, info)? {
            Ok(targets) => {
                debug!("selected {}", atom);
                if !targets.is_empty() {
                    self.sm.prefetch(&targets, &self.params.cancel);
                }
                Ok(true)
            }
            Err(rejection) => {
                self.reject(level, &atom, rejection);
                Ok(false)
            }
        }
    }

    /// Add the edges of a newly selected atom.
    /// Returns the projects that got required and have no version yet.
    fn expand(
        &mut self,
        level: DecisionId,
        atom: &Atom,
        info: Arc<ProjectInfo>,
    ) -> Result<Result<Vec<ProjectIdentifier>, Rejection>, SolveError> {
        let required = self.graph.required_packages(&atom.id.root);
        let packages = info.packages.reachable(required.iter().map(String::as_str));
        let mut work = vec![Expansion {
            atom: atom.clone(),
            info,
            packages,
            declared: true,
            causes: BTreeSet::from([level]),
        }];
        let mut targets = Vec::new();
        while let Some(item) = work.pop() {
            let requirements = self.requirements(
                &item.atom.id.root,
                &item.info.manifest,
                item.declared,
                &item.info.packages,
                &item.packages,
            )?;
            for (root, (declared, imported)) in requirements {
                let before = self.graph.required_packages(&root);
                let edge = self.edge(
                    Some(item.atom.clone()),
                    root,
                    declared,
                    imported,
                    item.causes.clone(),
                );
                if let Err(conflict) = self.graph.add_or_tighten(edge.clone()) {
                    return Ok(Err(self.rejection(level, atom, &edge, conflict)));
                }
                let Some(sel) = self.graph.selection(&edge.target.root) else {
                    targets.push(self.graph.identifier(&edge.target.root));
                    continue;
                };
                if sel.whole {
                    continue;
                }
                let tree = &sel.info.packages;
                let fresh: Vec<&str> = edge
                    .packages
                    .iter()
                    .filter(|p| !before.contains(*p) && tree.imports(p).is_some())
                    .map(String::as_str)
                    .collect();
                if fresh.is_empty() {
                    continue;
                }
                let done = tree.reachable(before.iter().map(String::as_str));
                let packages: BTreeSet<String> =
                    tree.reachable(fresh).difference(&done).cloned().collect();
                if !packages.is_empty() {
                    let mut causes = edge.causes.clone();
                    causes.insert(sel.level);
                    work.push(Expansion {
                        atom: sel.atom.clone(),
                        info: sel.info.clone(),
                        packages,
                        declared: false,
                        causes,
                    });
                }
            }
        }
        targets.sort();
        targets.dedup();
        Ok(Ok(targets))
    }

    /// Projects required by some packages of a dependent, with what its manifest
    /// says about them and the packages imported from each.
    fn requirements(
        &self,
        owner: &ProjectRoot,
        manifest: &Manifest,
        declared: bool,
        tree: &PackageTree,
        packages: &BTreeSet<String>,
    ) -> Result<Requirements, SolveError> {
        let mut out = Requirements::new();
        if declared {
            for (root, props) in &manifest.dependencies {
                if !self.skipped(owner, root) {
                    out.insert(root.clone(), (props.clone(), BTreeSet::new()));
                }
            }
        }
        for import in tree.external_imports(packages) {
            if self.ignored.is_ignored(&import)
                || owner.contains_import(&import)
                || self.params.root.contains_import(&import)
            {
                continue;
            }
            let declared_root = manifest
                .dependencies
                .keys()
                .filter(|root| root.contains_import(&import))
                .max_by_key(|root| root.as_str().len());
            let root = match declared_root {
                Some(root) => root.clone(),
                None => self.sm.deduce_root(&import).map_err(|err| {
                    SolveError::from_source(&ProjectIdentifier::new(import.as_str()), err)
                })?,
            };
            if self.skipped(owner, &root) {
                continue;
            }
            let props = manifest.dependencies.get(&root).cloned().unwrap_or_default();
            out.entry(root)
                .or_insert_with(|| (props, BTreeSet::new()))
                .1
                .insert(import);
        }
        Ok(out)
    }

    fn skipped(&self, owner: &ProjectRoot, target: &ProjectRoot) -> bool {
        target == owner || *target == self.params.root || self.ignored.is_ignored(target.as_str())
    }

    /// An edge with the overrides of the root manifest applied.
    fn edge(
        &self,
        from: Option<Atom>,
        root: ProjectRoot,
        declared: ProjectProperties,
        packages: BTreeSet<String>,
        causes: BTreeSet<DecisionId>,
    ) -> Edge {
        let mut constraint = declared.constraint.clone();
        let mut source = declared.source;
        if let Some(over) = self.params.manifest.overrides.get(&root) {
            if !over.constraint.is_any() {
                constraint = over.constraint.clone();
            }
            if over.source.is_some() {
                source = over.source.clone();
            }
        }
        Edge {
            from,
            target: ProjectIdentifier { root, source },
            constraint,
            declared: declared.constraint,
            packages,
            causes,
        }
    }

    fn rejection(
        &self,
        level: DecisionId,
        atom: &Atom,
        edge: &Edge,
        conflict: GraphConflict,
    ) -> Rejection {
        let mut causes = edge.causes.clone();
        let mut culprits = Vec::new();
        for &id in &conflict.edges {
            let existing = self.graph.edge(id);
            causes.extend(existing.causes.iter().copied());
            culprits.push(self.graph.culprit(existing));
        }
        culprits.push(self.graph.culprit(edge));
        if let Some(selected) = conflict.selection {
            causes.insert(selected);
        }
        causes.remove(&level);
        debug!(
            "{} rejected: {} on {}",
            atom, conflict.reason, edge.target
        );
        Rejection {
            conflict: Conflict {
                target: edge.target.root.clone(),
                candidate: Some(atom.clone()),
                reason: conflict.reason,
                culprits,
            },
            causes,
        }
    }

    /// A candidate whose revision cannot be fetched.
    /// Only the edges pinning that revision are to blame.
    fn unavailable(&self, level: DecisionId, atom: &Atom) -> Rejection {
        let revision = atom.version.revision();
        let pins: Vec<&Edge> = self
            .graph
            .edges_of(&atom.id.root)
            .map(|(_, edge)| edge)
            .filter(|edge| edge.constraint.as_revision() == Some(revision))
            .collect();
        let causes = pins
            .iter()
            .flat_map(|edge| edge.causes.iter().copied())
            .filter(|&cause| cause != level)
            .collect();
        debug!("{} rejected: revision unavailable", atom);
        Rejection {
            conflict: Conflict {
                target: atom.id.root.clone(),
                candidate: Some(atom.clone()),
                reason: ConflictReason::RevisionUnavailable,
                culprits: pins.iter().map(|edge| self.graph.culprit(edge)).collect(),
            },
            causes,
        }
    }

    /// Undo a candidate.
    fn reject(&mut self, level: DecisionId, atom: &Atom, rejection: Rejection) {
        self.graph.unselect(&atom.id.root);
        self.graph.truncate(self.decisions[level].edge_mark);
        let decision = &mut self.decisions[level];
        decision.conflict_set.extend(rejection.causes);
        decision.conflicts.push(rejection.conflict);
    }

    /// Explain a decision that had no candidate at all.
    fn record_empty(&mut self, level: DecisionId) {
        let decision = &self.decisions[level];
        if decision.queue.tried() > 0 {
            return;
        }
        let root = decision.id.root.clone();
        let reason = decision.queue.empty_reason();
        debug!("no candidate for {}: {}", root, reason);
        let culprits = self
            .graph
            .edges_of(&root)
            .map(|(_, edge)| self.graph.culprit(edge))
            .collect();
        self.decisions[level].conflicts.push(Conflict {
            target: root,
            candidate: None,
            reason,
            culprits,
        });
    }

    /// Decisions to blame once every candidate of `level` was rejected:
    /// those that rejected candidates, those that filtered versions out
    /// and one that made the project required at all.
    fn exhaustion_causes(&self, level: DecisionId) -> BTreeSet<DecisionId> {
        let decision = &self.decisions[level];
        let edges: Vec<&Edge> = self
            .graph
            .edges_of(&decision.id.root)
            .map(|(_, edge)| edge)
            .collect();
        let mut causes = decision.conflict_set.clone();
        if let Some(edge) = edges.iter().min_by_key(|edge| edge.causes.last().copied()) {
            causes.extend(edge.causes.iter().copied());
        }
        for version in decision.queue.excluded() {
            let rejecting = edges
                .iter()
                .filter(|edge| !edge.constraint.matches(version))
                .min_by_key(|edge| edge.causes.last().copied());
            match rejecting {
                Some(edge) => causes.extend(edge.causes.iter().copied()),
                None => {
                    for edge in &edges {
                        causes.extend(edge.causes.iter().copied());
                    }
                }
            }
        }
        causes.remove(&level);
        causes
    }

    /// Jump back to `target`, dropping every decision taken after it.
    fn backjump(&mut self, from: DecisionId, target: DecisionId, causes: BTreeSet<DecisionId>) {
        debug!(
            "backjump from {} on {} to {} on {}",
            from.into_raw(),
            self.decisions[from].id.root,
            target.into_raw(),
            self.decisions[target].id.root
        );
        let conflicts = std::mem::take(&mut self.decisions[from].conflicts);
        self.graph.unselect_from(target);
        self.graph.truncate(self.decisions[target].edge_mark);
        self.decisions.truncate_after(target);
        let decision = &mut self.decisions[target];
        decision
            .conflict_set
            .extend(causes.into_iter().filter(|&cause| cause != target));
        decision.conflicts.extend(conflicts);
    }

    /// Terminal failure of the search.
    fn failure(&mut self, level: DecisionId) -> SolveError {
        let decision = &mut self.decisions[level];
        let mut diagnostic = Diagnostic {
            root: decision.id.root.clone(),
            conflicts: std::mem::take(&mut decision.conflicts),
            attempts: self.attempts,
        };
        debug!(
            "no solution: {} exhausted with {} conflicts",
            diagnostic.root,
            diagnostic.conflicts.len()
        );
        if diagnostic.has_incompatible_pins() {
            return SolveError::IncompatibleConstraints(Box::new(diagnostic));
        }
        let no_versions = diagnostic.conflicts.iter().all(|c| {
            matches!(
                c.reason,
                ConflictReason::NoVersions | ConflictReason::NoMatchingVersion
            )
        });
        match diagnostic.conflicts.first() {
            Some(first) if no_versions => {
                diagnostic.root = first.target.clone();
                SolveError::NoVersionsAvailable(Box::new(diagnostic))
            }
            _ => SolveError::Exhausted(Box::new(diagnostic)),
        }
    }

    fn into_solved(self) -> Solved {
        let selections = self
            .graph
            .selections()
            .map(|sel| Selected {
                atom: sel.atom.clone(),
                info: sel.info.clone(),
                packages: self.graph.expanded_packages(&sel.atom.id.root),
            })
            .collect();
        Solved {
            selections,
            attempts: self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::lock::{Lock, LockedProject};
    use crate::source::{synthetic_revision, MemorySource, SourceBackend, SourceMgr, SourceMgrConfig};
    use crate::version::Version;

    fn manager(memory: MemorySource) -> SourceMgr {
        SourceMgr::with_backends(
            SourceMgrConfig::default(),
            vec![Arc::new(memory) as Arc<dyn SourceBackend>],
        )
    }

    fn c(s: &str) -> Constraint {
        s.parse().unwrap()
    }

    fn root_params(deps: &[(&str, &str)]) -> SolveParameters {
        let mut manifest = Manifest::default();
        for (root, constraint) in deps {
            manifest
                .dependencies
                .insert(ProjectRoot::new(*root), ProjectProperties::from(c(constraint)));
        }
        SolveParameters::new("root", manifest)
    }

    #[test]
    fn backjump_skips_unrelated_decisions() {
        let _ = env_logger::builder().is_test(true).try_init();
        let memory = MemorySource::new();
        memory.add_version("a", Version::from_tag("1.0.0"), []);
        memory.add_version(
            "a",
            Version::from_tag("2.0.0"),
            [("y", c("^2.0.0")), ("z", Constraint::Any)],
        );
        for v in ["1.0.0", "1.1.0", "1.2.0"] {
            memory.add_version("b", Version::from_tag(v), []);
        }
        for v in ["1.0.0", "2.0.0"] {
            memory.add_version("y", Version::from_tag(v), []);
        }
        memory.add_version("z", Version::from_tag("1.0.0"), [("y", c("^1.0.0"))]);
        let sm = manager(memory);

        // Locked versions are tried first, so `a` and `b` are decided before `y` and `z`.
        let locked = |root: &str, v: &str| {
            let version = Version::from_tag(v);
            LockedProject {
                id: ProjectIdentifier::new(root),
                revision: synthetic_revision(root, &version),
                version: Some(version),
                packages: vec![".".into()],
                digest: String::new(),
            }
        };
        let lock = Lock::new(None, vec![locked("a", "2.0.0"), locked("b", "1.0.0")]);
        let params = root_params(&[("a", "*"), ("b", "*")]).with_lock(lock);
        let solved = State::init(&sm, &params).solve().unwrap();
        let picked: BTreeMap<String, String> = solved
            .selections
            .iter()
            .map(|s| (s.atom.id.root.to_string(), s.atom.version.version().to_string()))
            .collect();
        assert_eq!(picked.len(), 2);
        assert_eq!(picked["a"], "1.0.0");
        assert_eq!(picked["b"], "1.0.0");
        // a@2.0.0, b@1.0.0, y@2.0.0 and z@1.0.0, then straight back to a@1.0.0
        // and b@1.0.0 again. Other versions of `b` are never tried.
        assert_eq!(solved.attempts, 6);
    }

    #[test]
    fn root_constraint_with_no_version() {
        let memory = MemorySource::new();
        memory.add_version("a", Version::from_tag("1.0.0"), []);
        let sm = manager(memory);
        let params = root_params(&[("a", "^2.0.0")]);
        match State::init(&sm, &params).solve() {
            Err(SolveError::NoVersionsAvailable(d)) => {
                assert_eq!(d.root, ProjectRoot::new("a"));
                assert_eq!(d.conflicts[0].reason, ConflictReason::NoMatchingVersion);
            }
            other => panic!("unexpected {:?}", other.map(|s| s.attempts)),
        }
    }
}
