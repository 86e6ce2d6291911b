// SPDX-License-Identifier: MPL-2.0

//! Per solve graph of requirements between projects.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::constraint::Constraint;
use crate::internal::arena::{Arena, Id};
use crate::internal::core::DecisionId;
use crate::project::{Atom, ProjectIdentifier, ProjectInfo, ProjectRoot};
use crate::report::{ConflictReason, Culprit};
use crate::type_aliases::FxIndexMap;

pub type EdgeId = Id<Edge>;

/// A requirement of a dependent on a project.
#[derive(Debug, Clone)]
pub struct Edge {
    /// The dependent, `None` for the root project.
    pub from: Option<Atom>,
    pub target: ProjectIdentifier,
    /// Constraint after overrides, the one that is enforced.
    pub constraint: Constraint,
    /// Constraint as written by the dependent.
    pub declared: Constraint,
    /// Imported packages of the target.
    pub packages: BTreeSet<String>,
    /// Decisions this edge exists because of.
    pub causes: BTreeSet<DecisionId>,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub atom: Atom,
    pub level: DecisionId,
    pub info: Arc<ProjectInfo>,
    /// Selected while no dependent imported any package of it,
    /// so every package was expanded.
    pub whole: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RootState {
    pub edges: Vec<EdgeId>,
    pub selection: Option<Selection>,
}

/// An edge that cannot be added.
#[derive(Debug, Clone)]
pub struct GraphConflict {
    pub reason: ConflictReason,
    /// Existing edges the new one clashes with.
    pub edges: Vec<EdgeId>,
    /// Level of the selection the new edge rejects.
    pub selection: Option<DecisionId>,
}

/// Edges between projects and the selected version of each project.
///
/// Edges live in an arena so that undoing a search branch
/// is a truncation to the mark taken before it.
#[derive(Debug, Default)]
pub struct ProjectGraph {
    edges: Arena<Edge>,
    roots: FxIndexMap<ProjectRoot, RootState>,
}

impl ProjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn edges_of(&self, root: &ProjectRoot) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.roots
            .get(root)
            .into_iter()
            .flat_map(|state| state.edges.iter())
            .map(|&id| (id, &self.edges[id]))
    }

    pub fn selection(&self, root: &ProjectRoot) -> Option<&Selection> {
        self.roots.get(root).and_then(|s| s.selection.as_ref())
    }

    /// Selected projects, in the order they were first required.
    pub fn selections(&self) -> impl Iterator<Item = &Selection> {
        self.roots.values().filter_map(|s| s.selection.as_ref())
    }

    pub fn mark(&self) -> EdgeId {
        self.edges.mark()
    }

    /// Add an edge unless it conflicts with the edges already on its target,
    /// or with the version selected for its target.
    pub fn add_or_tighten(&mut self, edge: Edge) -> Result<EdgeId, GraphConflict> {
        let root = edge.target.root.clone();
        let state = self.roots.entry(root).or_default();

        let mut pins = Vec::new();
        let mut disjoint = Vec::new();
        let mut sources = Vec::new();
        let mut combined = Ok(Constraint::Any);
        for &id in &state.edges {
            let existing = &self.edges[id];
            // No source means the location deduced from the root.
            if existing.target.location() != edge.target.location() {
                sources.push(id);
            }
            match existing.constraint.intersect(&edge.constraint) {
                Err(_) => pins.push(id),
                Ok(c) if c.is_none() => disjoint.push(id),
                Ok(_) => {}
            }
            combined = combined.and_then(|c: Constraint| c.intersect(&existing.constraint));
        }
        if !pins.is_empty() {
            return Err(GraphConflict {
                reason: ConflictReason::IncompatiblePins,
                edges: pins,
                selection: None,
            });
        }
        if !sources.is_empty() {
            return Err(GraphConflict {
                reason: ConflictReason::SourceMismatch,
                edges: sources,
                selection: None,
            });
        }
        let combined = combined.and_then(|c| c.intersect(&edge.constraint));
        if !disjoint.is_empty() || !matches!(combined, Ok(ref c) if !c.is_none()) {
            // Without a pairwise culprit, the whole set of edges is to blame.
            let edges = if disjoint.is_empty() {
                state.edges.clone()
            } else {
                disjoint
            };
            return Err(GraphConflict {
                reason: ConflictReason::DisjointConstraints,
                edges,
                selection: None,
            });
        }
        if let Some(sel) = &state.selection {
            let source_clash = sel.atom.id.location() != edge.target.location();
            if source_clash || !edge.constraint.matches(&sel.atom.version) {
                let reason = if source_clash {
                    ConflictReason::SourceMismatch
                } else {
                    ConflictReason::SelectedVersionRejected {
                        selected: sel.atom.clone(),
                    }
                };
                return Err(GraphConflict {
                    reason,
                    edges: Vec::new(),
                    selection: Some(sel.level),
                });
            }
        }
        let id = self.edges.alloc(edge);
        state.edges.push(id);
        Ok(id)
    }

    pub fn select(&mut self, atom: Atom, level: DecisionId, info: Arc<ProjectInfo>) {
        let whole = self.required_packages(&atom.id.root).is_empty();
        let state = self.roots.entry(atom.id.root.clone()).or_default();
        state.selection = Some(Selection {
            atom,
            level,
            info,
            whole,
        });
    }

    /// Packages of a selected project that were expanded, empty for all of them.
    pub fn expanded_packages(&self, root: &ProjectRoot) -> BTreeSet<String> {
        match self.selection(root) {
            Some(sel) if sel.whole => BTreeSet::new(),
            _ => self.required_packages(root),
        }
    }

    pub fn unselect(&mut self, root: &ProjectRoot) -> Option<Selection> {
        self.roots.get_mut(root).and_then(|s| s.selection.take())
    }

    /// Undo every selection made at `level` or later.
    pub fn unselect_from(&mut self, level: DecisionId) {
        for state in self.roots.values_mut() {
            if matches!(&state.selection, Some(sel) if sel.level >= level) {
                state.selection = None;
            }
        }
    }

    /// Drop every edge added at or after `mark`.
    pub fn truncate(&mut self, mark: EdgeId) {
        self.edges.truncate(mark);
        for state in self.roots.values_mut() {
            while matches!(state.edges.last(), Some(&id) if id >= mark) {
                state.edges.pop();
            }
        }
    }

    /// Roots with at least one edge and no selection, in the order they were first required.
    pub fn unsatisfied_roots(&self) -> Vec<ProjectRoot> {
        self.roots
            .iter()
            .filter(|(_, s)| !s.edges.is_empty() && s.selection.is_none())
            .map(|(root, _)| root.clone())
            .collect()
    }

    /// Packages of a project imported by its dependents.
    /// Empty when it is only required through manifests.
    pub fn required_packages(&self, root: &ProjectRoot) -> BTreeSet<String> {
        self.edges_of(root)
            .flat_map(|(_, e)| e.packages.iter().cloned())
            .collect()
    }

    /// Intersection of every constraint on a project.
    pub fn effective_constraint(&self, root: &ProjectRoot) -> Constraint {
        self.edges_of(root)
            .try_fold(Constraint::Any, |acc, (_, e)| acc.intersect(&e.constraint))
            .unwrap_or(Constraint::None)
    }

    /// The project with the source its dependents agree on.
    pub fn identifier(&self, root: &ProjectRoot) -> ProjectIdentifier {
        let source = self
            .edges_of(root)
            .find_map(|(_, e)| e.target.source.clone());
        ProjectIdentifier {
            root: root.clone(),
            source,
        }
    }

    /// Selected dependents leading from the root project to `atom`, `atom` included.
    pub fn requirement_path(&self, atom: &Atom) -> Vec<Atom> {
        let mut chain = vec![atom.clone()];
        let mut seen = BTreeSet::new();
        seen.insert(atom.id.root.clone());
        let mut current = atom.id.root.clone();
        while let Some((_, edge)) = self.edges_of(&current).next() {
            let Some(from) = &edge.from else { break };
            if !seen.insert(from.id.root.clone()) {
                break;
            }
            chain.push(from.clone());
            current = from.id.root.clone();
        }
        chain.reverse();
        chain
    }

    pub fn culprit(&self, edge: &Edge) -> Culprit {
        Culprit {
            dependent: edge.from.clone(),
            constraint: edge.constraint.clone(),
            source: edge.target.source.clone(),
            chain: edge
                .from
                .as_ref()
                .map(|from| self.requirement_path(from))
                .unwrap_or_default(),
        }
    }
}
