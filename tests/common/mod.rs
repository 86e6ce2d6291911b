// SPDX-License-Identifier: MPL-2.0

//! Shared helpers of the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use revsolve::constraint::Constraint;
use revsolve::manifest::Manifest;
use revsolve::project::{ProjectProperties, ProjectRoot};
use revsolve::solution::Solution;
use revsolve::solver::SolveParameters;
use revsolve::source::{MemorySource, SourceBackend, SourceMgr, SourceMgrConfig};
use revsolve::version::{Revision, Version};

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn c(s: &str) -> Constraint {
    s.parse().unwrap()
}

/// In-memory projects, and a source manager serving them.
#[derive(Default)]
pub struct Registry {
    pub memory: Arc<MemorySource>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a version of a project depending on other projects.
    pub fn add(&self, root: &str, version: &str, deps: &[(&str, &str)]) -> Revision {
        self.memory.add_version(
            root,
            Version::from_tag(version),
            deps.iter().map(|(dep, constraint)| (*dep, c(constraint))),
        )
    }

    pub fn manager(&self) -> SourceMgr {
        SourceMgr::with_backends(
            SourceMgrConfig::default(),
            vec![self.memory.clone() as Arc<dyn SourceBackend>],
        )
    }
}

pub fn manifest(deps: &[(&str, &str)]) -> Manifest {
    let mut manifest = Manifest::default();
    for (dep, constraint) in deps {
        manifest
            .dependencies
            .insert(ProjectRoot::new(*dep), ProjectProperties::from(c(constraint)));
    }
    manifest
}

/// Parameters of a root project named `root`.
pub fn params(deps: &[(&str, &str)]) -> SolveParameters {
    SolveParameters::new("root", manifest(deps))
}

/// Selected version of every project, by root.
/// Bare revisions are shown as such.
pub fn versions(solution: &Solution) -> BTreeMap<String, String> {
    solution
        .lock
        .projects
        .iter()
        .map(|p| {
            let version = match &p.version {
                Some(v) => v.to_string(),
                None => p.revision.to_string(),
            };
            (p.id.root.to_string(), version)
        })
        .collect()
}

pub fn expected(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(root, version)| (root.to_string(), version.to_string()))
        .collect()
}
