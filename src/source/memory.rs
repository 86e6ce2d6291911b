// SPDX-License-Identifier: MPL-2.0

//! A source backend holding everything in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{CancelToken, SourceBackend, SourceError};
use crate::constraint::Constraint;
use crate::manifest::Manifest;
use crate::project::{ProjectIdentifier, ProjectInfo, ProjectProperties, ProjectRoot};
use crate::version::{PairedVersion, Revision, Version};

/// How often a simulated fetch checks for cancellation.
const POLL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct MemoryProject {
    versions: Vec<PairedVersion>,
    infos: BTreeMap<Revision, ProjectInfo>,
}

/// Projects registered programmatically.
///
/// Handles every project: those never registered simply do not exist.
/// Useful for tests, benchmarks and offline tooling.
#[derive(Default)]
pub struct MemorySource {
    projects: RwLock<BTreeMap<ProjectRoot, MemoryProject>>,
    unreachable: RwLock<BTreeSet<ProjectRoot>>,
    latency: Duration,
    list_calls: AtomicU64,
    info_calls: AtomicU64,
}

impl MemorySource {
    /// An empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long in every listing and info fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register a version of a project with its direct dependencies.
    /// The root package of the project imports every dependency.
    /// Returns the revision the version points at.
    pub fn add_version<'a, I>(&self, root: &str, version: Version, deps: I) -> Revision
    where
        I: IntoIterator<Item = (&'a str, Constraint)>,
    {
        let revision = synthetic_revision(root, &version);
        let mut info = ProjectInfo::default();
        let mut imports = Vec::new();
        for (dep, constraint) in deps {
            imports.push(dep.to_string());
            info.manifest
                .dependencies
                .insert(ProjectRoot::new(dep), ProjectProperties::from(constraint));
        }
        info.packages.insert(root, imports);
        self.add(root, version.pair(revision.clone()), info);
        revision
    }

    /// Register a listed version with its full project info.
    pub fn add(&self, root: &str, version: PairedVersion, info: ProjectInfo) {
        let mut projects = self.projects.write();
        let project = projects.entry(ProjectRoot::new(root)).or_default();
        project.infos.insert(version.revision().clone(), info);
        project.versions.retain(|v| v.version() != version.version());
        project.versions.push(version);
    }

    /// Register a revision that no branch or tag points at.
    pub fn add_unlisted(&self, root: &str, revision: Revision, info: ProjectInfo) {
        self.projects
            .write()
            .entry(ProjectRoot::new(root))
            .or_default()
            .infos
            .insert(revision, info);
    }

    /// Register a project with a manifest but no package.
    pub fn add_manifest(&self, root: &str, version: Version, manifest: Manifest) -> Revision {
        let revision = synthetic_revision(root, &version);
        let info = ProjectInfo {
            manifest,
            lock: None,
            packages: Default::default(),
        };
        self.add(root, version.pair(revision.clone()), info);
        revision
    }

    /// Every call for this project fails as if the network was down.
    pub fn set_unreachable(&self, root: &str) {
        self.unreachable.write().insert(ProjectRoot::new(root));
    }

    /// Number of version listings served.
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of project infos served.
    pub fn info_calls(&self) -> u64 {
        self.info_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self, id: &ProjectIdentifier) -> Result<(), SourceError> {
        if self.unreachable.read().contains(&id.root) {
            return Err(SourceError::Unreachable {
                project: id.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    /// Simulate latency, giving up as soon as `cancel` is triggered.
    fn wait(&self, cancel: &CancelToken) -> Result<(), SourceError> {
        let deadline = Instant::now() + self.latency;
        loop {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(POLL.min(deadline - now));
        }
    }
}

/// Stable fake commit hash for a version of a project.
pub fn synthetic_revision(root: &str, version: &Version) -> Revision {
    let digest = Sha256::digest(format!("{}@{}", root, version).as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(40);
    Revision::new(hex)
}

impl SourceBackend for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn handles(&self, _id: &ProjectIdentifier) -> bool {
        true
    }

    fn exists(&self, id: &ProjectIdentifier, _cancel: &CancelToken) -> Result<bool, SourceError> {
        self.check_reachable(id)?;
        Ok(self.projects.read().contains_key(&id.root))
    }

    fn list_versions(
        &self,
        id: &ProjectIdentifier,
        cancel: &CancelToken,
    ) -> Result<Vec<PairedVersion>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.wait(cancel)?;
        self.check_reachable(id)?;
        Ok(self
            .projects
            .read()
            .get(&id.root)
            .map(|p| p.versions.clone())
            .unwrap_or_default())
    }

    fn project_info(
        &self,
        id: &ProjectIdentifier,
        revision: &Revision,
        cancel: &CancelToken,
    ) -> Result<ProjectInfo, SourceError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.wait(cancel)?;
        self.check_reachable(id)?;
        self.projects
            .read()
            .get(&id.root)
            .and_then(|p| p.infos.get(revision))
            .cloned()
            .ok_or_else(|| SourceError::UnknownRevision {
                project: id.clone(),
                revision: revision.clone(),
            })
    }

    fn deduce_root(&self, import_path: &str) -> Option<ProjectRoot> {
        let projects = self.projects.read();
        let unreachable = self.unreachable.read();
        projects
            .keys()
            .chain(unreachable.iter())
            .filter(|root| root.contains_import(import_path))
            .max_by_key(|root| root.as_str().len())
            .cloned()
    }
}
