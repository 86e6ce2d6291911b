// SPDX-License-Identifier: MPL-2.0

//! Git repositories, through the `git` command line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info};
use parking_lot::Mutex;

use super::command::{self, Output};
use super::deduce::{self, cache_name, remote_url};
use super::imports::{scan_packages, ImportScanner};
use super::{CancelToken, SourceBackend, SourceError, SourceMgrConfig};
use crate::lock::{Lock, LOCK_NAME};
use crate::manifest::{Manifest, MANIFEST_NAME};
use crate::project::{ProjectIdentifier, ProjectInfo, ProjectRoot};
use crate::version::{PairedVersion, Revision, Version};

/// Git backend.
///
/// Versions are listed with `git ls-remote`. Manifests and packages are read
/// from a bare mirror kept under the cache directory.
/// Imports are only known with an [ImportScanner]; otherwise packages come with none.
pub struct GitSource {
    git: String,
    cache_dir: PathBuf,
    timeout: Duration,
    repo_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    scanner: Option<Arc<dyn ImportScanner>>,
}

impl GitSource {
    /// A backend using the `git` found in `PATH`.
    pub fn new(config: &SourceMgrConfig) -> Self {
        Self {
            git: "git".to_string(),
            cache_dir: config.cache_dir.join("git"),
            timeout: config.command_timeout(),
            repo_locks: DashMap::new(),
            scanner: None,
        }
    }

    /// Use another `git` executable.
    pub fn with_program(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    /// Read the imports of packages with this scanner.
    pub fn with_import_scanner(mut self, scanner: Arc<dyn ImportScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    fn git(&self, args: &[&str], dir: Option<&Path>, cancel: &CancelToken) -> Result<Output, SourceError> {
        command::run(&self.git, args, dir, self.timeout, cancel)
    }

    /// Path of the local mirror, cloning or updating it when it lacks the revision.
    fn mirror_with(
        &self,
        id: &ProjectIdentifier,
        revision: &Revision,
        cancel: &CancelToken,
    ) -> Result<PathBuf, SourceError> {
        let url = remote_url(id.location());
        let dir = self.cache_dir.join(cache_name(&url));
        let lock = self.repo_locks.entry(dir.clone()).or_default().clone();
        let _guard = lock.lock();

        if !dir.join("HEAD").exists() {
            std::fs::create_dir_all(&self.cache_dir).map_err(|source| SourceError::Io {
                context: format!("unable to create {}", self.cache_dir.display()),
                source,
            })?;
            let target = dir.to_string_lossy();
            info!("cloning {} into {}", url, target);
            self.git(&["clone", "--mirror", "--quiet", &url, &target], None, cancel)?;
        }
        if self.has_commit(&dir, revision, cancel)? {
            return Ok(dir);
        }
        debug!("{} lacks {}, fetching", url, revision);
        self.git(&["fetch", "--prune", "--quiet"], Some(&dir), cancel)?;
        if self.has_commit(&dir, revision, cancel)? {
            return Ok(dir);
        }
        Err(SourceError::UnknownRevision {
            project: id.clone(),
            revision: revision.clone(),
        })
    }

    fn has_commit(&self, dir: &Path, revision: &Revision, cancel: &CancelToken) -> Result<bool, SourceError> {
        let object = format!("{}^{{commit}}", revision);
        match self.git(&["cat-file", "-e", &object], Some(dir), cancel) {
            Ok(_) => Ok(true),
            Err(SourceError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_file(
        &self,
        dir: &Path,
        revision: &Revision,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<Option<String>, SourceError> {
        let listing = self.git(&["ls-tree", "--name-only", revision.as_str()], Some(dir), cancel)?;
        if !listing.stdout.lines().any(|l| l == name) {
            return Ok(None);
        }
        let object = format!("{}:{}", revision, name);
        let out = self.git(&["show", &object], Some(dir), cancel)?;
        Ok(Some(out.stdout))
    }
}

impl SourceBackend for GitSource {
    fn name(&self) -> &str {
        "git"
    }

    fn handles(&self, id: &ProjectIdentifier) -> bool {
        !super::hg::is_hg_location(id.location())
    }

    fn exists(&self, id: &ProjectIdentifier, cancel: &CancelToken) -> Result<bool, SourceError> {
        let url = remote_url(id.location());
        self.git(&["ls-remote", "--heads", &url], None, cancel)?;
        Ok(true)
    }

    fn list_versions(
        &self,
        id: &ProjectIdentifier,
        cancel: &CancelToken,
    ) -> Result<Vec<PairedVersion>, SourceError> {
        let url = remote_url(id.location());
        let out = self.git(&["ls-remote", "--symref", &url], None, cancel)?;
        Ok(parse_ls_remote(&out.stdout))
    }

    fn project_info(
        &self,
        id: &ProjectIdentifier,
        revision: &Revision,
        cancel: &CancelToken,
    ) -> Result<ProjectInfo, SourceError> {
        let dir = self.mirror_with(id, revision, cancel)?;
        let manifest = match self.read_file(&dir, revision, MANIFEST_NAME, cancel)? {
            Some(text) => Manifest::from_toml_str(&text).map_err(|source| SourceError::Manifest {
                project: id.clone(),
                source,
            })?,
            None => Manifest::default(),
        };
        let lock = match self.read_file(&dir, revision, LOCK_NAME, cancel)? {
            Some(text) => Some(Lock::from_toml_str(&text).map_err(|source| SourceError::Lock {
                project: id.clone(),
                source,
            })?),
            None => None,
        };
        let files = self.git(
            &["ls-tree", "-r", "--name-only", revision.as_str()],
            Some(&dir),
            cancel,
        )?;
        let packages = scan_packages(
            &id.root,
            files.stdout.lines(),
            self.scanner.as_deref(),
            |file| {
                let object = format!("{}:{}", revision, file);
                Ok(Some(self.git(&["show", &object], Some(&dir), cancel)?.stdout))
            },
        )?;
        Ok(ProjectInfo {
            manifest,
            lock,
            packages,
        })
    }

    fn deduce_root(&self, import_path: &str) -> Option<ProjectRoot> {
        deduce::deduce_root(import_path)
    }
}

/// Parse the output of `git ls-remote --symref`.
///
/// Branches come from `refs/heads`, the default one being the target of `HEAD`.
/// Annotated tags are paired with the commit they point at.
pub fn parse_ls_remote(output: &str) -> Vec<PairedVersion> {
    let mut default_branch = None;
    let mut head = None;
    let mut heads = BTreeMap::new();
    let mut tags = BTreeMap::new();
    for line in output.lines() {
        if let Some(symref) = line.strip_prefix("ref: ") {
            if let Some((target, "HEAD")) = symref.split_once('\t') {
                default_branch = target.strip_prefix("refs/heads/").map(str::to_string);
            }
            continue;
        }
        let Some((rev, name)) = line.split_once('\t') else {
            continue;
        };
        let rev = rev.trim();
        if name == "HEAD" {
            head = Some(rev.to_string());
        } else if let Some(branch) = name.strip_prefix("refs/heads/") {
            heads.insert(branch.to_string(), rev.to_string());
        } else if let Some(tag) = name.strip_prefix("refs/tags/") {
            match tag.strip_suffix("^{}") {
                // The peeled commit of an annotated tag wins over the tag object.
                Some(tag) => {
                    tags.insert(tag.to_string(), rev.to_string());
                }
                None => {
                    tags.entry(tag.to_string())
                        .or_insert_with(|| rev.to_string());
                }
            }
        }
    }
    if default_branch.is_none() {
        default_branch = head.and_then(|head| {
            heads
                .iter()
                .find(|(_, rev)| **rev == head)
                .map(|(name, _)| name.clone())
        });
    }

    let mut versions = Vec::with_capacity(heads.len() + tags.len());
    for (name, rev) in heads {
        let default = default_branch.as_deref() == Some(name.as_str());
        versions.push(PairedVersion::new(Version::Branch { name, default }, rev));
    }
    for (name, rev) in tags {
        versions.push(PairedVersion::new(Version::from_tag(&name), rev));
    }
    versions
}
