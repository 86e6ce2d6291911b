// SPDX-License-Identifier: MPL-2.0

//! Mercurial repositories, through the `hg` command line.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::info;
use parking_lot::Mutex;

use super::command::{self, Output};
use super::deduce::{cache_name, remote_url};
use super::imports::{scan_packages, ImportScanner};
use super::{CancelToken, SourceBackend, SourceError, SourceMgrConfig};
use crate::lock::{Lock, LOCK_NAME};
use crate::manifest::{Manifest, MANIFEST_NAME};
use crate::project::{ProjectIdentifier, ProjectInfo};
use crate::version::{PairedVersion, Revision, Version};

/// Whether a location designates a Mercurial repository:
/// an `hg+` scheme prefix or a path element ending in `.hg`.
pub(crate) fn is_hg_location(location: &str) -> bool {
    location.starts_with("hg+") || location.split('/').any(|part| part.ends_with(".hg"))
}

/// Mercurial backend.
///
/// Mercurial cannot list a remote without cloning it, so every operation
/// works on a local clone kept under the cache directory.
pub struct HgSource {
    hg: String,
    cache_dir: PathBuf,
    timeout: Duration,
    repo_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    scanner: Option<Arc<dyn ImportScanner>>,
}

impl HgSource {
    /// A backend using the `hg` found in `PATH`.
    pub fn new(config: &SourceMgrConfig) -> Self {
        Self {
            hg: "hg".to_string(),
            cache_dir: config.cache_dir.join("hg"),
            timeout: config.command_timeout(),
            repo_locks: DashMap::new(),
            scanner: None,
        }
    }

    /// Read the imports of packages with this scanner.
    pub fn with_import_scanner(mut self, scanner: Arc<dyn ImportScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    fn hg(&self, args: &[&str], dir: Option<&Path>, cancel: &CancelToken) -> Result<Output, SourceError> {
        command::run(&self.hg, args, dir, self.timeout, cancel)
    }

    /// Local clone, pulled when `refresh` is set.
    fn clone_of(&self, id: &ProjectIdentifier, refresh: bool, cancel: &CancelToken) -> Result<PathBuf, SourceError> {
        let url = remote_url(id.location());
        let dir = self.cache_dir.join(cache_name(&url));
        let lock = self.repo_locks.entry(dir.clone()).or_default().clone();
        let _guard = lock.lock();
        if !dir.join(".hg").exists() {
            std::fs::create_dir_all(&self.cache_dir).map_err(|source| SourceError::Io {
                context: format!("unable to create {}", self.cache_dir.display()),
                source,
            })?;
            let target = dir.to_string_lossy();
            info!("cloning {} into {}", url, target);
            self.hg(&["clone", "--noupdate", "--quiet", &url, &target], None, cancel)?;
        } else if refresh {
            self.hg(&["pull", "--quiet"], Some(&dir), cancel)?;
        }
        Ok(dir)
    }

    fn has_revision(&self, dir: &Path, revision: &Revision, cancel: &CancelToken) -> Result<bool, SourceError> {
        match self.hg(&["log", "-r", revision.as_str(), "-T", "{node}"], Some(dir), cancel) {
            Ok(_) => Ok(true),
            Err(SourceError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl SourceBackend for HgSource {
    fn name(&self) -> &str {
        "hg"
    }

    fn handles(&self, id: &ProjectIdentifier) -> bool {
        is_hg_location(id.location())
    }

    fn exists(&self, id: &ProjectIdentifier, cancel: &CancelToken) -> Result<bool, SourceError> {
        let url = remote_url(id.location());
        self.hg(&["identify", &url], None, cancel)?;
        Ok(true)
    }

    fn list_versions(
        &self,
        id: &ProjectIdentifier,
        cancel: &CancelToken,
    ) -> Result<Vec<PairedVersion>, SourceError> {
        let dir = self.clone_of(id, true, cancel)?;
        let branches = self.hg(&["branches", "-T", "{branch}\t{node}\n"], Some(&dir), cancel)?;
        let bookmarks = self.hg(&["bookmarks", "-T", "{bookmark}\t{node}\n"], Some(&dir), cancel)?;
        let tags = self.hg(&["tags", "-T", "{tag}\t{node}\n"], Some(&dir), cancel)?;
        Ok(parse_hg_refs(&branches.stdout, &bookmarks.stdout, &tags.stdout))
    }

    fn project_info(
        &self,
        id: &ProjectIdentifier,
        revision: &Revision,
        cancel: &CancelToken,
    ) -> Result<ProjectInfo, SourceError> {
        let mut dir = self.clone_of(id, false, cancel)?;
        if !self.has_revision(&dir, revision, cancel)? {
            dir = self.clone_of(id, true, cancel)?;
            if !self.has_revision(&dir, revision, cancel)? {
                return Err(SourceError::UnknownRevision {
                    project: id.clone(),
                    revision: revision.clone(),
                });
            }
        }
        let files = self.hg(&["files", "-r", revision.as_str()], Some(&dir), cancel)?;
        let files: BTreeSet<&str> = files.stdout.lines().map(str::trim).collect();

        let cat = |name: &str| -> Result<Option<String>, SourceError> {
            if !files.contains(name) {
                return Ok(None);
            }
            let out = self.hg(&["cat", "-r", revision.as_str(), name], Some(&dir), cancel)?;
            Ok(Some(out.stdout))
        };
        let manifest = match cat(MANIFEST_NAME)? {
            Some(text) => Manifest::from_toml_str(&text).map_err(|source| SourceError::Manifest {
                project: id.clone(),
                source,
            })?,
            None => Manifest::default(),
        };
        let lock = match cat(LOCK_NAME)? {
            Some(text) => Some(Lock::from_toml_str(&text).map_err(|source| SourceError::Lock {
                project: id.clone(),
                source,
            })?),
            None => None,
        };

        let packages = scan_packages(&id.root, files.iter().copied(), self.scanner.as_deref(), cat)?;
        Ok(ProjectInfo {
            manifest,
            lock,
            packages,
        })
    }
}

/// Branches (named branches and bookmarks) and tags of a Mercurial repository,
/// each output being lines of `name<TAB>node`.
fn parse_hg_refs(branches: &str, bookmarks: &str, tags: &str) -> Vec<PairedVersion> {
    let pairs = |text: &'_ str| -> Vec<(String, String)> {
        text.lines()
            .filter_map(|l| l.split_once('\t'))
            .map(|(name, node)| (name.trim().to_string(), node.trim().to_string()))
            .collect()
    };
    let mut versions = Vec::new();
    for (name, node) in pairs(branches).into_iter().chain(pairs(bookmarks)) {
        let default = name == "default";
        versions.push(PairedVersion::new(Version::Branch { name, default }, node));
    }
    for (name, node) in pairs(tags) {
        if name != "tip" {
            versions.push(PairedVersion::new(Version::from_tag(&name), node));
        }
    }
    versions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hg_locations() {
        assert!(is_hg_location("hg+https://example.com/repo"));
        assert!(is_hg_location("example.com/repo.hg"));
        assert!(!is_hg_location("github.com/a/b"));
    }

    #[test]
    fn refs() {
        let versions = parse_hg_refs(
            "default\taaaa\nstable\tbbbb\n",
            "feature\tcccc\n",
            "tip\taaaa\n1.2.0\tbbbb\n",
        );
        assert_eq!(versions.len(), 4);
        assert_eq!(versions[0], Version::default_branch("default").pair("aaaa"));
        assert_eq!(versions[2], Version::branch("feature").pair("cccc"));
        assert_eq!(versions[3], Version::from_tag("1.2.0").pair("bbbb"));
    }
}
