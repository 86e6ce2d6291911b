// SPDX-License-Identifier: MPL-2.0

//! The source manager: backend routing and a coalescing metadata cache.
//!
//! Every cached value lives in a per-key slot. The first caller for a key
//! takes the slot lock and fetches; concurrent callers for the same key block
//! on the lock and find the value there once it is released.
//! Failures leave the slot empty so the next caller retries.

use std::hash::Hash;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, trace};
use parking_lot::Mutex;
use serde::Deserialize;

use super::{CancelToken, GitSource, HgSource, SourceBackend, SourceError, SourceManager};
use crate::project::{ProjectIdentifier, ProjectInfo, ProjectRoot};
use crate::version::{sort_preference, PairedVersion, Revision, VersionOrder};

type Slot<T> = Arc<Mutex<Option<T>>>;

/// Settings of a [SourceMgr].
///
/// Can be read from TOML:
///
/// ```toml
/// cache_dir = "/var/cache/revsolve"
/// max_versions = 200
/// command_timeout_secs = 60
/// prefetch = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceMgrConfig {
    /// Where local clones are kept.
    pub cache_dir: PathBuf,
    /// Keep only the most preferred versions of each listing.
    pub max_versions: Option<usize>,
    /// Limit on every version control command, in seconds.
    pub command_timeout_secs: u64,
    /// List versions of new dependencies in the background.
    pub prefetch: bool,
}

impl Default for SourceMgrConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("revsolve"),
            max_versions: None,
            command_timeout_secs: 120,
            prefetch: true,
        }
    }
}

impl SourceMgrConfig {
    /// Parse a configuration, missing keys taking their default value.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Set the cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the maximum number of versions kept per listing.
    pub fn with_max_versions(mut self, max: usize) -> Self {
        self.max_versions = Some(max);
        self
    }

    /// Set the command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Enable or disable background listing.
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// The command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls that reached a backend.
    pub fetches: u64,
    /// Calls served from the cache.
    pub hits: u64,
}

struct Inner {
    config: SourceMgrConfig,
    backends: Vec<Arc<dyn SourceBackend>>,
    exists: DashMap<ProjectIdentifier, Slot<bool>>,
    versions: DashMap<ProjectIdentifier, Slot<Arc<[PairedVersion]>>>,
    infos: DashMap<(ProjectIdentifier, Revision), Slot<Arc<ProjectInfo>>>,
    roots: DashMap<String, ProjectRoot>,
    fetches: AtomicU64,
    hits: AtomicU64,
}

/// Source manager backed by version control systems.
///
/// Cheap to clone, clones share the cache.
#[derive(Clone)]
pub struct SourceMgr {
    inner: Arc<Inner>,
}

impl SourceMgr {
    /// A manager with the git and Mercurial backends.
    pub fn new(config: SourceMgrConfig) -> Self {
        let backends: Vec<Arc<dyn SourceBackend>> = vec![
            Arc::new(HgSource::new(&config)),
            Arc::new(GitSource::new(&config)),
        ];
        Self::with_backends(config, backends)
    }

    /// A manager with the given backends, tried in order.
    pub fn with_backends(config: SourceMgrConfig, backends: Vec<Arc<dyn SourceBackend>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                backends,
                exists: DashMap::new(),
                versions: DashMap::new(),
                infos: DashMap::new(),
                roots: DashMap::new(),
                fetches: AtomicU64::new(0),
                hits: AtomicU64::new(0),
            }),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SourceMgrConfig {
        &self.inner.config
    }

    /// Counters since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            fetches: self.inner.fetches.load(Ordering::Relaxed),
            hits: self.inner.hits.load(Ordering::Relaxed),
        }
    }

    /// Forget everything cached about a project.
    pub fn invalidate(&self, root: &ProjectRoot) {
        debug!("invalidating {}", root);
        self.inner.exists.retain(|id, _| &id.root != root);
        self.inner.versions.retain(|id, _| &id.root != root);
        self.inner.infos.retain(|(id, _), _| &id.root != root);
    }

    /// Forget everything.
    pub fn invalidate_all(&self) {
        self.inner.exists.clear();
        self.inner.versions.clear();
        self.inner.infos.clear();
        self.inner.roots.clear();
    }

    fn backend(&self, id: &ProjectIdentifier) -> Result<&Arc<dyn SourceBackend>, SourceError> {
        self.inner
            .backends
            .iter()
            .find(|b| b.handles(id))
            .ok_or_else(|| SourceError::NoBackend(id.clone()))
    }

    /// Get the value of a slot, fetching it if nobody did yet.
    fn coalesce<K, T, F>(
        &self,
        map: &DashMap<K, Slot<T>>,
        key: &K,
        cancel: &CancelToken,
        fetch: F,
    ) -> Result<T, SourceError>
    where
        K: Eq + Hash + Clone,
        T: Clone,
        F: FnOnce() -> Result<T, SourceError>,
    {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        // Clone the slot out so the map shard is not held while fetching.
        let slot = map.entry(key.clone()).or_default().clone();
        let mut value = slot.lock();
        if let Some(v) = value.as_ref() {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(v.clone());
        }
        self.inner.fetches.fetch_add(1, Ordering::Relaxed);
        let fetched = fetch()?;
        *value = Some(fetched.clone());
        Ok(fetched)
    }
}

impl SourceManager for SourceMgr {
    fn source_exists(&self, id: &ProjectIdentifier, cancel: &CancelToken) -> Result<bool, SourceError> {
        self.coalesce(&self.inner.exists, id, cancel, || {
            self.backend(id)?.exists(id, cancel)
        })
    }

    fn list_versions(
        &self,
        id: &ProjectIdentifier,
        cancel: &CancelToken,
    ) -> Result<Arc<[PairedVersion]>, SourceError> {
        self.coalesce(&self.inner.versions, id, cancel, || {
            let backend = self.backend(id)?;
            let mut versions = backend.list_versions(id, cancel)?;
            debug!("{} listed {} versions of {}", backend.name(), versions.len(), id);
            if let Some(max) = self.inner.config.max_versions {
                if versions.len() > max {
                    sort_preference(&mut versions, None, &VersionOrder::default());
                    versions.truncate(max);
                }
            }
            Ok(Arc::from(versions))
        })
    }

    fn get_manifest_and_lock(
        &self,
        id: &ProjectIdentifier,
        revision: &Revision,
        cancel: &CancelToken,
    ) -> Result<Arc<ProjectInfo>, SourceError> {
        let key = (id.clone(), revision.clone());
        self.coalesce(&self.inner.infos, &key, cancel, || {
            trace!("fetching info of {} at {}", id, revision);
            let info = self.backend(id)?.project_info(id, revision, cancel)?;
            Ok(Arc::new(info))
        })
    }

    fn deduce_root(&self, import_path: &str) -> Result<ProjectRoot, SourceError> {
        if let Some(root) = self.inner.roots.get(import_path) {
            return Ok(root.value().clone());
        }
        let root = self
            .inner
            .backends
            .iter()
            .find_map(|b| b.deduce_root(import_path))
            .ok_or_else(|| SourceError::Undeducible(import_path.to_string()))?;
        self.inner.roots.insert(import_path.to_string(), root.clone());
        Ok(root)
    }

    fn prefetch(&self, ids: &[ProjectIdentifier], cancel: &CancelToken) {
        if !self.inner.config.prefetch {
            return;
        }
        for id in ids {
            let sm = self.clone();
            let id = id.clone();
            let cancel = cancel.clone();
            rayon::spawn(move || {
                if let Err(e) = sm.list_versions(&id, &cancel) {
                    debug!("prefetch of {} failed: {}", id, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::source::MemorySource;
    use crate::version::Version;

    fn manager(src: MemorySource) -> (SourceMgr, Arc<MemorySource>) {
        let src = Arc::new(src);
        let sm = SourceMgr::with_backends(
            SourceMgrConfig::default().with_prefetch(false),
            vec![src.clone() as Arc<dyn SourceBackend>],
        );
        (sm, src)
    }

    #[test]
    fn concurrent_listings_fetch_once() {
        let src = MemorySource::new().with_latency(Duration::from_millis(50));
        src.add_version("a", Version::from_tag("1.0.0"), []);
        let (sm, src) = manager(src);
        let id = ProjectIdentifier::new("a");
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| sm.list_versions(&id, &CancelToken::new()).unwrap());
            }
        });
        assert_eq!(src.list_calls(), 1);
        assert_eq!(sm.stats(), CacheStats { fetches: 1, hits: 7 });
    }

    #[test]
    fn failures_are_not_cached() {
        let (sm, src) = manager(MemorySource::new());
        let id = ProjectIdentifier::new("a");
        let rev = Revision::new("nope");
        let cancel = CancelToken::new();
        assert!(sm.get_manifest_and_lock(&id, &rev, &cancel).is_err());
        assert!(sm.get_manifest_and_lock(&id, &rev, &cancel).is_err());
        assert_eq!(src.info_calls(), 2);
    }

    #[test]
    fn invalidate_refetches() {
        let (sm, src) = manager(MemorySource::new());
        src.add_version("a", Version::from_tag("1.0.0"), []);
        let id = ProjectIdentifier::new("a");
        let cancel = CancelToken::new();
        assert_eq!(sm.list_versions(&id, &cancel).unwrap().len(), 1);
        src.add_version("a", Version::from_tag("1.1.0"), []);
        assert_eq!(sm.list_versions(&id, &cancel).unwrap().len(), 1);
        sm.invalidate(&id.root);
        assert_eq!(sm.list_versions(&id, &cancel).unwrap().len(), 2);
        assert_eq!(src.list_calls(), 2);
    }

    #[test]
    fn max_versions_keeps_preferred() {
        let (sm, src) = manager(MemorySource::new());
        for v in ["1.0.0", "1.1.0", "2.0.0"] {
            src.add_version("a", Version::from_tag(v), []);
        }
        let sm = SourceMgr::with_backends(
            sm.config().clone().with_max_versions(2),
            vec![src as Arc<dyn SourceBackend>],
        );
        let versions = sm
            .list_versions(&ProjectIdentifier::new("a"), &CancelToken::new())
            .unwrap();
        let names: Vec<_> = versions.iter().map(|v| v.version().to_string()).collect();
        assert_eq!(names, ["2.0.0", "1.1.0"]);
    }

    #[test]
    fn cancellation_is_per_call() {
        let (sm, src) = manager(MemorySource::new());
        src.add_version("a", Version::from_tag("1.0.0"), []);
        let id = ProjectIdentifier::new("a");
        let cancelled = CancelToken::new();
        cancelled.cancel();
        assert!(matches!(
            sm.list_versions(&id, &cancelled),
            Err(SourceError::Cancelled)
        ));
        assert_eq!(sm.list_versions(&id, &CancelToken::new()).unwrap().len(), 1);
    }

    #[test]
    fn cancelled_fetch_is_retried_by_waiter() {
        let src = MemorySource::new().with_latency(Duration::from_millis(200));
        src.add_version("a", Version::from_tag("1.0.0"), []);
        let (sm, src) = manager(src);
        let id = ProjectIdentifier::new("a");
        let first = CancelToken::new();
        thread::scope(|s| {
            let cancelled = s.spawn(|| sm.list_versions(&id, &first));
            thread::sleep(Duration::from_millis(50));
            let waiter = s.spawn(|| sm.list_versions(&id, &CancelToken::new()));
            first.cancel();
            assert!(matches!(cancelled.join().unwrap(), Err(SourceError::Cancelled)));
            assert_eq!(waiter.join().unwrap().unwrap().len(), 1);
        });
        assert_eq!(src.list_calls(), 2);
    }

    #[test]
    fn config_from_toml() {
        let config = SourceMgrConfig::from_toml_str("max_versions = 10\nprefetch = false\n").unwrap();
        assert_eq!(config.max_versions, Some(10));
        assert!(!config.prefetch);
        assert_eq!(config.command_timeout(), Duration::from_secs(120));
        assert!(SourceMgrConfig::from_toml_str("colour = 1").is_err());
    }
}
