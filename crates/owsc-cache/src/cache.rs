use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use owsc_xml::XmlDocument;
use serde::Serialize;

use crate::context::RequestContext;
use crate::documents::DocumentStore;
use crate::error::CacheError;
use crate::layers::LayerLimitNotifier;
use crate::paths::normalize_path;
use crate::services::project::project_layers;
use crate::services::project::project_title;
use crate::services::ProjectSummary;
use crate::services::ServiceCache;
use crate::services::ServiceConfig;
use crate::services::ServiceFamily;
use crate::services::WcsConfig;
use crate::services::WfsConfig;
use crate::services::WmsConfig;
use crate::version::ProjectVersion;
use crate::watcher::spawn_dispatcher;
use crate::watcher::ChangeWatcher;

/// Server release project files are checked against by default.
const SERVER_VERSION: &str = "3.4.0";

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Version project documents are expected to declare.
    pub application_version: String,
    /// Attach an OS file watcher in [`ConfigCache::start`].
    pub watch: bool,
    /// Quiet period before a burst of change events is acted on.
    pub debounce: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            application_version: SERVER_VERSION.to_string(),
            watch: true,
            debounce: Duration::from_millis(250),
        }
    }
}

/// Entry counts per cache layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub documents: usize,
    pub wcs: usize,
    pub wfs: usize,
    pub wms: usize,
    pub watched: usize,
}

/// The server's configuration cache.
///
/// Construct one at startup and share it (`Arc<ConfigCache>`) with every
/// request handler. Lookups take a path and return the cached document or
/// service configuration, loading it from disk on the first request.
///
/// ## Thread Safety
///
/// Every lookup holds the gate shared for its whole lookup-build-store
/// sequence; eviction holds it exclusively. A change notification therefore
/// never interleaves with a lookup for any path, and the service entries of a
/// path always disappear together with its document. Concurrent misses for
/// the same key build once.
///
/// Locks are always taken in the order gate, service map, document map, watch
/// set.
pub struct ConfigCache {
    gate: RwLock<()>,
    documents: DocumentStore,
    wcs: ServiceCache<WcsConfig>,
    wfs: ServiceCache<WfsConfig>,
    wms: ServiceCache<WmsConfig>,
    watcher: ChangeWatcher,
    layers: Arc<dyn LayerLimitNotifier>,
}

impl ConfigCache {
    /// A cache without an OS file watcher.
    ///
    /// Invalidation happens only through [`ConfigCache::on_path_changed`] and
    /// [`ConfigCache::remove_entry`].
    #[must_use]
    pub fn new(options: &CacheOptions, layers: Arc<dyn LayerLimitNotifier>) -> Self {
        Self::with_watcher(options, ChangeWatcher::detached(), layers)
    }

    fn with_watcher(
        options: &CacheOptions,
        watcher: ChangeWatcher,
        layers: Arc<dyn LayerLimitNotifier>,
    ) -> Self {
        let application_version = options.application_version.parse::<ProjectVersion>().ok();
        if application_version.is_none() {
            tracing::warn!(
                version = %options.application_version,
                "Unrecognized application version, project version checks disabled"
            );
        }

        Self {
            gate: RwLock::new(()),
            documents: DocumentStore::new(application_version),
            wcs: ServiceCache::new(),
            wfs: ServiceCache::new(),
            wms: ServiceCache::new(),
            watcher,
            layers,
        }
    }

    /// Build the shared cache and, if `options.watch` is set, start watching
    /// cached files for changes.
    ///
    /// The watch thread holds only a weak reference and exits once the last
    /// `Arc` to the cache is dropped.
    pub fn start(options: CacheOptions, layers: Arc<dyn LayerLimitNotifier>) -> Result<Arc<Self>> {
        if !options.watch {
            return Ok(Arc::new(Self::new(&options, layers)));
        }

        let (tx, rx) = mpsc::channel();
        let watcher = ChangeWatcher::with_notify(tx).context("Failed to create file watcher")?;
        let cache = Arc::new(Self::with_watcher(&options, watcher, layers));

        let weak = Arc::downgrade(&cache);
        spawn_dispatcher(rx, options.debounce, move |path| {
            let Some(cache) = weak.upgrade() else {
                return false;
            };
            cache.on_path_changed(path);
            true
        })
        .context("Failed to spawn file watcher thread")?;

        Ok(cache)
    }

    fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The parsed XML document at `path`.
    pub fn document(&self, path: impl AsRef<Utf8Path>) -> Result<Arc<XmlDocument>, CacheError> {
        let key = normalize_path(path.as_ref());
        let _gate = self.read_gate();
        self.documents.get_or_load(&key, &self.watcher)
    }

    pub fn wcs_configuration(
        &self,
        path: impl AsRef<Utf8Path>,
        context: &RequestContext,
    ) -> Result<Arc<WcsConfig>, CacheError> {
        self.configuration(&self.wcs, path.as_ref(), context)
    }

    pub fn wfs_configuration(
        &self,
        path: impl AsRef<Utf8Path>,
        context: &RequestContext,
    ) -> Result<Arc<WfsConfig>, CacheError> {
        self.configuration(&self.wfs, path.as_ref(), context)
    }

    /// The map service configuration at `path`.
    ///
    /// Styled layer descriptor documents yield [`WmsConfig::Sld`] built with
    /// the context's request parameters; anything else is read as a project.
    pub fn wms_configuration(
        &self,
        path: impl AsRef<Utf8Path>,
        context: &RequestContext,
    ) -> Result<Arc<WmsConfig>, CacheError> {
        self.configuration(&self.wms, path.as_ref(), context)
    }

    fn configuration<C: ServiceConfig>(
        &self,
        cache: &ServiceCache<C>,
        path: &Utf8Path,
        context: &RequestContext,
    ) -> Result<Arc<C>, CacheError> {
        let key = normalize_path(path);
        let config = {
            let _gate = self.read_gate();
            cache.get_or_build(&key, context, || {
                self.documents.get_or_load(&key, &self.watcher)
            })?
        };
        self.layers.notify_layer_count(config.layer_count());
        Ok(config)
    }

    /// Summarize the project at `path`.
    ///
    /// The document comes from the cache, but the summary is rebuilt on every
    /// call.
    pub fn server_configuration(
        &self,
        path: impl AsRef<Utf8Path>,
    ) -> Result<ProjectSummary, CacheError> {
        let path = path.as_ref();
        let document = self.document(path)?;
        let root = document.root();
        let version = ProjectVersion::declared_by(&document).and_then(Result::ok);

        tracing::info!(
            path = %path,
            application_version = %self
                .documents
                .application_version()
                .map_or_else(|| "unknown".to_string(), ToString::to_string),
            project_version = %version
                .as_ref()
                .map_or_else(|| "unknown".to_string(), ToString::to_string),
            "Opened project"
        );

        Ok(ProjectSummary {
            path: normalize_path(path),
            version,
            title: project_title(root),
            layers: project_layers(root),
        })
    }

    /// Evict every cache entry for `path` and stop watching it.
    ///
    /// Service configurations go before the document they were built from.
    /// Unknown paths are ignored.
    pub fn on_path_changed(&self, path: impl AsRef<Utf8Path>) {
        let path = path.as_ref();
        let key = if self.watcher.is_watched(path) {
            path.to_path_buf()
        } else {
            normalize_path(path)
        };

        let _gate = self.write_gate();
        let wms = self.wms.remove(&key);
        let wfs = self.wfs.remove(&key);
        let wcs = self.wcs.remove(&key);
        let document = self.documents.remove(&key);
        let watched = self.watcher.unwatch(&key);

        if wms || wfs || wcs || document || watched {
            tracing::info!(path = %key, wms, wfs, wcs, document, "Evicted configuration cache entries");
        }
    }

    /// Invalidate `path` without a file system event.
    pub fn remove_entry(&self, path: impl AsRef<Utf8Path>) {
        self.on_path_changed(path);
    }

    /// Evict a single family's configuration for `path`, leaving the document
    /// and the other families cached. Returns whether an entry was removed.
    pub fn remove_service_entry(&self, family: ServiceFamily, path: impl AsRef<Utf8Path>) -> bool {
        let key = normalize_path(path.as_ref());
        let _gate = self.write_gate();
        match family {
            ServiceFamily::Wcs => self.wcs.remove(&key),
            ServiceFamily::Wfs => self.wfs.remove(&key),
            ServiceFamily::Wms => self.wms.remove(&key),
        }
    }

    /// Whether a document for `path` is cached.
    #[must_use]
    pub fn is_cached(&self, path: impl AsRef<Utf8Path>) -> bool {
        let key = normalize_path(path.as_ref());
        self.documents.contains(&key)
    }

    /// Whether `family` has a configuration cached for `path`.
    #[must_use]
    pub fn is_service_cached(&self, family: ServiceFamily, path: impl AsRef<Utf8Path>) -> bool {
        let key = normalize_path(path.as_ref());
        match family {
            ServiceFamily::Wcs => self.wcs.contains(&key),
            ServiceFamily::Wfs => self.wfs.contains(&key),
            ServiceFamily::Wms => self.wms.contains(&key),
        }
    }

    #[must_use]
    pub fn is_watched(&self, path: impl AsRef<Utf8Path>) -> bool {
        let key = normalize_path(path.as_ref());
        self.watcher.is_watched(&key)
    }

    #[must_use]
    pub fn watched_paths(&self) -> Vec<Utf8PathBuf> {
        self.watcher.watched_paths()
    }

    #[must_use]
    pub fn watcher(&self) -> &ChangeWatcher {
        &self.watcher
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let _gate = self.read_gate();
        CacheStats {
            documents: self.documents.len(),
            wcs: self.wcs.len(),
            wfs: self.wfs.len(),
            wms: self.wms.len(),
            watched: self.watcher.len(),
        }
    }
}

impl fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigCache")
            .field("documents", &self.documents)
            .field("wcs", &self.wcs)
            .field("wfs", &self.wfs)
            .field("wms", &self.wms)
            .field("watcher", &self.watcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::layers::LayerBudget;

    const PROJECT: &str = r#"<qgis version="3.4.0">
  <projectlayers>
    <maplayer type="vector"><id>roads</id><layername>Roads</layername></maplayer>
    <maplayer type="raster"><id>dem</id><layername>DEM</layername></maplayer>
  </projectlayers>
  <properties>
    <WFSLayers type="QStringList"><value>roads</value></WFSLayers>
    <WCSLayers type="QStringList"><value>dem</value></WCSLayers>
  </properties>
</qgis>"#;

    fn setup() -> (tempfile::TempDir, Utf8PathBuf, ConfigCache, Arc<LayerBudget>) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("project.qgs")).unwrap();
        fs::write(&path, PROJECT).unwrap();
        let budget = Arc::new(LayerBudget::new());
        let options = CacheOptions {
            application_version: "3.4.0".to_string(),
            ..CacheOptions::default()
        };
        let cache = ConfigCache::new(&options, budget.clone());
        (dir, normalize_path(&path), cache, budget)
    }

    #[test]
    fn service_lookup_caches_document_and_watches() {
        let (_dir, path, cache, budget) = setup();

        let wfs = cache.wfs_configuration(&path, &RequestContext::default()).unwrap();

        assert_eq!(wfs.layers().len(), 1);
        assert_eq!(budget.project_max_layers(), Some(1));
        assert!(cache.is_cached(&path));
        assert!(cache.is_watched(&path));
        assert_eq!(
            cache.stats(),
            CacheStats {
                documents: 1,
                wfs: 1,
                watched: 1,
                ..CacheStats::default()
            }
        );
    }

    #[test]
    fn families_share_one_document() {
        let (_dir, path, cache, _budget) = setup();

        cache.wfs_configuration(&path, &RequestContext::default()).unwrap();
        cache.wcs_configuration(&path, &RequestContext::default()).unwrap();
        cache.wms_configuration(&path, &RequestContext::default()).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.documents, 1);
        assert_eq!((stats.wcs, stats.wfs, stats.wms), (1, 1, 1));
    }

    #[test]
    fn change_evicts_every_layer() {
        let (_dir, path, cache, _budget) = setup();
        cache.wfs_configuration(&path, &RequestContext::default()).unwrap();
        cache.wms_configuration(&path, &RequestContext::default()).unwrap();

        cache.on_path_changed(&path);

        assert_eq!(cache.stats(), CacheStats::default());
        assert!(cache.watched_paths().is_empty());
    }

    #[test]
    fn single_family_eviction_keeps_the_rest() {
        let (_dir, path, cache, _budget) = setup();
        let wfs = cache.wfs_configuration(&path, &RequestContext::default()).unwrap();
        cache.wms_configuration(&path, &RequestContext::default()).unwrap();

        assert!(cache.remove_service_entry(ServiceFamily::Wms, &path));

        assert!(!cache.is_service_cached(ServiceFamily::Wms, &path));
        let again = cache.wfs_configuration(&path, &RequestContext::default()).unwrap();
        assert!(Arc::ptr_eq(&wfs, &again));
        assert!(cache.is_cached(&path));
    }

    #[test]
    fn server_configuration_is_rebuilt_each_call() {
        let (_dir, path, cache, _budget) = setup();

        let summary = cache.server_configuration(&path).unwrap();

        assert_eq!(summary.version, Some(ProjectVersion::new(3, 4, 0)));
        assert_eq!(summary.layers.len(), 2);
        assert_eq!(summary.path, path);
        assert_eq!(cache.stats().documents, 1);
    }

    #[test]
    fn unknown_path_change_is_ignored() {
        let (_dir, _path, cache, _budget) = setup();
        cache.on_path_changed("/nowhere/else.qgs");
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
