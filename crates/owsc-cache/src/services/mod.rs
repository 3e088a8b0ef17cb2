//! Per-family service configurations and their caches.

pub(crate) mod project;
mod sld;
mod wcs;
mod wfs;
mod wms;

use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use owsc_xml::XmlDocument;
use serde::Serialize;

pub use project::LayerKind;
pub use project::ProjectLayer;
pub use project::ProjectSummary;
pub use sld::SldConfig;
pub use sld::SldLayer;
pub use wcs::WcsConfig;
pub use wfs::WfsConfig;
pub use wms::WmsConfig;
pub use wms::WmsProjectConfig;

use crate::context::RequestContext;
use crate::error::CacheError;
use crate::error::ConfigBuildError;

/// The OGC service a configuration is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceFamily {
    Wcs,
    Wfs,
    Wms,
}

impl ServiceFamily {
    pub const ALL: [ServiceFamily; 3] = [ServiceFamily::Wcs, ServiceFamily::Wfs, ServiceFamily::Wms];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceFamily::Wcs => "WCS",
            ServiceFamily::Wfs => "WFS",
            ServiceFamily::Wms => "WMS",
        }
    }
}

impl fmt::Display for ServiceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service configuration built from one cached document.
///
/// Built once per path and shared read-only afterwards.
pub trait ServiceConfig: Send + Sync + Sized + 'static {
    const FAMILY: ServiceFamily;

    fn build(
        path: &Utf8Path,
        document: &Arc<XmlDocument>,
        context: &RequestContext,
    ) -> Result<Self, ConfigBuildError>;

    /// Number of layers the configuration publishes.
    fn layer_count(&self) -> usize;
}

/// Path-keyed cache of one family's configurations.
pub struct ServiceCache<C> {
    entries: DashMap<Utf8PathBuf, Arc<C>>,
}

impl<C: ServiceConfig> ServiceCache<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the cached configuration for `key`, building it on a miss.
    ///
    /// The build runs while the vacant entry is held, so concurrent misses for
    /// the same key build once. Failures leave the cache untouched.
    pub(crate) fn get_or_build<L>(
        &self,
        key: &Utf8Path,
        context: &RequestContext,
        load_document: L,
    ) -> Result<Arc<C>, CacheError>
    where
        L: FnOnce() -> Result<Arc<XmlDocument>, CacheError>,
    {
        if let Some(config) = self.get(key) {
            return Ok(config);
        }

        match self.entries.entry(key.to_path_buf()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let document = load_document()?;
                let config = C::build(key, &document, context).map_err(|source| {
                    tracing::error!(
                        path = %key,
                        family = %C::FAMILY,
                        "Cannot build service configuration: {source}"
                    );
                    CacheError::ConfigBuild {
                        path: key.to_path_buf(),
                        family: C::FAMILY,
                        source,
                    }
                })?;
                let config = Arc::new(config);
                entry.insert(Arc::clone(&config));
                tracing::debug!(
                    path = %key,
                    family = %C::FAMILY,
                    layers = config.layer_count(),
                    "Cached service configuration"
                );
                Ok(config)
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &Utf8Path) -> Option<Arc<C>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove(&self, key: &Utf8Path) -> bool {
        self.entries.remove(key).is_some()
    }

    #[must_use]
    pub fn contains(&self, key: &Utf8Path) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: ServiceConfig> Default for ServiceCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for ServiceCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    const PROJECT: &[u8] = br#"<qgis version="3.4.0">
  <projectlayers>
    <maplayer type="vector"><id>roads</id><layername>Roads</layername></maplayer>
  </projectlayers>
  <properties><WFSLayers type="QStringList"><value>roads</value></WFSLayers></properties>
</qgis>"#;

    fn document(source: &[u8]) -> Arc<XmlDocument> {
        Arc::new(owsc_xml::parse(source).unwrap())
    }

    #[test]
    fn hit_skips_document_load() {
        let cache: ServiceCache<WfsConfig> = ServiceCache::new();
        let key = Utf8Path::new("/srv/a.qgs");
        let loads = AtomicUsize::new(0);
        let load = || -> Result<Arc<XmlDocument>, CacheError> {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(document(PROJECT))
        };

        let first = cache.get_or_build(key, &RequestContext::default(), load).unwrap();
        let second = cache.get_or_build(key, &RequestContext::default(), load).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.layer_count(), 1);
    }

    #[test]
    fn load_failure_caches_nothing() {
        let cache: ServiceCache<WfsConfig> = ServiceCache::new();
        let key = Utf8Path::new("/srv/missing.qgs");

        let result = cache.get_or_build(key, &RequestContext::default(), || {
            Err(CacheError::FileNotFound {
                path: key.to_path_buf(),
            })
        });

        assert!(matches!(result, Err(CacheError::FileNotFound { .. })));
        assert!(!cache.contains(key));
    }

    #[test]
    fn build_failure_is_reported_with_family() {
        let cache: ServiceCache<WfsConfig> = ServiceCache::new();
        let key = Utf8Path::new("/srv/style.sld");

        let result = cache.get_or_build(key, &RequestContext::default(), || {
            Ok(document(b"<StyledLayerDescriptor/>"))
        });

        match result {
            Err(CacheError::ConfigBuild { family, .. }) => assert_eq!(family, ServiceFamily::Wfs),
            other => panic!("expected a build error, got {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let cache: ServiceCache<WmsConfig> = ServiceCache::new();
        let key = Utf8Path::new("/srv/a.qgs");
        cache
            .get_or_build(key, &RequestContext::default(), || Ok(document(PROJECT)))
            .unwrap();

        assert!(cache.remove(key));
        assert!(!cache.remove(key));
    }

    #[test]
    fn family_names() {
        assert_eq!(ServiceFamily::Wms.to_string(), "WMS");
        assert_eq!(ServiceFamily::ALL.len(), 3);
    }
}
