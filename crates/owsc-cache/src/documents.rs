use std::fs;
use std::io;
use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use owsc_xml::XmlDocument;

use crate::error::CacheError;
use crate::version::ProjectVersion;
use crate::watcher::ChangeWatcher;

/// Path-keyed cache of parsed XML documents.
///
/// Documents are parsed once and shared; every service configuration built
/// for a path reads the same tree.
#[derive(Debug)]
pub struct DocumentStore {
    documents: DashMap<Utf8PathBuf, Arc<XmlDocument>>,
    application_version: Option<ProjectVersion>,
}

impl DocumentStore {
    /// Create an empty store.
    ///
    /// Project documents declaring a version other than `application_version`
    /// are loaded with a warning; `None` disables the check.
    #[must_use]
    pub fn new(application_version: Option<ProjectVersion>) -> Self {
        Self {
            documents: DashMap::new(),
            application_version,
        }
    }

    /// Return the cached document for `key`, loading it on a miss.
    ///
    /// The path is registered with `watcher` before its contents are read, so a
    /// write racing the load still produces a change event. A failed load
    /// unregisters it again.
    pub(crate) fn get_or_load(
        &self,
        key: &Utf8Path,
        watcher: &ChangeWatcher,
    ) -> Result<Arc<XmlDocument>, CacheError> {
        self.get_or_load_with(key, watcher, |path| fs::read(path.as_std_path()))
    }

    fn get_or_load_with<R>(
        &self,
        key: &Utf8Path,
        watcher: &ChangeWatcher,
        read: R,
    ) -> Result<Arc<XmlDocument>, CacheError>
    where
        R: FnOnce(&Utf8Path) -> io::Result<Vec<u8>>,
    {
        if let Some(document) = self.get(key) {
            return Ok(document);
        }

        match self.documents.entry(key.to_path_buf()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                tracing::info!(path = %key, "Open the configuration file");
                if !key.as_std_path().exists() {
                    tracing::error!(path = %key, "Error, configuration file does not exist");
                    return Err(CacheError::FileNotFound {
                        path: key.to_path_buf(),
                    });
                }

                watcher.watch(key);
                match self.load(key, read) {
                    Ok(document) => {
                        let document = Arc::new(document);
                        entry.insert(Arc::clone(&document));
                        Ok(document)
                    }
                    Err(err) => {
                        watcher.unwatch(key);
                        Err(err)
                    }
                }
            }
        }
    }

    fn load<R>(&self, path: &Utf8Path, read: R) -> Result<XmlDocument, CacheError>
    where
        R: FnOnce(&Utf8Path) -> io::Result<Vec<u8>>,
    {
        let source = read(path).map_err(|source| {
            tracing::error!(path = %path, "Error, cannot open configuration file: {source}");
            if source.kind() == io::ErrorKind::NotFound {
                CacheError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CacheError::FileUnreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let document = owsc_xml::parse(&source).map_err(|source| {
            tracing::error!(
                path = %path,
                line = source.line,
                column = source.column,
                "Error parsing file: {}",
                source.message
            );
            CacheError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;

        self.check_version(path, &document);
        tracing::info!(
            path = %path,
            root = document.root().name(),
            bytes = document.source_len(),
            "Loaded configuration document"
        );
        Ok(document)
    }

    fn check_version(&self, path: &Utf8Path, document: &XmlDocument) {
        let Some(application) = &self.application_version else {
            return;
        };
        match ProjectVersion::declared_by(document) {
            Some(Ok(declared)) if &declared != application => {
                tracing::warn!(
                    path = %path,
                    project_version = %declared,
                    application_version = %application,
                    "This project file was saved by a different version"
                );
            }
            Some(Err(declared)) => {
                tracing::warn!(
                    path = %path,
                    project_version = %declared,
                    application_version = %application,
                    "This project file declares an unrecognized version"
                );
            }
            Some(Ok(_)) | None => {}
        }
    }

    #[must_use]
    pub fn get(&self, key: &Utf8Path) -> Option<Arc<XmlDocument>> {
        self.documents.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove(&self, key: &Utf8Path) -> bool {
        self.documents.remove(key).is_some()
    }

    #[must_use]
    pub fn contains(&self, key: &Utf8Path) -> bool {
        self.documents.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[must_use]
    pub fn application_version(&self) -> Option<&ProjectVersion> {
        self.application_version.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn temp_file(contents: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("project.qgs")).unwrap();
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn hit_returns_same_document() {
        let (_dir, path) = temp_file(r#"<qgis version="3.4.0"/>"#);
        let store = DocumentStore::new(Some(ProjectVersion::new(3, 4, 0)));
        let watcher = ChangeWatcher::detached();

        let first = store.get_or_load(&path, &watcher).unwrap();
        let second = store.get_or_load(&path, &watcher).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(watcher.is_watched(&path));
    }

    #[test]
    fn missing_file_is_not_watched() {
        let store = DocumentStore::new(None);
        let watcher = ChangeWatcher::detached();
        let path = Utf8Path::new("/nonexistent/path.xml");

        let err = store.get_or_load(path, &watcher).unwrap_err();

        assert!(matches!(err, CacheError::FileNotFound { .. }));
        assert!(!store.contains(path));
        assert!(watcher.is_empty());
    }

    #[test]
    fn directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = DocumentStore::new(None);
        let watcher = ChangeWatcher::detached();

        let err = store.get_or_load(&path, &watcher).unwrap_err();

        assert!(matches!(err, CacheError::FileUnreadable { .. }));
        assert!(watcher.is_empty());
    }

    #[test]
    fn malformed_xml_carries_location() {
        let (_dir, path) = temp_file("<unterminated");
        let store = DocumentStore::new(None);
        let watcher = ChangeWatcher::detached();

        let err = store.get_or_load(&path, &watcher).unwrap_err();
        let parse = err.parse_error().expect("parse error");

        assert!(!parse.message.is_empty());
        assert!(parse.line >= 1 && parse.column >= 1);
        assert!(store.is_empty());
        assert!(watcher.is_empty());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Load `contents` with warnings captured, returning the store and the log.
    fn load_logged(contents: &str) -> (DocumentStore, Utf8PathBuf, String) {
        let (_dir, path) = temp_file(contents);
        let store = DocumentStore::new(Some(ProjectVersion::new(3, 4, 0)));
        let watcher = ChangeWatcher::detached();
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            store.get_or_load(&path, &watcher).unwrap();
        });

        (store, path, logs.contents())
    }

    #[test]
    fn version_mismatch_warns_and_loads() {
        let (store, path, logs) = load_logged(r#"<qgis version="2.18.0-Las Palmas"/>"#);

        assert!(store.contains(&path));
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("saved by a different version"), "{logs}");
        assert!(logs.contains("2.18.0-Las Palmas"), "{logs}");
    }

    #[test]
    fn unrecognized_version_warns_and_loads() {
        let (store, path, logs) = load_logged(r#"<qgis version="banana"/>"#);

        assert!(store.contains(&path));
        assert!(logs.contains("declares an unrecognized version"), "{logs}");
        assert!(logs.contains("banana"), "{logs}");
    }

    #[test]
    fn matching_version_is_quiet() {
        let (_store, _path, logs) = load_logged(r#"<qgis version="3.4.0-Madeira"/>"#);
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn watch_is_registered_before_read() {
        let (_dir, path) = temp_file("<qgis/>");
        let store = DocumentStore::new(None);
        let watcher = ChangeWatcher::detached();
        let mut watched_at_read = false;

        store
            .get_or_load_with(&path, &watcher, |path| {
                watched_at_read = watcher.is_watched(path);
                fs::read(path.as_std_path())
            })
            .unwrap();

        assert!(watched_at_read);
        assert!(watcher.is_watched(&path));
    }

    #[test]
    fn write_during_load_is_not_lost() {
        let (_dir, path) = temp_file("<qgis><title>v1</title></qgis>");
        let store = DocumentStore::new(None);
        let watcher = ChangeWatcher::detached();

        // The file changes right after its bytes were read; the path must
        // already be watched so the change reaches the cache.
        let document = store
            .get_or_load_with(&path, &watcher, |path| {
                let source = fs::read(path.as_std_path());
                fs::write(path.as_std_path(), "<qgis><title>v2</title></qgis>")?;
                assert!(watcher.is_watched(path));
                source
            })
            .unwrap();
        assert_eq!(document.root().child_text("title").as_deref(), Some("v1"));

        assert!(store.remove(&path));
        assert!(watcher.unwatch(&path));
        let reloaded = store.get_or_load(&path, &watcher).unwrap();
        assert_eq!(reloaded.root().child_text("title").as_deref(), Some("v2"));
    }

    #[test]
    fn failed_read_unregisters_watch() {
        let (_dir, path) = temp_file("<qgis/>");
        let store = DocumentStore::new(None);
        let watcher = ChangeWatcher::detached();

        let err = store
            .get_or_load_with(&path, &watcher, |_| {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            })
            .unwrap_err();

        assert!(matches!(err, CacheError::FileUnreadable { .. }));
        assert!(watcher.is_empty());
        assert!(store.is_empty());
    }
}
