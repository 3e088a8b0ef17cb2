//! Cache key normalization.

use camino::Utf8Component;
use camino::Utf8Path;
use camino::Utf8PathBuf;

/// Normalize a configuration path into a cache key.
///
/// Existing files are canonicalized so that symlinks and relative spellings of
/// the same file share one entry. Paths that cannot be canonicalized (missing
/// files, non-UTF-8 targets) are made absolute against the current directory
/// and cleaned lexically.
#[must_use]
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    if let Some(canonical) = dunce::canonicalize(path)
        .ok()
        .and_then(|canonical| Utf8PathBuf::from_path_buf(canonical).ok())
    {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .ok()
            .and_then(|cwd| Utf8PathBuf::from_path_buf(cwd).ok())
            .map_or_else(|| path.to_path_buf(), |cwd| cwd.join(path))
    };

    clean(&absolute)
}

fn clean(path: &Utf8Path) -> Utf8PathBuf {
    let mut cleaned = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match cleaned.components().next_back() {
                Some(Utf8Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Utf8Component::RootDir | Utf8Component::Prefix(_)) => {}
                Some(Utf8Component::CurDir | Utf8Component::ParentDir) | None => {
                    cleaned.push(component.as_str());
                }
            },
            Utf8Component::Prefix(_) | Utf8Component::RootDir | Utf8Component::Normal(_) => {
                cleaned.push(component.as_str());
            }
        }
    }
    cleaned
}
