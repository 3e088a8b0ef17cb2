use std::collections::HashMap;
use std::path::Path;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use config::Config;
use config::ConfigError as ExternalConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
}

#[must_use]
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "owsc", "owsc")
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WatchSettings {
    /// Register cached files with the OS file watcher.
    pub enabled: bool,
    /// Quiet period before a burst of change events is acted on.
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    /// Version project files are compared against. Falls back to the server
    /// release the cache targets when unset.
    pub application_version: Option<String>,
    /// Directory for daily-rotated log files. Logs go to stderr only when unset.
    pub log_dir: Option<Utf8PathBuf>,
    pub watch: WatchSettings,
}

impl Settings {
    /// Load settings for a project rooted at `project_root`.
    ///
    /// Sources, lowest priority first: the user config file, `.owsc.toml`,
    /// `owsc.toml`, then `OWSC_*` environment variables (nested keys use `__`,
    /// e.g. `OWSC_WATCH__DEBOUNCE_MS`).
    pub fn new(project_root: &Utf8Path) -> Result<Self, ConfigError> {
        let user_config_file =
            project_dirs().map(|proj_dirs| proj_dirs.config_dir().join("owsc.toml"));

        Self::load_from_paths(project_root, user_config_file.as_deref(), None)
    }

    fn load_from_paths(
        project_root: &Utf8Path,
        user_config_path: Option<&Path>,
        environment: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(project_root.join(".owsc.toml").as_std_path())
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("owsc.toml").as_std_path())
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            Environment::with_prefix("OWSC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(environment),
        );

        let config = builder.build()?;
        let settings = config.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn root(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn load(project_root: &Utf8Path, user: Option<&Path>) -> Result<Settings, ConfigError> {
        Settings::load_from_paths(project_root, user, Some(HashMap::new()))
    }

    mod defaults {
        use super::*;

        #[test]
        fn test_load_no_files() {
            let dir = tempdir().unwrap();
            let settings = load(&root(&dir), None).unwrap();
            assert_eq!(settings, Settings::default());
            assert!(settings.watch.enabled);
            assert_eq!(settings.watch.debounce_ms, 250);
        }
    }

    mod project_files {
        use super::*;

        #[test]
        fn test_load_owsc_toml_only() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join("owsc.toml"),
                "debug = true\napplication_version = \"3.4.0\"\n",
            )
            .unwrap();
            let settings = load(&root(&dir), None).unwrap();
            assert!(settings.debug);
            assert_eq!(settings.application_version.as_deref(), Some("3.4.0"));
        }

        #[test]
        fn test_load_watch_table() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join(".owsc.toml"),
                "[watch]\nenabled = false\ndebounce_ms = 50\n",
            )
            .unwrap();
            let settings = load(&root(&dir), None).unwrap();
            assert_eq!(
                settings.watch,
                WatchSettings {
                    enabled: false,
                    debounce_ms: 50
                }
            );
        }
    }

    mod priority {
        use super::*;

        #[test]
        fn test_owsc_overrides_dot_owsc() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(".owsc.toml"), "debug = false").unwrap();
            fs::write(dir.path().join("owsc.toml"), "debug = true").unwrap();
            let settings = load(&root(&dir), None).unwrap();
            assert!(settings.debug);
        }

        #[test]
        fn test_project_overrides_user() {
            let user_dir = tempdir().unwrap();
            let project_dir = tempdir().unwrap();
            let user_conf_path = user_dir.path().join("owsc.toml");
            fs::write(&user_conf_path, "debug = true\nlog_dir = \"/var/log/owsc\"").unwrap();
            fs::write(project_dir.path().join("owsc.toml"), "debug = false").unwrap();

            let settings = load(&root(&project_dir), Some(&user_conf_path)).unwrap();
            assert!(!settings.debug);
            assert_eq!(
                settings.log_dir.as_deref(),
                Some(Utf8Path::new("/var/log/owsc"))
            );
        }

        #[test]
        fn test_environment_overrides_files() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("owsc.toml"), "[watch]\ndebounce_ms = 50\n").unwrap();
            let environment = HashMap::from([
                ("OWSC_WATCH__DEBOUNCE_MS".to_string(), "900".to_string()),
                ("OWSC_DEBUG".to_string(), "true".to_string()),
            ]);

            let settings = Settings::load_from_paths(&root(&dir), None, Some(environment)).unwrap();
            assert!(settings.debug);
            assert_eq!(settings.watch.debounce_ms, 900);
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn test_invalid_toml_content() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("owsc.toml"), "debug = not_a_boolean").unwrap();
            let result = load(&root(&dir), None);
            assert!(matches!(result.unwrap_err(), ConfigError::Config(_)));
        }
    }
}
