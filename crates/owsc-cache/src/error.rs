use std::io;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use owsc_xml::ParseError;
use thiserror::Error;

use crate::services::ServiceFamily;

/// Why no configuration is available for a path.
///
/// Nothing is cached when a lookup fails; the next request for the same path
/// tries again from disk.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("configuration file '{path}' does not exist")]
    FileNotFound { path: Utf8PathBuf },
    #[error("cannot open configuration file '{path}'")]
    FileUnreadable {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error parsing configuration file '{path}'")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("cannot build {family} configuration from '{path}'")]
    ConfigBuild {
        path: Utf8PathBuf,
        family: ServiceFamily,
        #[source]
        source: ConfigBuildError,
    },
}

impl CacheError {
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            CacheError::FileNotFound { path }
            | CacheError::FileUnreadable { path, .. }
            | CacheError::Parse { path, .. }
            | CacheError::ConfigBuild { path, .. } => path,
        }
    }

    #[must_use]
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            CacheError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A well-formed document that does not describe a usable service
/// configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ConfigBuildError {
    message: String,
}

impl ConfigBuildError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
