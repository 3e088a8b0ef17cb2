use std::fmt;
use std::str::FromStr;

use owsc_xml::XmlDocument;
use serde::Serialize;

/// The version a project file was saved with, e.g. `3.4.0-Madeira`.
///
/// Two versions are equal when their numeric parts match; the release name is
/// informational only.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectVersion {
    major: u32,
    minor: u32,
    patch: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl ProjectVersion {
    #[must_use]
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            name: None,
        }
    }

    /// The version declared by a project document, if it declares one.
    ///
    /// Only `qgis` project roots carry a project version; other documents (SLD
    /// files in particular) use `version` for their own schema version.
    #[must_use]
    pub fn declared_by(document: &XmlDocument) -> Option<Result<Self, String>> {
        let root = document.root();
        if root.name() != "qgis" {
            return None;
        }
        let declared = root.attribute("version")?;
        Some(declared.parse().map_err(|()| declared.to_string()))
    }

    #[must_use]
    pub fn major(&self) -> u32 {
        self.major
    }

    #[must_use]
    pub fn minor(&self) -> u32 {
        self.minor
    }

    #[must_use]
    pub fn patch(&self) -> u32 {
        self.patch
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for ProjectVersion {
    fn eq(&self, other: &Self) -> bool {
        (self.major, self.minor, self.patch) == (other.major, other.minor, other.patch)
    }
}

impl Eq for ProjectVersion {}

impl FromStr for ProjectVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (numbers, name) = match s.trim().split_once('-') {
            Some((numbers, name)) => (numbers, Some(name.trim().to_string())),
            None => (s.trim(), None),
        };

        let mut parts = numbers.split('.');
        let mut next = || -> Result<u32, ()> {
            parts
                .next()
                .map_or(Ok(0), |part| part.parse().map_err(|_| ()))
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        if parts.next().is_some() {
            return Err(());
        }

        Ok(Self {
            major,
            minor,
            patch,
            name: name.filter(|name| !name.is_empty()),
        })
    }
}

impl fmt::Display for ProjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(name) = &self.name {
            write!(f, "-{name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_name() {
        let version: ProjectVersion = "2.18.3-Las Palmas".parse().unwrap();
        assert_eq!(version, ProjectVersion::new(2, 18, 3));
        assert_eq!(version.name(), Some("Las Palmas"));
        assert_eq!(version.to_string(), "2.18.3-Las Palmas");
    }

    #[test]
    fn missing_parts_default_to_zero() {
        let version: ProjectVersion = "3.4".parse().unwrap();
        assert_eq!(version, ProjectVersion::new(3, 4, 0));
    }

    #[test]
    fn rejects_garbage() {
        assert!("three".parse::<ProjectVersion>().is_err());
        assert!("1.2.3.4".parse::<ProjectVersion>().is_err());
    }

    #[test]
    fn release_name_does_not_affect_equality() {
        let a: ProjectVersion = "3.4.0-Madeira".parse().unwrap();
        let b: ProjectVersion = "3.4.0".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn only_project_roots_declare_versions() {
        let project = owsc_xml::parse(br#"<qgis version="3.4.0"/>"#).unwrap();
        let sld = owsc_xml::parse(br#"<StyledLayerDescriptor version="1.0.0"/>"#).unwrap();
        let bad = owsc_xml::parse(br#"<qgis version="unknown"/>"#).unwrap();

        assert_eq!(
            ProjectVersion::declared_by(&project),
            Some(Ok(ProjectVersion::new(3, 4, 0)))
        );
        assert_eq!(ProjectVersion::declared_by(&sld), None);
        assert_eq!(
            ProjectVersion::declared_by(&bad),
            Some(Err("unknown".to_string()))
        );
    }
}
