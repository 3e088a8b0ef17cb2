//! Reading layer declarations out of project documents.

use camino::Utf8PathBuf;
use owsc_xml::Element;
use serde::Serialize;

use crate::context::RequestContext;
use crate::error::ConfigBuildError;
use crate::services::ServiceFamily;
use crate::version::ProjectVersion;

pub(crate) const PROJECT_ROOT: &str = "qgis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Vector,
    Raster,
    Other(String),
}

impl LayerKind {
    fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("vector") => LayerKind::Vector,
            Some("raster") => LayerKind::Raster,
            Some(other) => LayerKind::Other(other.to_string()),
            None => LayerKind::Other(String::new()),
        }
    }
}

/// A `<maplayer>` declared under `<projectlayers>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectLayer {
    pub id: String,
    pub name: String,
    pub kind: LayerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Overview of a project file, built fresh on every request.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub path: Utf8PathBuf,
    pub version: Option<ProjectVersion>,
    pub title: Option<String>,
    pub layers: Vec<ProjectLayer>,
}

/// All layers declared by a project, in document order.
///
/// Layers without an `<id>` cannot be referenced by service settings and are
/// skipped.
pub(crate) fn project_layers(root: &Element) -> Vec<ProjectLayer> {
    let Some(container) = root.child("projectlayers") else {
        return Vec::new();
    };

    container
        .children_named("maplayer")
        .filter_map(|layer| {
            let Some(id) = layer.child_text("id") else {
                tracing::debug!("Skipping map layer without an id");
                return None;
            };
            let name = layer.child_text("layername").unwrap_or_else(|| id.clone());
            Some(ProjectLayer {
                name,
                kind: LayerKind::from_attribute(layer.attribute("type")),
                provider: layer.child_text("provider"),
                id,
            })
        })
        .collect()
}

/// The `<value>` entries of a string-list project property.
pub(crate) fn property_list(root: &Element, key: &str) -> Vec<String> {
    root.child("properties")
        .and_then(|properties| properties.child(key))
        .map(|property| {
            property
                .children_named("value")
                .map(Element::text)
                .filter(|value| !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn project_title(root: &Element) -> Option<String> {
    root.find("properties/WMSServiceTitle")
        .map(Element::text)
        .filter(|title| !title.is_empty())
        .or_else(|| root.child_text("title"))
}

pub(crate) fn require_project_root(root: &Element) -> Result<(), ConfigBuildError> {
    if root.name() == PROJECT_ROOT {
        Ok(())
    } else {
        Err(ConfigBuildError::new(format!(
            "document root <{}> is not a project",
            root.name()
        )))
    }
}

/// Resolve the layer ids a service publishes against the project's layers.
///
/// Every id listed under `properties/<property>` must name a declared layer of
/// the `expected` kind. Layers the request context's access policy rejects are
/// dropped.
pub(crate) fn published_layers(
    root: &Element,
    property: &str,
    expected: &LayerKind,
    family: ServiceFamily,
    context: &RequestContext,
) -> Result<Vec<ProjectLayer>, ConfigBuildError> {
    require_project_root(root)?;
    let declared = project_layers(root);

    let mut published = Vec::new();
    for id in property_list(root, property) {
        let layer = declared
            .iter()
            .find(|layer| layer.id == id)
            .ok_or_else(|| {
                ConfigBuildError::new(format!("{property} references unknown layer '{id}'"))
            })?;
        if &layer.kind != expected {
            return Err(ConfigBuildError::new(format!(
                "layer '{id}' published for {family} is not a {expected:?} layer"
            )));
        }
        if context.allows(family, layer) {
            published.push(layer.clone());
        } else {
            tracing::debug!(layer = %layer.name, %family, "Layer hidden by access control");
        }
    }
    Ok(published)
}
