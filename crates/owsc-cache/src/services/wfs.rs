use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use owsc_xml::XmlDocument;

use crate::context::RequestContext;
use crate::error::ConfigBuildError;
use crate::services::project::project_title;
use crate::services::project::published_layers;
use crate::services::LayerKind;
use crate::services::ProjectLayer;
use crate::services::ServiceConfig;
use crate::services::ServiceFamily;

/// Feature service configuration: the vector layers listed under the
/// project's `WFSLayers` property.
#[derive(Debug)]
pub struct WfsConfig {
    path: Utf8PathBuf,
    title: Option<String>,
    layers: Vec<ProjectLayer>,
}

impl WfsConfig {
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn layers(&self) -> &[ProjectLayer] {
        &self.layers
    }

    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&ProjectLayer> {
        self.layers.iter().find(|layer| layer.name == name)
    }
}

impl ServiceConfig for WfsConfig {
    const FAMILY: ServiceFamily = ServiceFamily::Wfs;

    fn build(
        path: &Utf8Path,
        document: &Arc<XmlDocument>,
        context: &RequestContext,
    ) -> Result<Self, ConfigBuildError> {
        let root = document.root();
        let layers =
            published_layers(root, "WFSLayers", &LayerKind::Vector, Self::FAMILY, context)?;
        Ok(Self {
            path: path.to_path_buf(),
            title: project_title(root),
            layers,
        })
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }
}
