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

/// Coverage service configuration: the raster layers listed under the
/// project's `WCSLayers` property.
#[derive(Debug)]
pub struct WcsConfig {
    path: Utf8PathBuf,
    title: Option<String>,
    layers: Vec<ProjectLayer>,
}

impl WcsConfig {
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
}

impl ServiceConfig for WcsConfig {
    const FAMILY: ServiceFamily = ServiceFamily::Wcs;

    fn build(
        path: &Utf8Path,
        document: &Arc<XmlDocument>,
        context: &RequestContext,
    ) -> Result<Self, ConfigBuildError> {
        let root = document.root();
        let layers =
            published_layers(root, "WCSLayers", &LayerKind::Raster, Self::FAMILY, context)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_without_coverages_is_empty() {
        let document = Arc::new(owsc_xml::parse(b"<qgis><projectlayers/></qgis>").unwrap());
        let config = WcsConfig::build(
            Utf8Path::new("/srv/a.qgs"),
            &document,
            &RequestContext::default(),
        )
        .unwrap();
        assert_eq!(config.layer_count(), 0);
        assert_eq!(config.title(), None);
    }
}
