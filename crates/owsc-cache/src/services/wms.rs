use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use owsc_xml::Element;
use owsc_xml::XmlDocument;

use crate::context::RequestContext;
use crate::error::ConfigBuildError;
use crate::services::project::project_layers;
use crate::services::project::project_title;
use crate::services::project::property_list;
use crate::services::sld::SLD_ROOT;
use crate::services::ProjectLayer;
use crate::services::ServiceConfig;
use crate::services::ServiceFamily;
use crate::services::SldConfig;

/// Map service configuration.
///
/// The variant follows the document: a styled layer descriptor root yields
/// [`WmsConfig::Sld`], anything else is read as a project.
#[derive(Debug)]
pub enum WmsConfig {
    Sld(SldConfig),
    Project(WmsProjectConfig),
}

impl WmsConfig {
    #[must_use]
    pub fn is_sld(&self) -> bool {
        matches!(self, WmsConfig::Sld(_))
    }

    #[must_use]
    pub fn layer_names(&self) -> Vec<&str> {
        match self {
            WmsConfig::Sld(sld) => sld
                .layers()
                .iter()
                .map(|layer| layer.name.as_str())
                .collect(),
            WmsConfig::Project(project) => project
                .layers()
                .iter()
                .map(|layer| layer.name.as_str())
                .collect(),
        }
    }
}

fn is_sld_root(root: &Element) -> bool {
    root.name() == SLD_ROOT
}

impl ServiceConfig for WmsConfig {
    const FAMILY: ServiceFamily = ServiceFamily::Wms;

    fn build(
        path: &Utf8Path,
        document: &Arc<XmlDocument>,
        context: &RequestContext,
    ) -> Result<Self, ConfigBuildError> {
        if is_sld_root(document.root()) {
            Ok(WmsConfig::Sld(SldConfig::new(
                Arc::clone(document),
                context.parameters().clone(),
            )))
        } else {
            Ok(WmsConfig::Project(WmsProjectConfig::new(path, document, context)))
        }
    }

    fn layer_count(&self) -> usize {
        match self {
            WmsConfig::Sld(sld) => sld.layers().len(),
            WmsConfig::Project(project) => project.layers().len(),
        }
    }
}

/// Map service configuration read from a project file.
///
/// Publishes every declared layer except those named in the
/// `WMSRestrictedLayers` property.
#[derive(Debug)]
pub struct WmsProjectConfig {
    path: Utf8PathBuf,
    title: Option<String>,
    layers: Vec<ProjectLayer>,
    restricted: Vec<String>,
}

impl WmsProjectConfig {
    fn new(path: &Utf8Path, document: &XmlDocument, context: &RequestContext) -> Self {
        let root = document.root();
        let restricted = property_list(root, "WMSRestrictedLayers");
        let layers = project_layers(root)
            .into_iter()
            .filter(|layer| !restricted.contains(&layer.name))
            .filter(|layer| context.allows(ServiceFamily::Wms, layer))
            .collect();

        Self {
            path: path.to_path_buf(),
            title: project_title(root),
            layers,
            restricted,
        }
    }

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
    pub fn restricted_layers(&self) -> &[String] {
        &self.restricted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(source: &[u8], context: &RequestContext) -> WmsConfig {
        let document = Arc::new(owsc_xml::parse(source).unwrap());
        WmsConfig::build(Utf8Path::new("/srv/a.qgs"), &document, context).unwrap()
    }

    #[test]
    fn sld_root_selects_sld_variant() {
        let config = build(
            b"<StyledLayerDescriptor><NamedLayer><Name>roads</Name></NamedLayer></StyledLayerDescriptor>",
            &RequestContext::new().with_parameter("STYLES", ""),
        );
        let WmsConfig::Sld(sld) = &config else {
            panic!("expected the SLD variant");
        };
        assert_eq!(sld.parameters().len(), 1);
        assert_eq!(config.layer_names(), vec!["roads"]);
    }

    #[test]
    fn any_other_root_selects_project_variant() {
        let config = build(b"<somethingelse/>", &RequestContext::default());
        assert!(!config.is_sld());
        assert_eq!(config.layer_count(), 0);
    }

    #[test]
    fn restricted_layers_are_not_published() {
        let config = build(
            br#"<qgis>
  <projectlayers>
    <maplayer type="vector"><id>a</id><layername>Roads</layername></maplayer>
    <maplayer type="raster"><id>b</id><layername>Secret</layername></maplayer>
  </projectlayers>
  <properties>
    <WMSServiceTitle type="QString">City map</WMSServiceTitle>
    <WMSRestrictedLayers type="QStringList"><value>Secret</value></WMSRestrictedLayers>
  </properties>
</qgis>"#,
            &RequestContext::default(),
        );
        let WmsConfig::Project(project) = &config else {
            panic!("expected the project variant");
        };
        assert_eq!(project.title(), Some("City map"));
        assert_eq!(project.restricted_layers(), ["Secret".to_string()]);
        assert_eq!(config.layer_names(), vec!["Roads"]);
    }
}
