use std::collections::BTreeMap;
use std::sync::Arc;

use owsc_xml::XmlDocument;
use serde::Serialize;

pub(crate) const SLD_ROOT: &str = "StyledLayerDescriptor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SldLayer {
    pub name: String,
    /// `true` for `<UserLayer>`, `false` for `<NamedLayer>`.
    pub user_defined: bool,
}

/// Map service configuration described by a styled layer descriptor.
///
/// Keeps a handle to the document it was built from; style lookups read the
/// tree directly.
#[derive(Debug)]
pub struct SldConfig {
    document: Arc<XmlDocument>,
    parameters: BTreeMap<String, String>,
    layers: Vec<SldLayer>,
}

impl SldConfig {
    pub(crate) fn new(document: Arc<XmlDocument>, parameters: BTreeMap<String, String>) -> Self {
        let layers = document
            .root()
            .elements()
            .filter_map(|element| {
                let user_defined = match element.name() {
                    "NamedLayer" => false,
                    "UserLayer" => true,
                    _ => return None,
                };
                Some(SldLayer {
                    name: element.child_text("Name").unwrap_or_default(),
                    user_defined,
                })
            })
            .collect();

        Self {
            document,
            parameters,
            layers,
        }
    }

    #[must_use]
    pub fn document(&self) -> &Arc<XmlDocument> {
        &self.document
    }

    /// Request parameters supplied when the configuration was built.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    #[must_use]
    pub fn layers(&self) -> &[SldLayer] {
        &self.layers
    }
}
