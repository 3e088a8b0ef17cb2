use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::services::ProjectLayer;
use crate::services::ServiceFamily;

/// Policy deciding which project layers a service may publish.
pub trait AccessControl: Send + Sync + fmt::Debug {
    fn layer_readable(&self, family: ServiceFamily, layer: &ProjectLayer) -> bool;
}

/// Per-call inputs handed to service configuration builders.
///
/// The context is consulted only when a configuration is built. It is not part
/// of the cache key: a later call for the same path gets the configuration
/// built with the first caller's context.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    access_control: Option<Arc<dyn AccessControl>>,
    parameters: BTreeMap<String, String>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_access_control(mut self, access_control: Arc<dyn AccessControl>) -> Self {
        self.access_control = Some(access_control);
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn access_control(&self) -> Option<&Arc<dyn AccessControl>> {
        self.access_control.as_ref()
    }

    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub(crate) fn allows(&self, family: ServiceFamily, layer: &ProjectLayer) -> bool {
        self.access_control
            .as_ref()
            .is_none_or(|policy| policy.layer_readable(family, layer))
    }
}

impl<K, V> FromIterator<(K, V)> for RequestContext
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            access_control: None,
            parameters: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}
