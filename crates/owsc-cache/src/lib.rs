//! Process-wide cache of parsed map server configuration documents.
//!
//! [`ConfigCache`] sits between request handlers and the configuration files on
//! disk. It is organized in layers:
//!
//! - [`DocumentStore`] parses each XML file once and shares the tree.
//! - [`ServiceCache`] holds one per-family configuration (WCS, WFS, WMS) built
//!   lazily from a cached document.
//! - [`ChangeWatcher`] tracks which files are cached and, when one changes on
//!   disk, evicts every layer for that path (service entries first, then the
//!   document).
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use owsc_cache::{CacheOptions, ConfigCache, LayerBudget, RequestContext};
//!
//! let budget = Arc::new(LayerBudget::new());
//! let cache = ConfigCache::start(CacheOptions::default(), budget.clone())?;
//! let wfs = cache.wfs_configuration("/srv/projects/roads.qgs", &RequestContext::default())?;
//! println!("{} layers", wfs.layers().len());
//! ```

mod cache;
mod context;
mod documents;
mod error;
mod layers;
mod paths;
mod services;
mod version;
mod watcher;

pub use cache::CacheOptions;
pub use cache::CacheStats;
pub use cache::ConfigCache;
pub use context::AccessControl;
pub use context::RequestContext;
pub use documents::DocumentStore;
pub use error::CacheError;
pub use error::ConfigBuildError;
pub use layers::LayerBudget;
pub use layers::LayerLimitNotifier;
pub use paths::normalize_path;
pub use services::LayerKind;
pub use services::ProjectLayer;
pub use services::ProjectSummary;
pub use services::ServiceCache;
pub use services::ServiceConfig;
pub use services::ServiceFamily;
pub use services::SldConfig;
pub use services::SldLayer;
pub use services::WcsConfig;
pub use services::WfsConfig;
pub use services::WmsConfig;
pub use services::WmsProjectConfig;
pub use version::ProjectVersion;
pub use watcher::ChangeWatcher;
