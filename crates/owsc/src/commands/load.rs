use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use clap::Parser;
use owsc_cache::CacheError;
use owsc_cache::ConfigCache;
use owsc_cache::LayerBudget;
use owsc_cache::LayerKind;
use owsc_cache::ProjectLayer;
use owsc_cache::ProjectSummary;
use owsc_cache::RequestContext;
use owsc_cache::ServiceFamily;
use owsc_cache::SldLayer;
use owsc_cache::WmsConfig;
use owsc_conf::Settings;
use serde::Serialize;

use crate::args::Args;
use crate::commands::cache_options;
use crate::commands::parse_param;
use crate::commands::render_error;
use crate::commands::request_context;
use crate::commands::Command;
use crate::commands::OutputFormat;
use crate::commands::Service;
use crate::exit::Exit;

#[derive(Debug, Parser)]
pub struct Load {
    /// Configuration file to load.
    path: Utf8PathBuf,

    /// Build this service's configuration instead of the project summary.
    #[arg(long, value_enum)]
    service: Option<Service>,

    /// Request parameter passed to the configuration build (repeatable).
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl Command for Load {
    fn execute(&self, _args: &Args, settings: &Settings) -> Result<Exit> {
        let budget = Arc::new(LayerBudget::new());
        let cache = ConfigCache::new(&cache_options(settings, false), budget.clone());
        let context = request_context(&self.params);

        let report = match Report::load(&cache, &self.path, self.service.map(Into::into), &context)
        {
            Ok(report) => report,
            Err(err) => return Ok(Exit::error().with_message(render_error(&self.path, &err))),
        };
        tracing::debug!(max_layers = ?budget.project_max_layers(), "Layer budget updated");

        match self.format {
            OutputFormat::Text => print!("{report}"),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        Ok(Exit::success())
    }
}

/// What `load` and `watch` print for one file.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(super) enum Report {
    Project(ProjectSummary),
    Service {
        path: Utf8PathBuf,
        service: ServiceFamily,
        title: Option<String>,
        layers: Vec<ProjectLayer>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        restricted: Vec<String>,
    },
    Sld {
        path: Utf8PathBuf,
        layers: Vec<SldLayer>,
        parameters: BTreeMap<String, String>,
    },
}

impl Report {
    pub(super) fn load(
        cache: &ConfigCache,
        path: &Utf8Path,
        service: Option<ServiceFamily>,
        context: &RequestContext,
    ) -> Result<Self, CacheError> {
        let Some(service) = service else {
            return cache.server_configuration(path).map(Report::Project);
        };

        let report = match service {
            ServiceFamily::Wcs => {
                let config = cache.wcs_configuration(path, context)?;
                Report::Service {
                    path: config.path().to_path_buf(),
                    service,
                    title: config.title().map(str::to_string),
                    layers: config.layers().to_vec(),
                    restricted: Vec::new(),
                }
            }
            ServiceFamily::Wfs => {
                let config = cache.wfs_configuration(path, context)?;
                Report::Service {
                    path: config.path().to_path_buf(),
                    service,
                    title: config.title().map(str::to_string),
                    layers: config.layers().to_vec(),
                    restricted: Vec::new(),
                }
            }
            ServiceFamily::Wms => match cache.wms_configuration(path, context)?.as_ref() {
                WmsConfig::Sld(sld) => Report::Sld {
                    path: path.to_path_buf(),
                    layers: sld.layers().to_vec(),
                    parameters: sld.parameters().clone(),
                },
                WmsConfig::Project(project) => Report::Service {
                    path: project.path().to_path_buf(),
                    service,
                    title: project.title().map(str::to_string),
                    layers: project.layers().to_vec(),
                    restricted: project.restricted_layers().to_vec(),
                },
            },
        };
        Ok(report)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Project(summary) => {
                writeln!(f, "project {}", summary.path)?;
                if let Some(version) = &summary.version {
                    writeln!(f, "  version: {version}")?;
                }
                if let Some(title) = &summary.title {
                    writeln!(f, "  title: {title}")?;
                }
                write_layers(f, &summary.layers)
            }
            Report::Service {
                path,
                service,
                title,
                layers,
                restricted,
            } => {
                writeln!(f, "{service} {path}")?;
                if let Some(title) = title {
                    writeln!(f, "  title: {title}")?;
                }
                write_layers(f, layers)?;
                if !restricted.is_empty() {
                    writeln!(f, "  restricted: {}", restricted.join(", "))?;
                }
                Ok(())
            }
            Report::Sld {
                path,
                layers,
                parameters,
            } => {
                writeln!(f, "WMS (SLD) {path}")?;
                writeln!(f, "  layers: {}", layers.len())?;
                for layer in layers {
                    let origin = if layer.user_defined { "user" } else { "named" };
                    writeln!(f, "    {} ({origin})", layer.name)?;
                }
                for (key, value) in parameters {
                    writeln!(f, "  {key}={value}")?;
                }
                Ok(())
            }
        }
    }
}

fn write_layers(f: &mut fmt::Formatter<'_>, layers: &[ProjectLayer]) -> fmt::Result {
    writeln!(f, "  layers: {}", layers.len())?;
    for layer in layers {
        writeln!(
            f,
            "    {} [{}] ({})",
            layer.name,
            layer.id,
            kind_label(&layer.kind)
        )?;
    }
    Ok(())
}

fn kind_label(kind: &LayerKind) -> &str {
    match kind {
        LayerKind::Vector => "vector",
        LayerKind::Raster => "raster",
        LayerKind::Other(other) if other.is_empty() => "unknown",
        LayerKind::Other(other) => other,
    }
}
