mod check;
mod load;
mod watch;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use camino::Utf8Path;
use clap::Subcommand;
use clap::ValueEnum;
use owsc_cache::CacheError;
use owsc_cache::CacheOptions;
use owsc_cache::RequestContext;
use owsc_cache::ServiceFamily;
use owsc_conf::Settings;

use crate::args::Args;
use crate::exit::Exit;

pub trait Command {
    fn execute(&self, args: &Args, settings: &Settings) -> Result<Exit>;
}

#[derive(Debug, Subcommand)]
pub enum OwscCommand {
    /// Parse configuration files and report XML errors
    Check(self::check::Check),
    /// Load one file and print its service configuration
    Load(self::load::Load),
    /// Load files and reprint them whenever they change on disk
    Watch(self::watch::Watch),
}

impl Command for OwscCommand {
    fn execute(&self, args: &Args, settings: &Settings) -> Result<Exit> {
        match self {
            OwscCommand::Check(command) => command.execute(args, settings),
            OwscCommand::Load(command) => command.execute(args, settings),
            OwscCommand::Watch(command) => command.execute(args, settings),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Service {
    Wcs,
    Wfs,
    Wms,
}

impl From<Service> for ServiceFamily {
    fn from(service: Service) -> Self {
        match service {
            Service::Wcs => ServiceFamily::Wcs,
            Service::Wfs => ServiceFamily::Wfs,
            Service::Wms => ServiceFamily::Wms,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn cache_options(settings: &Settings, watch: bool) -> CacheOptions {
    let defaults = CacheOptions::default();
    CacheOptions {
        application_version: settings
            .application_version
            .clone()
            .unwrap_or(defaults.application_version),
        watch,
        debounce: Duration::from_millis(settings.watch.debounce_ms),
    }
}

/// Parse a `KEY=VALUE` request parameter.
fn parse_param(raw: &str) -> Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=VALUE, got '{raw}'");
    };
    if key.is_empty() {
        bail!("parameter name is empty in '{raw}'");
    }
    Ok((key.to_string(), value.to_string()))
}

/// One-line description of a failed load, `path:line:column: message` for XML
/// errors.
fn render_error(path: &Utf8Path, err: &CacheError) -> String {
    match err.parse_error() {
        Some(parse) => format!(
            "{path}:{}:{}: {}",
            parse.line, parse.column, parse.message
        ),
        None => match std::error::Error::source(err) {
            Some(source) => format!("{path}: {err}: {source}"),
            None => format!("{path}: {err}"),
        },
    }
}

fn request_context(params: &[(String, String)]) -> RequestContext {
    params.iter().cloned().collect()
}
