use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::SystemTime;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use clap::Parser;
use owsc_cache::normalize_path;
use owsc_cache::ConfigCache;
use owsc_cache::LayerBudget;
use owsc_cache::RequestContext;
use owsc_cache::ServiceFamily;
use owsc_conf::Settings;

use crate::args::Args;
use crate::commands::cache_options;
use crate::commands::load::Report;
use crate::commands::parse_param;
use crate::commands::render_error;
use crate::commands::request_context;
use crate::commands::Command;
use crate::commands::Service;
use crate::exit::Exit;

#[derive(Debug, Parser)]
pub struct Watch {
    /// Configuration files to watch.
    #[arg(required = true)]
    paths: Vec<Utf8PathBuf>,

    /// Build this service's configuration instead of the project summary.
    #[arg(long, value_enum)]
    service: Option<Service>,

    /// Request parameter passed to the configuration build (repeatable).
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// How often to check for evicted entries, in milliseconds.
    #[arg(long, default_value_t = 200)]
    poll_ms: u64,
}

/// A watched file and the outcome of its last load.
struct Target {
    path: Utf8PathBuf,
    loaded: bool,
    modified: Option<SystemTime>,
}

impl Command for Watch {
    fn execute(&self, _args: &Args, settings: &Settings) -> Result<Exit> {
        if !settings.watch.enabled {
            return Ok(Exit::error()
                .with_message("File watching is disabled by the `watch.enabled` setting."));
        }

        let budget = Arc::new(LayerBudget::new());
        let cache = ConfigCache::start(cache_options(settings, true), budget.clone())
            .context("Failed to start the configuration cache")?;
        let service = self.service.map(ServiceFamily::from);
        let context = request_context(&self.params);

        let mut targets: Vec<Target> = self
            .paths
            .iter()
            .map(|path| Target {
                path: normalize_path(path),
                loaded: false,
                modified: None,
            })
            .collect();
        for target in &mut targets {
            reload(&cache, target, service, &context);
        }
        tracing::info!(
            files = targets.len(),
            max_layers = ?budget.project_max_layers(),
            "Watching for changes"
        );

        let interval = Duration::from_millis(self.poll_ms);
        loop {
            thread::sleep(interval);
            for target in &mut targets {
                // Files that failed to load have no cache entry and no OS
                // watch, so fall back to their modification time.
                let stale = if target.loaded {
                    !cache.is_cached(&target.path)
                } else {
                    modified(&target.path) != target.modified
                };
                if stale {
                    reload(&cache, target, service, &context);
                }
            }
        }
    }
}

fn reload(
    cache: &ConfigCache,
    target: &mut Target,
    service: Option<ServiceFamily>,
    context: &RequestContext,
) {
    target.modified = modified(&target.path);
    match Report::load(cache, &target.path, service, context) {
        Ok(report) => {
            target.loaded = true;
            print!("{report}");
        }
        Err(err) => {
            target.loaded = false;
            println!("{}", render_error(&target.path, &err));
        }
    }
}

fn modified(path: &Utf8Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|metadata| metadata.modified()).ok()
}
