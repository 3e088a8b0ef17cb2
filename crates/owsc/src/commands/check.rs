use std::sync::Arc;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use owsc_cache::ConfigCache;
use owsc_cache::LayerBudget;
use owsc_conf::Settings;

use crate::args::Args;
use crate::commands::cache_options;
use crate::commands::render_error;
use crate::commands::Command;
use crate::exit::Exit;

#[derive(Debug, Parser)]
pub struct Check {
    /// Configuration files to parse.
    #[arg(required = true)]
    paths: Vec<Utf8PathBuf>,
}

impl Command for Check {
    fn execute(&self, args: &Args, settings: &Settings) -> Result<Exit> {
        let cache = ConfigCache::new(
            &cache_options(settings, false),
            Arc::new(LayerBudget::new()),
        );

        let mut failed: usize = 0;
        for path in &self.paths {
            match cache.document(path) {
                Ok(document) => {
                    if !args.global.quiet {
                        println!("{path}: ok <{}>", document.root().name());
                    }
                }
                Err(err) => {
                    failed += 1;
                    println!("{}", render_error(path, &err));
                }
            }
        }

        if failed > 0 {
            let total = self.paths.len();
            let file_word = if total == 1 { "file" } else { "files" };
            Ok(Exit::error().with_message(format!(
                "{failed} of {total} {file_word} failed to load."
            )))
        } else {
            Ok(Exit::success())
        }
    }
}
