use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;

use crate::args::Args;
use crate::commands::Command;
use crate::commands::OwscCommand;
use crate::exit::Exit;
use crate::logging::init_tracing;

/// Inspect and watch map server configuration files.
#[derive(Parser)]
#[command(name = "owsc")]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: OwscCommand,

    #[command(flatten)]
    pub args: Args,
}

/// Parse CLI arguments and execute the chosen command.
pub fn run(args: Vec<String>) -> Result<Exit> {
    let cli = Cli::try_parse_from(args).unwrap_or_else(|e| {
        e.exit();
    });

    let current_dir = std::env::current_dir().context("Failed to read current directory")?;
    let project_root = Utf8PathBuf::from_path_buf(current_dir)
        .map_err(|path| anyhow!("Current directory is not UTF-8: {}", path.display()))?;
    let settings =
        owsc_conf::Settings::new(&project_root).context("Failed to load settings")?;

    let directive = cli.args.global.log_directive(settings.debug);
    let _guard = init_tracing(directive, settings.log_dir.as_deref());
    tracing::debug!(root = %project_root, ?settings, "Loaded settings");

    cli.command.execute(&cli.args, &settings)
}
