//! Tracing setup for the command line.
//!
//! Events go to stderr, filtered by `RUST_LOG` or the verbosity flags. When
//! settings name a `log_dir`, a daily-rolling log file is written there too.

use camino::Utf8Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

/// Install the global subscriber.
///
/// Returns a `WorkerGuard` when file logging is enabled; it must be kept alive
/// until exit so buffered lines are flushed.
pub fn init_tracing(directive: &str, log_dir: Option<&Utf8Path>) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir.as_std_path(), "owsc.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_thread_names(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default().with(stderr_layer).with(file_layer).init();

    guard
}
