use color_eyre::{eyre::WrapErr, Result};
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// Everything allowed by `FACTOSYNC_LOG` (default `info`) goes to a daily
/// rolling file in `log_dir`; warnings and errors are mirrored to stderr.
/// Keep the returned guard alive or buffered lines are lost on exit.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;

  let appender = tracing_appender::rolling::daily(log_dir, "factosync.log");
  let (file_writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("FACTOSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(file_writer).with_ansi(false))
    .with(
      fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::WARN),
    )
    .try_init()
    .wrap_err("Failed to install logger")?;

  Ok(guard)
}
