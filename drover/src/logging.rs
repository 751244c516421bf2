use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::{Args, BoxError};

/// Sets up the global subscriber. The returned guard must live for
/// the rest of the process when logging to a file, otherwise buffered
/// lines are lost on exit.
pub fn init(args: &Args) -> Result<Option<WorkerGuard>, BoxError> {
    let default = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env()?;

    let Some(logfile) = &args.logfile else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
        return Ok(None);
    };

    let directory = logfile
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = logfile
        .file_name()
        .ok_or("--logfile must point at a file")?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(Some(guard))
}
