//! Process-wide logging setup, shared by both CLI binaries and by tests that
//! want readable output. Mirrors the dual stdout/file dispatch used
//! throughout the rest of this crate's ancestry: colored levels on stdout,
//! plain levels in a per-app log file plus an unfiltered "full" log file.

use colored::Colorize;
use log::{Level, LevelFilter};
use std::fs;
use std::path::PathBuf;

/// Initialize the global logger for `app_name` at the given verbosity.
///
/// `verbosity` follows the CLI's repeated `-v` convention: 0 = errors only,
/// up to 4+ = trace. The named target always gets trace-level file output
/// regardless of verbosity, so `RUST_LOG`-style noise from dependencies
/// doesn't drown out this crate's own records.
pub fn init(app_name: impl AsRef<str>, verbosity: u64) -> Result<(), fern::InitError> {
    let app_name = app_name.as_ref();
    let log_root = PathBuf::from("log").join(app_name);
    fs::create_dir_all(&log_root)?;

    let level = match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let stdout_dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                colorize_level(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for(app_name.to_string(), LevelFilter::Trace)
        .chain(std::io::stdout());

    let file_stem = log_root.join(format!("{app_name}.{}", chrono::Utc::now().format("%Y_%m_%d")));

    let app_file_dispatch = fern::Dispatch::new()
        .level(LevelFilter::Off)
        .level_for(app_name.to_string(), LevelFilter::Trace)
        .chain(fern::log_file(format!("{}.log", file_stem.display()))?);

    let full_file_dispatch =
        fern::Dispatch::new().chain(fern::log_file(format!("{}.full.log", file_stem.display()))?);

    let files_dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .chain(app_file_dispatch)
        .chain(full_file_dispatch);

    fern::Dispatch::new()
        .chain(stdout_dispatch)
        .chain(files_dispatch)
        .apply()?;

    Ok(())
}

fn colorize_level(level: Level) -> colored::ColoredString {
    match level {
        Level::Error => level.to_string().red(),
        Level::Warn => level.to_string().yellow(),
        Level::Info => level.to_string().cyan(),
        Level::Debug => level.to_string().purple(),
        Level::Trace => level.to_string().normal(),
    }
}
