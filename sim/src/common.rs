//! Shared helpers for the simulation binary: logger setup and output path handling.

use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use env_logger::{Builder, Target, fmt::Formatter};
use log::{LevelFilter, Record};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Install the global logger at `level`, writing to `log_file` (appending) or to stderr.
///
/// # Errors
/// Returns an error if the log file cannot be opened or a logger is already installed.
pub fn init_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let target = match log_file {
        Some(path) => {
            ensure_parent_dir(path)?;
            Target::Pipe(Box::new(open_append(path)?))
        }
        None => Target::Stderr,
    };
    Builder::new()
        .filter_level(level)
        .format(format_record)
        .target(target)
        .try_init()?;
    Ok(())
}

fn format_record(buf: &mut Formatter, record: &Record) -> io::Result<()> {
    writeln!(
        buf,
        "{} [{:<5}] {}: {}",
        chrono::Local::now().format(TIMESTAMP_FORMAT),
        record.level(),
        record.target(),
        record.args()
    )
}

/// Open `path` for appending, creating it when missing.
fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Parse a level name, falling back to `info` with a note on stderr.
pub fn parse_level(log_level: &str) -> LevelFilter {
    log_level.parse::<LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{log_level}', defaulting to 'info'");
        LevelFilter::Info
    })
}

/// Create the parent directory of `path` if it has one and it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
