use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;

/// Installs the global subscriber. With a log file, lines are appended to it
/// without colors; a detached process has no terminal to write to.
pub fn setup(level: Level, log_file: Option<&Path>) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_max_level(level);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("unable to open log file {}", path.display()))?;

            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.try_init(),
    };

    installed.map_err(|e| anyhow!("unable to install logger: {e}"))
}
