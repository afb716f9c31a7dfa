//! Logging initialization for the two supported destinations.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogDestination;

/// Flag-derived default filter level.
///
/// `--debug` raises the level; `--verbose` and the default both resolve
/// to info, which keeps the startup announcement visible without flags.
pub fn level_for(debug: bool, verbose: bool) -> &'static str {
    match (debug, verbose) {
        (true, _) => "debug",
        (false, _) => "info",
    }
}

/// Initialize the logging subsystem for the chosen destination.
///
/// Console is human-readable output on stderr, keeping stdout free for
/// catalog output. System is structured JSON appended to
/// `<logdir>/ravelin.log`; a file sink stays usable after the daemon
/// redirects its standard descriptors to `/dev/null`. `RUST_LOG`
/// overrides the flag-derived level.
///
/// A second call keeps the first subscriber; embedding hosts may have
/// installed their own before driving setup.
pub fn init(
    destination: LogDestination,
    debug: bool,
    verbose: bool,
    logdir: &Path,
) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(debug, verbose)));

    let result = match destination {
        LogDestination::Console => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .try_init(),
        LogDestination::System => {
            fs::create_dir_all(logdir)?;
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(logdir.join("ravelin.log"))?;
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .flatten_event(true)
                        .with_writer(Arc::new(file))
                        .with_filter(filter),
                )
                .try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("logging already initialized, keeping existing subscriber");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_shows_info() {
        assert_eq!(level_for(false, false), "info");
        assert_eq!(level_for(false, true), "info");
        assert_eq!(level_for(true, false), "debug");
        assert_eq!(level_for(true, true), "debug");
    }

    #[test]
    fn system_destination_opens_a_durable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logdir = dir.path().join("log");

        init(LogDestination::System, false, false, &logdir).unwrap();
        assert!(logdir.join("ravelin.log").is_file());
    }
}
