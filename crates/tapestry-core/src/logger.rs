//! Stderr logging for the `tapestry` tools.
//!
//! Records from the `tapestry*` crates are shown at the chosen level; records
//! from dependencies (HTTP client, image codecs) only from `warn` up, so a
//! `debug` run stays readable. Lines look like `[  1.204s  INFO tapestry_dispatch] ...`.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};
use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const OWN_PREFIX: &str = "tapestry";
const DEPENDENCY_LEVEL: LevelFilter = LevelFilter::Warn;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log level {0:?} (expected off, error, warn, info, debug or trace)")]
    InvalidLevel(String),
    #[error("a logger is already installed: {0}")]
    AlreadyInstalled(log::SetLoggerError),
}

/// Parse a `--log-level` style string.
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggerError> {
    level
        .trim()
        .parse()
        .map_err(|_| LoggerError::InvalidLevel(level.to_string()))
}

struct WallLogger {
    level: LevelFilter,
    started: Instant,
}

impl WallLogger {
    fn limit_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_PREFIX) {
            self.level
        } else {
            self.level.min(DEPENDENCY_LEVEL)
        }
    }
}

impl Log for WallLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.limit_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let crate_name = record.target().split("::").next().unwrap_or_default();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:8.3}s {:>5} {crate_name}] {}",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<WallLogger> = OnceLock::new();

/// Install the stderr logger. Later calls keep the first level.
pub fn init_with_level(level: LevelFilter) -> Result<(), LoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| WallLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger).map_err(LoggerError::AlreadyInstalled)?;
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` subscriber. `RUST_LOG` wins; otherwise the
/// `tapestry*` crates log at `level` and everything else at `warn`.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder.with_timer(fmt::time::Uptime::default()).finish().try_init()
    };
}

#[cfg(feature = "tracing")]
fn default_directives(level: LevelFilter) -> String {
    let deps = level.min(DEPENDENCY_LEVEL);
    format!("{deps},{OWN_PREFIX}={level}").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    fn meta(target: &str, level: Level) -> Metadata<'_> {
        Metadata::builder().target(target).level(level).build()
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN ").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("off").unwrap(), LevelFilter::Off);
        let err = parse_level("loud").unwrap_err();
        assert!(matches!(err, LoggerError::InvalidLevel(ref s) if s == "loud"));
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn dependencies_are_held_at_warn() {
        let logger = WallLogger {
            level: LevelFilter::Debug,
            started: Instant::now(),
        };
        assert!(logger.enabled(&meta("tapestry_dispatch::dispatch", Level::Debug)));
        assert!(logger.enabled(&meta("tapestry", Level::Info)));
        assert!(!logger.enabled(&meta("tapestry_core", Level::Trace)));
        assert!(!logger.enabled(&meta("reqwest::connect", Level::Debug)));
        assert!(!logger.enabled(&meta("hyper_util::client", Level::Info)));
        assert!(logger.enabled(&meta("hyper_util::client", Level::Warn)));
    }

    #[test]
    fn quiet_level_also_quiets_dependencies() {
        let logger = WallLogger {
            level: LevelFilter::Error,
            started: Instant::now(),
        };
        assert!(!logger.enabled(&meta("reqwest", Level::Warn)));
        assert!(logger.enabled(&meta("reqwest", Level::Error)));
        assert!(!logger.enabled(&meta("tapestry_marker", Level::Warn)));
    }
}
