//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Hold the process-wide log level (default INFO)
//! - Configure log level at runtime
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging; categories are targets
//!   (`core`, `backend`, `strategy`, `net`, `pool`, `config`)
//! - Lines carry timestamp, level, category, and source file:line
//! - Events about OS failures carry `errno` and the error text as fields

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt as tfmt, reload, EnvFilter, Registry};

/// Log severity, lowest first.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug = 0,
    #[default]
    Info = 1,
    #[serde(alias = "warning")]
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    /// Upper-case tag.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Closest level to a filter ceiling. `OFF` maps to `Error`.
    fn from_filter(filter: LevelFilter) -> Self {
        if filter >= LevelFilter::DEBUG {
            LogLevel::Debug
        } else if filter >= LevelFilter::INFO {
            LogLevel::Info
        } else if filter >= LevelFilter::WARN {
            LogLevel::Warn
        } else {
            LogLevel::Error
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            0 => LogLevel::Debug,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown log level `{0}`")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Errors from logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),

    #[error("failed to change log level: {0}")]
    Reload(#[from] reload::Error),
}

static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global subscriber writing to stderr.
///
/// `RUST_LOG`, when set, takes precedence over `level`; [`level()`] then
/// reports the most verbose level the env filter enables.
pub fn init(level: LogLevel) -> Result<(), LoggingError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (filter, level) = initial_filter(env.as_deref(), level);
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tfmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()?;

    LEVEL.store(level as u8, Ordering::Relaxed);
    let _ = FILTER.set(handle);
    Ok(())
}

/// Filter to start with and the level it amounts to.
fn initial_filter(env: Option<&str>, level: LogLevel) -> (EnvFilter, LogLevel) {
    let from_env = env
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok());

    match from_env {
        Some(filter) => {
            let effective = filter.max_level_hint().map_or(level, LogLevel::from_filter);
            (filter, effective)
        }
        None => (EnvFilter::new(level.directive()), level),
    }
}

/// Change the process-wide log level.
pub fn set_level(level: LogLevel) -> Result<(), LoggingError> {
    if let Some(handle) = FILTER.get() {
        handle.reload(EnvFilter::new(level.directive()))?;
    }
    LEVEL.store(level as u8, Ordering::Relaxed);
    tracing::debug!(target: "core", level = %level, "Log level changed");
    Ok(())
}

/// Current process-wide log level.
pub fn level() -> LogLevel {
    LogLevel::from_u8(LEVEL.load(Ordering::Relaxed))
}
