//! Tracing subscriber setup for the `azctl` binary.
//!
//! Logs go to stderr so that exported configuration on stdout stays pipeable.

use crate::error::{ConfigError, Result};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, util::SubscriberInitExt};

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Per-source and per-key trace output.
    Debug,
    /// Step progress.
    #[default]
    Info,
    /// Recovered failures only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(ConfigError::Other(format!(
                "invalid log level '{}' (expected debug, info, warn or error)",
                other
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format accepted by `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Other(format!(
                "invalid log format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

/// Logging options resolved from the global flags.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Base level.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Force debug output regardless of `level`.
    pub verbose: bool,
}

impl LogConfig {
    /// The level actually used: `verbose` forces debug.
    pub fn effective_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::Debug
        } else {
            self.level
        }
    }

    /// Build the filter, honoring `RUST_LOG` if set.
    pub fn env_filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::new(self.effective_level().as_str())
    }
}

/// Install the global subscriber. A second call is a no-op.
///
/// # Errors
///
/// Returns [`ConfigError::Other`] if a different subscriber could not be
/// installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let builder = tracing_fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(config.env_filter())
        .with_target(config.verbose);

    let result = match config.format {
        LogFormat::Text => builder.compact().finish().try_init(),
        LogFormat::Json => builder.with_ansi(false).json().finish().try_init(),
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) if err.to_string().contains("already") => Ok(()),
        Err(err) => Err(ConfigError::Other(format!("failed to initialize logging: {}", err))),
    }
}
