//! Logging setup using `tracing`.
//!
//! The library only emits events; binaries call [`LogConfig::init`] once.
//! `RUST_LOG`, when set, wins over the configured level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Level;
use crate::error::{DbError, DbResult};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `"warn"` or `"dbutil=debug"`.
    pub level: String,
    /// Single-line output instead of the default format.
    pub compact: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            compact: true,
        }
    }
}

impl LogConfig {
    /// Info level for the `debug` run level, so echoed statements show up.
    pub fn for_level(level: Level) -> Self {
        match level {
            Level::Run => Self::default(),
            Level::Debug => Self::default().with_level("info"),
        }
    }

    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Install the global subscriber. Fails if one is already set.
    pub fn init(self) -> DbResult<()> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| DbError::Config(format!("invalid log level '{}': {}", self.level, e)))?;

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = if self.compact {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
        };
        result.map_err(|e| DbError::Config(format!("logging already initialized: {}", e)))
    }
}
