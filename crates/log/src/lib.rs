//! # Cistern Log
//!
//! Installs a `tracing-subscriber` stack (`EnvFilter` plus a compact, pretty
//! or JSON formatter) configured from code or from the environment:
//!
//! - `CISTERN_LOG` (falls back to `RUST_LOG`): filter directive
//! - `CISTERN_LOG_FORMAT`: `compact`, `pretty` or `json`
//! - `NO_COLOR`: disables ANSI colors
//!
//! ```no_run
//! let _guard = cistern_log::auto_init()?;
//! cistern_log::info!("pool ready");
//! # Ok::<(), cistern_log::LogError>(())
//! ```

pub mod builder;
pub mod config;
pub mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};

// Re-export tracing macros so callers need a single dependency
pub use tracing::{debug, error, info, trace, warn};

/// Initialize the global logger with `config`
///
/// Keep the returned guard alive for the lifetime of the program.
pub fn init(config: &Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config.clone()).build()
}

/// Initialize the global logger from environment variables
pub fn auto_init() -> LogResult<LoggerGuard> {
    init(&Config::from_env())
}
