//! Logger builder implementation

// External dependencies
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

// Internal crates
use crate::config::{Config, DisplayConfig, Format};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the logger alive
///
/// Holds the root span (when a service name is configured) for as long as
/// the guard lives.
#[derive(Debug)]
pub struct LoggerGuard {
    /// RAII guard - field must exist even if never accessed directly
    _root_span: Option<tracing::span::EnteredSpan>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Apply display options to a fmt layer writing to stderr and box it.
macro_rules! boxed_fmt_layer {
    ($layer:expr, $display:expr) => {{
        let display: &DisplayConfig = $display;
        let layer = $layer
            .with_writer(std::io::stderr)
            .with_ansi(display.colors)
            .with_target(display.target)
            .with_file(display.source)
            .with_line_number(display.source)
            .with_thread_names(display.thread_names);
        if display.time {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        }
    }};
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Validate the filter and build the formatting layer without installing it.
    fn layers(&self) -> LogResult<(EnvFilter, BoxedLayer)> {
        let filter = EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("{}: {}", &self.config.level, e)))?;

        let display = &self.config.display;
        let fmt_layer: BoxedLayer = match self.config.format {
            Format::Pretty => boxed_fmt_layer!(fmt::layer().pretty(), display),
            Format::Compact => boxed_fmt_layer!(fmt::layer().compact(), display),
            Format::Json => boxed_fmt_layer!(fmt::layer().json(), display),
        };

        Ok((filter, fmt_layer))
    }

    /// Build and initialize the logger
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let (filter, fmt_layer) = self.layers()?;

        Registry::default()
            .with(fmt_layer)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        let root_span = self.config.service.as_deref().map(|service| {
            tracing::info_span!("app", service = service).entered()
        });

        Ok(LoggerGuard {
            _root_span: root_span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected() {
        let config = Config {
            level: "cistern=[[".to_string(),
            ..Config::default()
        };
        let err = LoggerBuilder::from_config(config).layers().err().expect("invalid filter must be rejected");
        assert!(matches!(err, LogError::Filter(_)), "got {err:?}");
    }

    #[test]
    fn every_format_builds() {
        for format in [Format::Compact, Format::Pretty, Format::Json] {
            let config = Config {
                format,
                display: DisplayConfig {
                    time: false,
                    ..DisplayConfig::default()
                },
                ..Config::default()
            };
            assert!(LoggerBuilder::from_config(config).layers().is_ok());
        }
    }

    #[test]
    fn second_init_reports_already_initialized() {
        let first = LoggerBuilder::from_config(Config::default()).build();
        let second = LoggerBuilder::from_config(Config::default()).build();
        assert!(first.is_ok() || matches!(first, Err(LogError::AlreadyInitialized(_))));
        assert!(matches!(second, Err(LogError::AlreadyInitialized(_))));
    }
}
