//! Subscriber setup for the container's diagnostics
//!
//! The container emits `tracing` events under the `lattice_di` target:
//! registrations and constructions at DEBUG, cache hits at TRACE. This module
//! installs a `tracing-subscriber` formatter for applications that have not
//! set one up themselves.
//!
//! # Features
//!
//! - `logging` - Emit events (default)
//! - `logging-json` - JSON output, one object per line
//! - `logging-pretty` - Multi-line human readable output
//!
//! Without either subscriber feature the initializers do nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_di::logging::{self, LogFormat};
//!
//! logging::builder()
//!     .verbose()
//!     .container_only()
//!     .format(LogFormat::Compact)
//!     .source_location()
//!     .init();
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured level and target filter
//! unless [`LogBuilder::ignore_env`] was called.

use tracing::Level;

/// Target every container event is emitted under
pub const TARGET: &str = "lattice_di";

/// Output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line, colored
    Pretty,
    /// Single line per event
    Compact,
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
#[cfg_attr(
    not(any(feature = "logging-json", feature = "logging-pretty")),
    allow(dead_code)
)]
pub struct LogBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    source_location: bool,
    thread_info: bool,
    use_env: bool,
}

impl Default for LogBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: if cfg!(feature = "logging-json") {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            target: None,
            source_location: false,
            thread_info: false,
            use_env: true,
        }
    }
}

impl LogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum level shown
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Show everything, including per-resolve cache hits
    pub fn verbose(self) -> Self {
        self.level(Level::TRACE)
    }

    /// Only warnings and errors
    pub fn quiet(self) -> Self {
        self.level(Level::WARN)
    }

    /// Only events from `target`
    pub fn target(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only events from the container itself
    pub fn container_only(self) -> Self {
        self.target(TARGET)
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn json(self) -> Self {
        self.format(LogFormat::Json)
    }

    pub fn pretty(self) -> Self {
        self.format(LogFormat::Pretty)
    }

    pub fn compact(self) -> Self {
        self.format(LogFormat::Compact)
    }

    /// Include file and line of each event
    pub fn source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    /// Include thread id and name of each event
    pub fn thread_info(mut self) -> Self {
        self.thread_info = true;
        self
    }

    /// Use the configured filter even when `RUST_LOG` is set
    pub fn ignore_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Filter directive built from level and target
    #[cfg_attr(
        not(any(feature = "logging-json", feature = "logging-pretty")),
        allow(dead_code)
    )]
    fn directive(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        match self.target {
            Some(target) => format!("{}={}", target, level),
            None => level,
        }
    }

    /// Install the subscriber globally.
    ///
    /// Fails if a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

        let filter = self
            .use_env
            .then(|| EnvFilter::try_from_default_env().ok())
            .flatten()
            .unwrap_or_else(|| EnvFilter::new(self.directive()));

        let base = fmt::layer()
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_thread_ids(self.thread_info)
            .with_thread_names(self.thread_info)
            .with_target(true);

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => base.json().boxed(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => base.boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
    }

    /// Install the subscriber globally, keeping any subscriber already set.
    pub fn init(self) {
        #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
        {
            let _ = self.try_init();
        }
    }
}

/// Start a subscriber configuration
pub fn builder() -> LogBuilder {
    LogBuilder::new()
}

/// Install the default subscriber: JSON with `logging-json`, otherwise pretty.
pub fn init() {
    builder().init();
}

/// Install a JSON subscriber at DEBUG
pub fn init_json() {
    builder().json().init();
}

/// Install a pretty subscriber at DEBUG
pub fn init_pretty() {
    builder().pretty().init();
}

/// Install a subscriber showing only container events
pub fn init_container_only() {
    builder().container_only().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LogBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert!(builder.target.is_none());
        assert!(builder.use_env);
        assert_eq!(builder.directive(), "debug");
    }

    #[test]
    fn test_builder_chain() {
        let builder = builder()
            .verbose()
            .compact()
            .source_location()
            .container_only()
            .ignore_env();

        assert_eq!(builder.level, Level::TRACE);
        assert_eq!(builder.format, LogFormat::Compact);
        assert!(builder.source_location);
        assert!(!builder.use_env);
        assert_eq!(builder.directive(), "lattice_di=trace");
    }

    #[test]
    fn test_quiet_target() {
        let builder = LogBuilder::new().quiet().target("app");
        assert_eq!(builder.directive(), "app=warn");
    }
}
