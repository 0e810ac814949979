//! Subscriber construction from the `[logging]` config section.

use std::str::FromStr;

use jig_config::LoggingSection;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter, TestWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// How each event is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line with colors.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON.
    Json,
    /// The `tracing-subscriber` default layout.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::ConfigError(format!("unknown log format: {other}"))),
        }
    }
}

/// Where events are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogSink {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
    /// The test harness's captured output.
    Test,
}

/// A subscriber description: level and directives, format, sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Base level, e.g. `info`.
    pub level: String,
    /// Extra directives such as `jig_kernel=debug`, applied after `level`.
    pub directives: Vec<String>,
    /// Event layout.
    pub format: LogFormat,
    /// Output.
    pub sink: LogSink,
    /// Prefix events with a timestamp.
    pub timestamps: bool,
    /// Emit ANSI colors.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Pretty output to stderr at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            directives: Vec::new(),
            format: LogFormat::Pretty,
            sink: LogSink::Stderr,
            timestamps: true,
            ansi: true,
        }
    }

    /// From a loaded `[logging]` section.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::ConfigError`] for an unknown format.
    pub fn from_section(section: &LoggingSection) -> TelemetryResult<Self> {
        Ok(Self {
            level: section.level.to_ascii_lowercase(),
            directives: section.directives.clone(),
            format: section.format.parse()?,
            ..Self::new("info")
        })
    }

    /// Compact, uncolored output into the test harness. `RUST_LOG` replaces
    /// the level when set.
    #[must_use]
    pub fn for_tests(level: &str) -> Self {
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_owned());
        Self {
            format: LogFormat::Compact,
            sink: LogSink::Test,
            timestamps: false,
            ansi: false,
            ..Self::new(level)
        }
    }

    /// Use `format`.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Write to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    /// Add a directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// The combined filter.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::ConfigError`] when the level or a directive does not
    /// parse.
    pub fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter =
            EnvFilter::try_new(&self.level).map_err(|e| TelemetryError::ConfigError(e.to_string()))?;
        for directive in &self.directives {
            let parsed = directive
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::ConfigError(format!("{directive}: {e}"))
                })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn layer(&self) -> BoxedLayer {
        match self.sink {
            LogSink::Stdout => self.format_layer(std::io::stdout),
            LogSink::Stderr => self.format_layer(std::io::stderr),
            LogSink::Test => self.format_layer(TestWriter::new()),
        }
    }

    fn format_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let base = fmt::layer().with_writer(writer).with_ansi(self.ansi);
        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            (LogFormat::Full, true) => base.boxed(),
            (LogFormat::Full, false) => base.without_time().boxed(),
        }
    }

    /// Install as the global subscriber.
    ///
    /// # Errors
    ///
    /// Filter errors, and [`TelemetryError::InitError`] when a global
    /// subscriber is already installed.
    pub fn init(&self) -> TelemetryResult<()> {
        let filter = self.filter()?;
        tracing_subscriber::registry()
            .with(self.layer())
            .with(filter)
            .try_init()
            .map_err(|e| TelemetryError::InitError(e.to_string()))?;
        tracing::debug!(level = %self.level, format = ?self.format, sink = ?self.sink, "logging initialized");
        Ok(())
    }
}

/// Install a subscriber described by `config`.
///
/// # Errors
///
/// See [`LogConfig::init`].
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    config.init()
}

/// Install the subscriber described by a loaded `[logging]` section.
///
/// # Errors
///
/// Unknown formats, bad directives, or an already installed subscriber.
pub fn setup_from_section(section: &LoggingSection) -> TelemetryResult<()> {
    LogConfig::from_section(section)?.init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_defaults_map_to_pretty_info_on_stderr() {
        let config = LogConfig::from_section(&LoggingSection::default()).unwrap();
        assert_eq!(config, LogConfig::new("info"));
        assert_eq!(config.sink, LogSink::Stderr);
    }

    #[test]
    fn test_section_fields_carry_over() {
        let section = LoggingSection {
            level: "DEBUG".to_owned(),
            format: "Json".to_owned(),
            directives: vec!["jig_membrane=trace".to_owned()],
        };
        let config = LogConfig::from_section(&section).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.directives, vec!["jig_membrane=trace"]);
        assert!(config.filter().is_ok());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let section = LoggingSection {
            format: "xml".to_owned(),
            ..LoggingSection::default()
        };
        assert!(matches!(
            LogConfig::from_section(&section),
            Err(TelemetryError::ConfigError(_))
        ));
    }

    #[test]
    fn test_bad_directive_names_itself() {
        let config = LogConfig::new("debug").with_directive("[invalid=syntax");
        let err = config.filter().unwrap_err();
        assert!(err.to_string().contains("[invalid=syntax"));
    }

    #[test]
    fn test_test_config_writes_to_harness() {
        let config = LogConfig::for_tests("warn");
        assert_eq!(config.sink, LogSink::Test);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.ansi);
    }
}
