use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

/// Crates of this workspace, which log at the configured level.
///
/// All other crates are capped at `INFO`.
const CRATE_NAMES: &[&str] = &[
    "harvest",
    "harvest_config",
    "harvest_log",
    "harvest_metrics",
    "harvest_server",
    "harvest_statsd",
    "harvest_system",
];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///   INFO  harvest::setup: launching harvest from config folder .harvest
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-12-04T12:10:32.116Z  INFO harvest::setup: launching harvest from config folder .harvest
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-12-04T12:11:08.729716Z","level":"INFO","message":"launching harvest from config folder .harvest","target":"harvest::setup","filename":"harvest/src/setup.rs","line_number":31}
    /// ```
    Json,
}

/// The logging level parse error.
#[derive(Clone, Debug)]
pub struct LevelParseError(String);

impl fmt::Display for LevelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as level: expected one of "off", "error", "warn", "info", "debug", "trace""#,
            self.0
        )
    }
}

impl std::error::Error for LevelParseError {}

/// The verbosity of the logs emitted by the workspace crates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Disables all logging.
    Off,
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// The default level.
    #[default]
    Info,
    /// Verbose output including every scrape and write.
    Debug,
    /// All messages.
    Trace,
}

impl Level {
    /// Returns the tracing [`LevelFilter`].
    pub const fn level_filter(&self) -> LevelFilter {
        match self {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }

    /// The level applied to third-party crates: never more verbose than `INFO`.
    fn third_party(&self) -> Level {
        match self {
            Level::Off | Level::Error | Level::Warn => *self,
            Level::Info | Level::Debug | Level::Trace => Level::Info,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Off => "off",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Level {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.to_ascii_lowercase().as_str() {
            "off" => Level::Off,
            "error" => Level::Error,
            "warn" | "warning" => Level::Warn,
            "info" => Level::Info,
            "debug" => Level::Debug,
            "trace" => Level::Trace,
            _ => return Err(LevelParseError(s.into())),
        };

        Ok(level)
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for Harvest.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE` variable to `full`.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Builds the filter directives for the given level.
///
/// Workspace crates log at `level`, everything else at no more than `INFO`.
fn default_directives(level: Level) -> String {
    let mut directives = level.third_party().to_string();
    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}={level}"));
    }
    directives
}

/// Initialize the logging system.
///
/// The `RUST_LOG` environment variable takes precedence over the configured level. Calling this
/// function more than once has no effect.
///
/// # Example
///
/// ```
/// let log_config = harvest_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// harvest_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        // SAFETY: logging is initialized during startup, before the runtime spawns threads.
        unsafe { env::set_var("RUST_BACKTRACE", "full") };
    }

    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => tracing_subscriber::fmt::layer()
            .pretty()
            .without_time()
            .boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .boxed(),
        (LogFormat::Json, _) => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => EnvFilter::new(value),
        Err(_) => EnvFilter::builder().parse_lossy(default_directives(config.level)),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .try_init()
        .ok();
}
