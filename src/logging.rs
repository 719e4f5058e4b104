//! Logging setup shared by the CLI and worker processes.
//!
//! Workers inherit the parent's environment and stderr, so both sides log
//! with the same settings into the same stream. Nothing is ever logged to
//! the worker's response channel.
//!
//! # Environment Variables
//!
//! - `GEOPROV_LOG` - Log filter (overrides RUST_LOG)
//! - `GEOPROV_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `GEOPROV_LOG_FORMAT` - Output format: pretty, compact, json
//! - `GEOPROV_LOG_FILE` - Path to log file (in addition to stderr)
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! # Example
//!
//! ```no_run
//! use geoprov::logging::{LogConfig, init};
//!
//! init(LogConfig::for_cli(1).with_env_overrides());
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// Single line per event
    #[default]
    Compact,
    /// JSON objects, one per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (default: WARN)
    pub level: Level,
    pub format: LogFormat,
    /// Extra output file, rotated daily (None = stderr only)
    pub file_path: Option<PathBuf>,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
    pub show_target: bool,
    pub show_thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::default(),
            file_path: None,
            filter: None,
            show_target: true,
            show_thread_ids: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for CLI commands: `-v` shows info, `-vv` debug, `-vvv` trace.
    pub fn for_cli(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self::default().with_level(level)
    }

    /// Preset for worker processes. Thread ids tell the dispatch thread
    /// apart from library threads in interleaved stderr output.
    pub fn for_worker() -> Self {
        Self {
            show_thread_ids: true,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Apply environment variable overrides.
    ///
    /// `GEOPROV_LOG`, `RUST_LOG` and `GEOPROV_LOG_LEVEL` only apply when no
    /// filter was set from the command line. `GEOPROV_LOG_FORMAT` and
    /// `GEOPROV_LOG_FILE` always apply.
    pub fn with_env_overrides(mut self) -> Self {
        if self.filter.is_none() {
            self.filter = std::env::var("GEOPROV_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .ok();
        }

        if self.filter.is_none()
            && let Ok(level) = std::env::var("GEOPROV_LOG_LEVEL")
        {
            self.level = parse_level(&level).unwrap_or(self.level);
        }

        if let Ok(format) = std::env::var("GEOPROV_LOG_FORMAT")
            && let Ok(format) = format.parse()
        {
            self.format = format;
        }

        if let Ok(path) = std::env::var("GEOPROV_LOG_FILE") {
            self.file_path = Some(PathBuf::from(path));
        }

        self
    }

    fn build_filter(&self) -> EnvFilter {
        let default = || EnvFilter::new(self.level.to_string().to_lowercase());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{}', using default", filter);
                default()
            }),
            None => default(),
        }
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_ansi(ansi)
            .with_writer(writer);
        match self.format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Pretty => base.boxed(),
        }
    }
}

/// Parse a log level name.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Install the global subscriber: stderr plus the optional log file.
///
/// Only the first call in a process has an effect.
pub fn init(config: LogConfig) {
    let mut layers = vec![config.layer(std::io::stderr, true)];

    if let Some(path) = &config.file_path {
        layers.push(config.layer(file_appender(path), false));
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(config.build_filter())
        .try_init();
}

fn file_appender(path: &Path) -> RollingFileAppender {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("geoprov.log");
    RollingFileAppender::new(Rotation::DAILY, dir, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_cli_verbosity() {
        assert_eq!(LogConfig::for_cli(0).level, Level::WARN);
        assert_eq!(LogConfig::for_cli(1).level, Level::INFO);
        assert_eq!(LogConfig::for_cli(2).level, Level::DEBUG);
        assert_eq!(LogConfig::for_cli(9).level, Level::TRACE);
    }

    #[test]
    fn test_worker_preset() {
        let config = LogConfig::for_worker();
        assert!(config.show_thread_ids);
        assert_eq!(config.level, Level::WARN);
    }

    #[test]
    fn test_builder() {
        let config = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_filter("geoprov=trace".into())
            .with_file(PathBuf::from("/tmp/geoprov.log"));
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("geoprov=trace"));
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/geoprov.log")));
    }
}
