//! Structured logging setup for shipyard
//!
//! Logs go to stderr so that `--format json` output on stdout stays parseable.
//! `RUST_LOG`, when set, overrides the configured level entirely.
//!
//! # Example
//!
//! ```no_run
//! use shipyard::util::{init_logging, LoggingConfig};
//! use tracing::Level;
//!
//! init_logging(LoggingConfig::with_level(Level::DEBUG));
//! tracing::info!(builder = "railpack", "Starting build");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Crates whose debug output drowns ours unless asked for
const NOISY_TARGETS: &[&str] = &["h2=warn", "hyper=warn", "hyper_util=warn", "reqwest=warn", "bollard=warn"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,

    /// JSON lines instead of human-readable output
    pub use_json: bool,

    /// Include the module target (e.g. shipyard::lifecycle)
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Resolves the level from CLI flags and the environment.
    ///
    /// Precedence: explicit `--log-level`, then `-v`/`-q`, then
    /// `SHIPYARD_LOG_LEVEL`, then INFO.
    pub fn from_flags(log_level: Option<&str>, verbose: bool, quiet: bool, json: bool) -> Self {
        let level = log_level
            .and_then(parse_level)
            .or(if verbose {
                Some(Level::DEBUG)
            } else if quiet {
                Some(Level::ERROR)
            } else {
                None
            })
            .or_else(|| {
                env::var("SHIPYARD_LOG_LEVEL")
                    .ok()
                    .and_then(|l| parse_level(&l))
            })
            .unwrap_or(Level::INFO);

        Self {
            level,
            use_json: json,
            // Targets and locations only help when debugging shipyard itself
            include_target: level >= Level::DEBUG,
            include_location: level == Level::TRACE,
        }
    }
}

/// Case-insensitive level name; `None` for anything unrecognised
pub fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let mut filter = EnvFilter::new(config.level.to_string().to_lowercase());
    for directive in NOISY_TARGETS {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs the global subscriber. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(&config);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        }
    });
}
