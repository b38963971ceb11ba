//! Structured logging setup for cdk-works
//!
//! Logs always go to stderr so that a template synthesized to stdout can be
//! piped straight into another tool. Output is human-readable by default and
//! JSON when `CDK_WORKS_LOG_JSON=true`, which suits CI log collectors.
//!
//! # Example
//!
//! ```no_run
//! use cdk_works::util::logging;
//! use tracing::{info, warn};
//!
//! logging::init_from_env();
//!
//! info!(stack = "CdkWorksStack", "Synthesis started");
//! warn!(peer = "0.0.0.0/0", "Database port is reachable from any IPv4 address");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

pub const ENV_LOG_LEVEL: &str = "CDK_WORKS_LOG_LEVEL";
pub const ENV_LOG_JSON: &str = "CDK_WORKS_LOG_JSON";

/// Configuration for logging initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Minimum level for events emitted by this crate
    pub level: Level,

    /// Emit one JSON object per event instead of formatted text
    pub use_json: bool,

    /// Include the module target (e.g. `cdk_works::infra::network`)
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    /// INFO level, text output, targets shown, no location or thread ids
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// # Example
    ///
    /// ```
    /// use cdk_works::util::LoggingConfig;
    /// use tracing::Level;
    ///
    /// let config = LoggingConfig::with_level(Level::DEBUG);
    /// assert!(!config.use_json);
    /// ```
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with location and thread metadata, for CI pipelines
    pub fn ci() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    /// Reads `CDK_WORKS_LOG_LEVEL` and `CDK_WORKS_LOG_JSON`, falling back to
    /// the defaults for anything unset or unparsable
    pub fn from_env() -> Self {
        let level = env::var(ENV_LOG_LEVEL)
            .map(|v| parse_level(&v))
            .unwrap_or(Level::INFO);

        let use_json = env::var(ENV_LOG_JSON)
            .ok()
            .and_then(|v| v.trim().to_lowercase().parse::<bool>().ok())
            .unwrap_or(false);

        Self {
            level,
            use_json,
            ..Default::default()
        }
    }
}

/// Parses a log level (case-insensitive), defaulting to INFO
///
/// ```
/// use cdk_works::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("invalid"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Installs the global subscriber. Only the first call has any effect.
///
/// `RUST_LOG` directives are honoured; the crate's own level comes from
/// `config.level` and every other target stays at `warn` unless `RUST_LOG`
/// says otherwise.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = format!("cdk_works={}", config.level).parse() {
            filter = filter.add_directive(directive);
        }
        if env::var("RUST_LOG").is_err() {
            if let Ok(directive) = "warn".parse() {
                filter = filter.add_directive(directive);
            }
        }

        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_thread_names(config.include_thread_ids);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        } else {
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

pub fn init_from_env() {
    init_logging(LoggingConfig::from_env());
}
