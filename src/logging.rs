// Structured logging setup
//
// Installs the global tracing subscriber. The level comes from the config
// file (or RUST_LOG when set), `--verbose` forces debug, and the output
// format is one of compact, pretty or json. Logs go to stderr so command
// output on stdout stays machine-readable.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("Invalid log format: {}", other),
        }
    }
}

/// Effective log level for `config`
pub fn level(config: &LoggingConfig, verbose: bool) -> Result<Level> {
    if verbose {
        return Ok(Level::DEBUG);
    }
    config.tracing_level()
}

/// Filter with `level` as the default directive, refined by RUST_LOG
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error for an unknown level or format, or if a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = level(config, verbose)?;
    let filter = env_filter(level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match LogFormat::parse(&config.format)? {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}
