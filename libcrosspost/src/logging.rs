//! Logging setup for the Crosspost binaries
//!
//! All output goes to stderr so posted ids on stdout stay pipeable.
//! `CROSSPOST_LOG_FORMAT` selects text, json or pretty output and
//! `CROSSPOST_LOG_LEVEL` the default filter; an explicit `RUST_LOG`
//! still wins.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain text (no colors, for piping)
    Text,
    /// One JSON object per line
    Json,
    /// Colored multi-line output for development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

/// Install the global subscriber
///
/// # Panics
///
/// Panics if a subscriber has already been installed
pub fn init(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().flatten_event(true).init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Text => builder.with_target(false).init(),
    }
}

/// Install the global subscriber from the environment, falling back to
/// text output at info level
pub fn init_default() {
    let format = std::env::var("CROSSPOST_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);

    let level = std::env::var("CROSSPOST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    init(format, &level);
}
