//! Log output for Athena callers.
//!
//! Reports go to stdout, so every log line is written to stderr.

use std::fmt;

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Shape of the lines the subscriber writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON, one object per event.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// `RUST_LOG` when it parses, `level` otherwise.
fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the process-wide subscriber.
///
/// Returns `false` when a subscriber was already installed; the existing one
/// stays in place.
pub fn init_tracing(format: LogFormat, level: Level) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        init_tracing(LogFormat::Json, Level::DEBUG);
        assert!(!init_tracing(LogFormat::Text, Level::INFO));
    }

    #[test]
    fn test_log_format_display() {
        assert_eq!(LogFormat::default().to_string(), "text");
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
