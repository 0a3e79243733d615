//! Structured logging initialisation.
//!
//! Two output formats are supported:
//! - [`LogFormat::Human`]: coloured, human-readable lines (development).
//! - [`LogFormat::Json`]: newline-delimited JSON (production / log aggregation).
//!
//! The filter level can be overridden at runtime via the `RUST_LOG`
//! environment variable. When `RUST_LOG` is not set, the caller-supplied
//! `level` string is used (e.g. `"info"`, `"debug,dagchain_node=trace"`).

use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ChainError;

/// Selects the output format for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(ChainError::Config(format!("unknown log format {:?}", other))),
        }
    }
}

/// Initialise the global tracing subscriber.
///
/// Returns an error if a global subscriber has already been set.
pub fn init_logging(format: LogFormat, level: &str) -> Result<(), ChainError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init(),
    };
    result.map_err(|e| ChainError::Config(format!("logging already initialised: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("pretty".parse::<LogFormat>().is_err());
    }

    #[test]
    fn second_init_fails_instead_of_panicking() {
        let _ = init_logging(LogFormat::Human, "warn");
        assert!(init_logging(LogFormat::Json, "warn").is_err());
    }
}
