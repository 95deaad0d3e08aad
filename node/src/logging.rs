//! # Structured Logging
//!
//! The node logs every vault call it serves: `kipu_contracts` reports
//! deposits, withdrawals and rejections, `kipu_node` reports RPC traffic and
//! event fan-out, and `tower_http` traces raw requests. [`DEFAULT_FILTER`]
//! keeps the ledger at `info` and request tracing at `debug`.
//!
//! `RUST_LOG` replaces the default when it holds a valid filter. An invalid
//! one is reported once logging is up and the default is used instead.
//!
//! All log output goes to stderr; stdout is left for `version` output.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset, empty or unparsable.
pub const DEFAULT_FILTER: &str =
    "kipu_node=info,kipu_contracts=info,kipu_protocol=warn,tower_http=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored output.
    Pretty,
    /// One JSON object per line, with vault fields as keys.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" (case-insensitive); anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(format: LogFormat) -> Result<(), TryInitError> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (filter, rejected) = resolve_filter(from_env.as_deref());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()?,
    }

    if let Some(err) = rejected {
        tracing::warn!(error = %err, default = DEFAULT_FILTER, "ignoring invalid RUST_LOG");
    }
    tracing::info!(format = ?format, "logging initialized");
    Ok(())
}

/// Picks the filter for `from_env`, the raw `RUST_LOG` value. Returns the
/// parse error alongside the default when the value is rejected.
fn resolve_filter(from_env: Option<&str>) -> (EnvFilter, Option<ParseError>) {
    match from_env.filter(|directives| !directives.trim().is_empty()) {
        None => (EnvFilter::new(DEFAULT_FILTER), None),
        Some(directives) => match EnvFilter::try_new(directives) {
            Ok(filter) => (filter, None),
            Err(err) => (EnvFilter::new(DEFAULT_FILTER), Some(err)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn format_parsing_is_lossy() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("yaml"), LogFormat::Pretty);
    }

    #[test]
    fn default_filter_is_valid() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn unset_or_blank_env_uses_default() {
        for value in [None, Some(""), Some("   ")] {
            let (filter, rejected) = resolve_filter(value);
            assert!(rejected.is_none());
            assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        }
    }

    #[test]
    fn valid_env_replaces_default() {
        let (filter, rejected) = resolve_filter(Some("kipu_contracts=trace"));
        assert!(rejected.is_none());
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn invalid_env_falls_back_and_reports() {
        let (filter, rejected) = resolve_filter(Some("kipu_node=loudly"));
        assert!(rejected.is_some());
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
