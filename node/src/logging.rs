//! # Structured Logging
//!
//! Sets up the `tracing` subscriber for the node. The interesting events come
//! from `veritas_core`: sessions opening, idling and being evicted, rollbacks
//! during teardown, and appended transactions with their new root. They carry
//! `session_id`, `tx_id` and `root` as fields, so the JSON format is the one
//! to feed into an aggregator; `pretty` is for a terminal.
//!
//! Output goes to stderr. `keygen` prints the public key on stdout and
//! nothing else may be mixed into it.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: node, core and HTTP traces at info.
pub const DEFAULT_FILTER: &str = "veritas_node=info,veritas_core=info,tower_http=info";

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored, with file and line of the call site.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// `log_format` from the config file or `--log-format`. Only `json`
    /// (any case) selects JSON; everything else falls back to `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Installs the global subscriber. Panics if one is already installed, so
/// `main` calls it once per subcommand before doing anything else.
///
/// `RUST_LOG` replaces `default_filter` entirely. To trace session eviction
/// and teardown while keeping the rest quiet:
///
/// ```text
/// RUST_LOG=veritas_core::session=debug,veritas_node=info
/// ```
pub fn init_logging(default_filter: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
                .init();
        }
    }

    tracing::info!(?format, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lenient() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("yaml"), LogFormat::Pretty);
    }

    #[test]
    fn default_filter_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        assert!(EnvFilter::try_new("veritas_core::session=debug,veritas_node=info").is_ok());
    }
}
