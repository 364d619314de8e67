//! Tracing initialisation for processes embedding the memory subsystem.
//!
//! Hosts call [`init_tracing`] once at startup; library code only ever emits
//! events and spans. The global subscriber can be set only once per process,
//! so repeated calls are silently ignored.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log line rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines for terminals.
    #[default]
    Text,
    /// Newline-delimited JSON for log aggregation pipelines.
    Json,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise `default_directive`
/// (e.g. `"engram_core=debug,info"`) decides verbosity.
pub fn init_tracing(format: LogFormat, default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).json())
                .try_init()
                .ok();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false))
                .try_init()
                .ok();
        }
    }
}
