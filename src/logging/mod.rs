//! Unified logging system
//!
//! Two outputs:
//! - `tracing` for developer diagnostics (initialised by the binary)
//! - `LogEntry` values on an optional channel for the presentation layer

pub mod entry;

pub use entry::{Direction, LogEntry, LogKind, LogLevel};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Initialize internal tracing for link debug output
///
/// Call early in main() before any logging occurs.
/// Set `verbose` to true for debug-level output. `RUST_LOG` wins when set.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_file(false)
                .compact(),
        )
        .with(filter)
        .try_init();
}

/// Send a log entry without blocking
///
/// Entries are dropped when the channel is full or closed; `what` names
/// the dropped entry in the trace output.
pub fn try_log(tx: &Option<mpsc::Sender<LogEntry>>, entry: LogEntry, what: &'static str) {
    if let Some(tx) = tx {
        match tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::trace!("log channel full, dropped {}", what),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
