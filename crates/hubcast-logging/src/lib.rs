//! # hubcast-logging
//!
//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the global stderr subscriber
//! - [`LogFormat`] selects compact or JSON lines
//! - [`capture_logs`] records events in memory for test assertions

#![deny(unsafe_code)]

pub mod test_utils;
pub mod types;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};
pub use types::{LogFormat, ParseLogFormatError};

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber writing to stderr.
///
/// `RUST_LOG` wins over `level` when set. Call once at startup; later calls
/// are no-ops.
pub fn init_subscriber(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // set_global_default is a no-op if already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
}
