//! RDT CLI Library
//!
//! Shared functionality for the RDT command-line tools.

pub mod config;
pub mod output;
pub mod stats;

pub use config::{Config, ConfigError, Overrides, ReceiverConfig, SenderConfig, DEFAULT_PORT};
pub use output::OutputWriter;
pub use stats::{
    display_receiver_stats, display_transfer_stats, format_bytes, format_duration, format_rtt,
    format_throughput,
};

use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber
///
/// `RUST_LOG` wins when set; otherwise `debug` selects between the
/// `debug` and `info` levels.
pub fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
