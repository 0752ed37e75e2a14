//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WriterConfig;

/// Install a fmt subscriber filtered by `RUST_LOG`, or by `level` when
/// `RUST_LOG` is unset.
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one is left in place.
pub fn init_tracing(level: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("polars_dataset_writer={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// [`init_tracing`] with the configured log level
pub fn init_from_config(config: &WriterConfig) -> bool {
    init_tracing(&config.log_level)
}
