//! Tracing bootstrap for embedders, binaries, and tests.
//!
//! The engine itself only ever emits through `tracing`; installing a
//! subscriber is the embedder's choice. This helper wires the usual stack:
//! env-filtered fmt output plus span-trace capture for error reports.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the default subscriber, filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    init_with_filter(EnvFilter::from_default_env());
}

/// Install the default subscriber with an explicit filter.
pub fn init_with_filter(filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(ErrorLayer::default())
        .try_init();
}
