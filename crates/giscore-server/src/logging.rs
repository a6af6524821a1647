// SPDX-License-Identifier: Apache-2.0

//! Logging initialization for the Giscore server.
//!
//! Uses `tracing` with `tracing-subscriber` for structured logging to stderr.
//! Log level can be controlled via the `RUST_LOG` environment variable.
//!
//! # Examples
//!
//! ```bash
//! # Default: info for giscore, quiet dependencies
//! giscore-server
//!
//! # Debug output for troubleshooting the credential exchange
//! RUST_LOG=giscore=debug giscore-server
//! ```

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "giscore=info,octocrab=error,reqwest=error,tower_http=warn";

/// Initialize the logging subsystem.
///
/// Call once, before the server starts handling requests.
pub fn init_logging() {
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
