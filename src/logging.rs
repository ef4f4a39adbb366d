//! Logging prelude module for convenient access to tracing macros.
//!
//! This module provides convenient re-exports of common tracing macros
//! to reduce verbosity and maintain consistency across the codebase.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("This is an info message");
//! warn!("This is a warning");
//! error!("An error occurred");
//! debug!("Debug information");
//! trace!("Detailed trace information");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// By default, logs at INFO level and above are displayed. Control the log level
/// with the `RUST_LOG` environment variable:
///
/// ```bash
/// RUST_LOG=debug cargo run
/// RUST_LOG=ori_store=trace cargo run
/// RUST_LOG=ori_store::repo=debug,ori_store::rpc=trace cargo run
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

/// Initialize tracing for `ori-serve` when it is the stdio side of a
/// spawned remote transport.
///
/// stdout is owned entirely by the RPC wire framing (§4.10) in that mode,
/// so logs MUST NOT go there — this is identical to [`init_tracing`] but
/// exists as a separate entry point so the distinction is explicit at the
/// call site rather than relying on a comment at the top of `main`.
pub fn init_tracing_for_remote_transport() {
	init_tracing();
}
