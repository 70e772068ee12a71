//! # Logging
//!
//! The crate logs through `tracing`: `trace!` on operation entry, `debug!`
//! for drops and state changes, `warn!` for failures and evictions. Fields
//! are structured (`node = %id`), never interpolated into the message.
//!
//! Binaries and tests install a subscriber with [`init`].

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "edgeflow=info";

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Returns `false` when a global subscriber was already installed, so calling
/// it more than once is harmless.
pub fn init() -> bool {
  init_with_filter(DEFAULT_FILTER)
}

/// Like [`init`], with another fallback filter.
pub fn init_with_filter(default_filter: &str) -> bool {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .try_init()
    .is_ok()
}
