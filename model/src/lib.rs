//! Data model for the user API.

use tracing_subscriber::EnvFilter;

pub mod backend;
pub mod context;
pub mod db;
pub mod schema;
pub mod sql;

/// Install a global logger.
///
/// Log levels are read from `RUST_LOG`, defaulting to `info`. Calling this more than once is
/// harmless; only the first call installs a logger.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
