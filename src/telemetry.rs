//! Logging setup for the binary.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "fibermirror=info,tower_http=info";

/// Installs the fmt subscriber on stderr. `RUST_LOG` overrides the default filter.
/// Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
