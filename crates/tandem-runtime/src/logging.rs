//! Logging setup for binaries and tests embedding the runtime
//!
//! The bridge emits events under the `tandem::adapter`, `tandem::members`,
//! `tandem::env` and `tandem::marshal` targets.

pub use tracing::{debug, info, trace, warn};

/// Install a compact `fmt` subscriber filtered by `TANDEM_LOG`, then
/// `RUST_LOG`, then a build-dependent default. A second call is a no-op.
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("TANDEM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            #[cfg(debug_assertions)]
            {
                EnvFilter::new("tandem=debug")
            }
            #[cfg(not(debug_assertions))]
            {
                EnvFilter::new("tandem=info")
            }
        });

    fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .ok(); // Ignore error if already initialized
}
