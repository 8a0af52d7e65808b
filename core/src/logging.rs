//! Logging init: structured `tracing` output on stderr.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,strapi_core=debug";

/// Install a stderr subscriber filtered by `RUST_LOG`. Does nothing when a
/// global subscriber is already installed.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
    if installed.is_ok() {
        tracing::debug!("logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_repeatable() {
        init();
        init();
        tracing::info!("still logging");
    }
}
