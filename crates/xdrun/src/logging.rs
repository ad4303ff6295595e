//! Log output setup.

use tracing_subscriber::EnvFilter;

/// Installs a stderr fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"xdrun=info"`).
///
/// Returns `false` if a global subscriber was already installed; the existing
/// one is kept.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_is_idempotent() {
        let _ = super::init("xdrun=debug");
        assert!(!super::init("xdrun=debug"));
    }
}
