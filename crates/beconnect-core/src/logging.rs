//! Tracing subscriber bootstrap.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (for example the
/// configured `general.log_level`) is used. Returns `false` if a global
/// subscriber was already installed.
pub fn init(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let _ = init("debug");
        assert!(!init("info"));
    }
}
