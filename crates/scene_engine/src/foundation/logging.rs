//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
///
/// Honors `RUST_LOG`. Safe to call more than once; later calls leave the
/// first logger in place.
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize logging with a default level filter such as `"info"`
///
/// `RUST_LOG` still overrides the given level when it is set.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Initialize logging for tests, capturing output per test
#[cfg(test)]
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
