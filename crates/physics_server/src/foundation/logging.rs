//! Logging utilities
//!
//! The library only ever talks to the `log` facade; binaries pick the backend.

pub use log::{debug, error, info, trace, warn};

/// Initialize `env_logger` as the logging backend, honouring `RUST_LOG`
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

/// Initialize logging for tests; repeated calls are harmless
#[cfg(test)]
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
