//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize the logging system with a default filter
///
/// `level` uses the `env_logger` filter syntax (`"info"`, `"chrome_engine=trace"`).
/// A `RUST_LOG` variable in the environment takes precedence. Calling this more
/// than once is harmless; only the first call installs the logger.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
