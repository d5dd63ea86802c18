//! Logging utilities

pub use log::{debug, error, info, trace, warn};

use crate::core::LoggingConfig;

/// Initialize the logging system
///
/// `RUST_LOG` wins over the configured level. Calling this more than once is
/// harmless; only the first call installs the logger.
pub fn init(config: &LoggingConfig) {
    let env = env_logger::Env::default().default_filter_or(config.level.as_str());
    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialised; keeping the existing one");
    }
}
