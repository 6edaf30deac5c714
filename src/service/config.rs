//! Service configuration.

use crate::config::Config;

/// Service construction options.
pub struct ServiceConfig {
    /// Application configuration.
    pub app_config: Config,
    /// Application version, reported in the startup log.
    pub version: String,
}

impl ServiceConfig {
    pub fn new(app_config: Config) -> Self {
        Self {
            app_config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
