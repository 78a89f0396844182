//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `MAGPIE_XMPP_ACCOUNT` - bridge XMPP account
//! - `MAGPIE_XMPP_PASSWORD` - bridge XMPP password
//! - `MAGPIE_XMPP_CONTROL` - operator (control) XMPP account
//! - `MAGPIE_IM_ACCOUNT` - IM-network account
//! - `MAGPIE_IM_PASSWORD` - IM-network password
//! - `MAGPIE_STAGING_DIR` - directory for received files

use std::env;
use std::path::PathBuf;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "MAGPIE";

fn var(name: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

/// Apply environment variable overrides to a config.
///
/// This allows credentials to be provided via environment variables
/// instead of the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Some(account) = var("XMPP_ACCOUNT") {
        config.xmpp.account = account;
    }
    if let Some(password) = var("XMPP_PASSWORD") {
        config.xmpp.password = password;
    }
    if let Some(control) = var("XMPP_CONTROL") {
        config.xmpp.control_account = control;
    }

    if let Some(account) = var("IM_ACCOUNT") {
        config.im.account = account;
    }
    if let Some(password) = var("IM_PASSWORD") {
        config.im.password = password;
    }

    if let Some(dir) = var("STAGING_DIR") {
        config.bridge.staging_dir = PathBuf::from(dir);
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `MAGPIE_CONFIG`, otherwise returns "magpie.conf".
pub fn get_config_path() -> String {
    var("CONFIG").unwrap_or_else(|| "magpie.conf".to_string())
}
