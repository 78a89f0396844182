//! Configuration type definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::common::reconnect::ReconnectConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub xmpp: XmppConfig,
    pub im: ImConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// XMPP account the bridge logs in with.
#[derive(Debug, Clone, Deserialize)]
pub struct XmppConfig {
    /// Bare address of the bridge's own account.
    pub account: String,
    pub password: String,
    /// Bare address of the single operator allowed to issue commands.
    pub control_account: String,
    #[serde(default = "default_resource")]
    pub resource: String,
}

/// Automated identity on the IM network.
#[derive(Debug, Clone, Deserialize)]
pub struct ImConfig {
    pub account: String,
    pub password: String,
    /// Name used in presence status text; defaults to the account.
    pub display_name: Option<String>,
}

/// Bridge behaviour settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Directory accepted file transfers are written to.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Backoff settings for IM-network reconnects.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

impl ReconnectSettings {
    pub fn to_reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            max_attempts: self.max_attempts,
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
        }
    }
}

impl Config {
    /// Name shown in presence status text.
    pub fn display_name(&self) -> &str {
        self.im
            .display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.im.account)
    }
}

fn default_resource() -> String {
    "Bridge".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("/tmp/magpie")
}

fn default_initial_delay_secs() -> u64 {
    5
}

fn default_max_delay_secs() -> u64 {
    300
}

fn default_max_attempts() -> usize {
    10
}

fn default_attempt_timeout_secs() -> u64 {
    120
}
