//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Whether `address` looks like a bare XMPP address (`local@domain`).
fn is_bare_jid(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !address.contains('/')
                && !address.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // XMPP side
    if config.xmpp.account.is_empty() {
        errors.push("xmpp.account is required".to_string());
    } else if !is_bare_jid(&config.xmpp.account) {
        errors.push(format!(
            "xmpp.account '{}' is not a bare address (user@domain)",
            config.xmpp.account
        ));
    }
    if config.xmpp.password.is_empty() {
        errors.push("xmpp.password is required".to_string());
    }
    if config.xmpp.control_account.is_empty() {
        errors.push("xmpp.control_account is required".to_string());
    } else if !is_bare_jid(&config.xmpp.control_account) {
        errors.push(format!(
            "xmpp.control_account '{}' is not a bare address (user@domain)",
            config.xmpp.control_account
        ));
    }
    if config.xmpp.resource.is_empty() {
        errors.push("xmpp.resource must not be empty".to_string());
    }

    // IM side
    if config.im.account.is_empty() {
        errors.push("im.account is required".to_string());
    }
    if config.im.password.is_empty() {
        errors.push("im.password is required".to_string());
    }

    // Bridge
    if config.bridge.staging_dir.as_os_str().is_empty() {
        errors.push("bridge.staging_dir must not be empty".to_string());
    }
    let reconnect = &config.bridge.reconnect;
    if reconnect.initial_delay_secs == 0 {
        errors.push("bridge.reconnect.initial_delay_secs must be positive".to_string());
    }
    if reconnect.max_delay_secs < reconnect.initial_delay_secs {
        errors.push(format!(
            "bridge.reconnect.max_delay_secs ({}) is below initial_delay_secs ({})",
            reconnect.max_delay_secs, reconnect.initial_delay_secs
        ));
    }
    if reconnect.max_attempts == 0 {
        errors.push("bridge.reconnect.max_attempts must be at least 1".to_string());
    }
    if reconnect.attempt_timeout_secs == 0 {
        errors.push("bridge.reconnect.attempt_timeout_secs must be positive".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn make_valid_config() -> Config {
        Config {
            xmpp: XmppConfig {
                account: "bridge@example.org".to_string(),
                password: "secret".to_string(),
                control_account: "me@example.org".to_string(),
                resource: "Bridge".to_string(),
            },
            im: ImConfig {
                account: "123456".to_string(),
                password: "hunter2".to_string(),
                display_name: Some("Magpie".to_string()),
            },
            bridge: BridgeConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&make_valid_config()).is_ok());
    }

    #[test]
    fn test_control_account_with_resource_fails() {
        let mut config = make_valid_config();
        config.xmpp.control_account = "me@example.org/phone".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("control_account"));
    }

    #[test]
    fn test_all_errors_are_reported_together() {
        let mut config = make_valid_config();
        config.xmpp.password = String::new();
        config.im.account = String::new();

        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("xmpp.password"));
        assert!(message.contains("im.account"));
    }

    #[test]
    fn test_inverted_reconnect_delays_fail() {
        let mut config = make_valid_config();
        config.bridge.reconnect.initial_delay_secs = 60;
        config.bridge.reconnect.max_delay_secs = 5;

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("max_delay_secs"));
    }

    #[test]
    fn test_zero_attempts_fail() {
        let mut config = make_valid_config();
        config.bridge.reconnect.max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_attempt_timeout_fails() {
        let mut config = make_valid_config();
        config.bridge.reconnect.attempt_timeout_secs = 0;

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("attempt_timeout_secs"));
    }

    #[test]
    fn test_is_bare_jid() {
        assert!(is_bare_jid("a@b.c"));
        assert!(!is_bare_jid("a@b.c/res"));
        assert!(!is_bare_jid("@b.c"));
        assert!(!is_bare_jid("a@"));
        assert!(!is_bare_jid("plain"));
    }
}
