//! Error types for the application.

use thiserror::Error;

use crate::common::types::{CompactId, EntityKind};

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    IoError { path: String, message: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Errors raised while handling operator commands and network events.
///
/// The `Display` text is what the operator sees on the control channel.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("No mapping for #{0}")]
    UnknownId(String),

    #[error("#{id} is a {}, {expected}", .kind.name())]
    WrongKind {
        id: CompactId,
        kind: EntityKind,
        expected: &'static str,
    },

    #[error("Nothing to send to #{0}")]
    EmptyContent(CompactId),

    #[error("Invalid command pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Command '{usage}' overlaps with '{other}' on input '{input}'")]
    CommandOverlap {
        usage: String,
        other: String,
        input: String,
    },

    #[error("Command '{0}' failed unexpectedly")]
    CommandPanicked(String),

    #[error("IM network client is not running")]
    ImClosed,

    #[error("Failed to save file '{path}': {source}")]
    Staging {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
