//! Common utilities and types shared across the application.

pub mod error;
pub mod messages;
pub mod reconnect;
pub mod types;

// Re-export message types from messages module
pub use messages::{ImAction, ImEvent, RequestKind, TransferId, XmppAction, XmppEvent};

pub use error::{BridgeError, BridgeResult, ConfigError};
pub use types::{CompactId, Contacts, EntityKind, EntityRef, NativeId};
