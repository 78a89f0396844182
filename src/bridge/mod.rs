//! The bridge between the XMPP control account and the IM network.
//!
//! ## Module Structure
//!
//! - `channels`: Communication channel structures
//! - `registry`: Compact ids for IM-network entities
//! - `prompt`: Single-slot queue of questions for the operator
//! - `interactive`: The concrete prompts (verification code, file consent)
//! - `commands`: Operator command table
//! - `formatter`: Control-channel rendering of events and lists
//! - `files`: Staging directory for received files
//! - `orchestrator`: Event handling (`Bridge` struct)
//! - `runtime`: The event loop

pub mod channels;
pub mod commands;
pub mod files;
pub mod formatter;
pub mod interactive;
pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod runtime;

// Re-export main types for convenience
pub use channels::ChannelBundle;
pub use orchestrator::{Bridge, StopReason};
pub use runtime::run_bridge;
