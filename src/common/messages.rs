//! Canonical message types for bridge communication.
//!
//! This module defines the single source of truth for everything that
//! crosses the boundary between the bridge and its two collaborators:
//! the XMPP stack and the IM-network client. Inbound traffic is an
//! `*Event`, outbound traffic is an `*Action`.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;

use crate::common::types::{Discussion, EntityRef, FriendList, Group, NativeId};

/// Event delivered by the XMPP stack.
#[derive(Debug, Clone)]
pub enum XmppEvent {
    /// Stream is up and the roster has been received.
    Ready,
    /// Chat message. `from` is the full sender address.
    Message { from: String, body: Option<String> },
    /// Someone asked to subscribe to our presence.
    Subscribe { from: String },
    /// Someone accepted our subscription request.
    Subscribed { from: String },
    /// Someone cancelled their subscription.
    Unsubscribe { from: String },
    /// Someone acknowledged our unsubscription.
    Unsubscribed { from: String },
    PresenceAvailable { from: String },
    PresenceUnavailable { from: String },
    /// Stream closed.
    Disconnected,
}

/// Action the XMPP stack should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmppAction {
    /// Send a chat message.
    Message { to: String, body: String },
    /// Update our presence status text.
    Status { status: String },
    Subscribe { to: String },
    Subscribed { to: String },
    Unsubscribe { to: String },
    Unsubscribed { to: String },
}

/// Identifier of a file transfer on the IM network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IM-network request whose response carried an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Pre-login check that may demand a verification code.
    VerifyCheck,
    Login,
    /// Long-poll for new messages.
    Poll,
    FriendList,
    GroupList,
    DiscussionList,
    Send,
}

impl RequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::VerifyCheck => "Verification check",
            Self::Login => "Login",
            Self::Poll => "Poll",
            Self::FriendList => "Friend list",
            Self::GroupList => "Group list",
            Self::DiscussionList => "Discussion list",
            Self::Send => "Send",
        }
    }
}

/// Event delivered by the IM-network client.
#[derive(Debug, Clone)]
pub enum ImEvent {
    /// Login confirmed; the session is usable.
    LoggedIn,
    GroupMessage {
        group: NativeId,
        group_name: Option<String>,
        member: NativeId,
        member_nick: String,
        content: String,
    },
    DiscussionMessage {
        discussion: NativeId,
        discussion_name: Option<String>,
        member: NativeId,
        member_nick: String,
        content: String,
    },
    BuddyMessage { from: NativeId, content: String },
    /// Message from a non-friend reached through a shared group.
    SessionMessage {
        group: NativeId,
        group_name: Option<String>,
        member: NativeId,
        member_nick: String,
        content: String,
    },
    FileOffer {
        transfer: TransferId,
        from: NativeId,
        file_name: String,
    },
    /// Sender withdrew a file transfer.
    FileCancelled { transfer: TransferId },
    FileReceived {
        transfer: TransferId,
        file_name: String,
        data: Bytes,
    },
    /// Someone wants to befriend the identity.
    FriendRequest { from: NativeId, account: String },
    /// Session was taken over elsewhere.
    Kicked { reason: Option<String> },
    VerifyCodeRequired { image_path: PathBuf },
    FriendsLoaded(FriendList),
    GroupsLoaded(Vec<Group>),
    DiscussionsLoaded(Vec<Discussion>),
    AccountResolved {
        entity: EntityRef,
        account: Option<u64>,
    },
    /// A request came back empty (`retcode: None`) or with a non-zero result code.
    RequestFailed {
        request: RequestKind,
        retcode: Option<i64>,
        message: Option<String>,
    },
}

/// Action the IM-network client should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImAction {
    /// Run (or re-run) the login sequence.
    Connect,
    SendFriend { to: NativeId, content: String },
    SendGroup { to: NativeId, content: String },
    SendDiscussion { to: NativeId, content: String },
    SendSession { to: NativeId, content: String },
    SubmitVerifyCode { code: String },
    AcceptFile { transfer: TransferId },
    RejectFile { transfer: TransferId },
    AcceptFriendRequest { from: NativeId, account: String },
    /// Look up the public account number behind a friend or group.
    QueryAccount { entity: EntityRef },
}
