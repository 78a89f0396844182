//! Shared types used across the application.

use std::fmt;
use std::str::FromStr;

/// Opaque identifier the IM network uses for a friend, group, discussion or session peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeId(String);

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for NativeId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for NativeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Kind of IM-network entity a compact id can stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Friend,
    Group,
    Discussion,
    TempSession,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Friend => "friend",
            Self::Group => "group",
            Self::Discussion => "discussion",
            Self::TempSession => "session",
        }
    }
}

/// A native entity together with its kind. Never mutated once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub native_id: NativeId,
    pub kind: EntityKind,
}

impl EntityRef {
    pub fn new(native_id: NativeId, kind: EntityKind) -> Self {
        Self { native_id, kind }
    }
}

/// Small number the operator types instead of a native id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompactId(u64);

impl CompactId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CompactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CompactId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Online state of a friend as reported by the IM network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendStatus {
    Online,
    Away,
    Busy,
    Offline,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }

    /// Whether the friend shows up in `-list`.
    pub fn is_listed(&self) -> bool {
        matches!(self, Self::Online | Self::Away)
    }
}

/// A friend category (buddy list folder).
#[derive(Debug, Clone)]
pub struct Category {
    pub index: u32,
    pub name: String,
    pub sort: u32,
}

/// A friend of the automated identity.
#[derive(Debug, Clone)]
pub struct Friend {
    pub id: NativeId,
    pub nick: String,
    /// Name the identity's owner assigned to this friend, if any.
    pub mark_name: Option<String>,
    pub category: u32,
    pub status: FriendStatus,
}

impl Friend {
    /// Display name, preferring the mark name over the nickname.
    pub fn show_name(&self) -> &str {
        self.mark_name
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.nick)
    }
}

/// A group (chat room) the identity is a member of.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: NativeId,
    pub name: String,
}

/// An ad-hoc discussion the identity takes part in.
#[derive(Debug, Clone)]
pub struct Discussion {
    pub id: NativeId,
    pub name: String,
}

/// Friend list snapshot published by the IM network.
#[derive(Debug, Clone, Default)]
pub struct FriendList {
    pub categories: Vec<Category>,
    pub friends: Vec<Friend>,
}

/// Latest contact snapshots, used for naming and listing.
#[derive(Debug, Clone, Default)]
pub struct Contacts {
    pub friends: FriendList,
    pub groups: Vec<Group>,
    pub discussions: Vec<Discussion>,
}

impl Contacts {
    pub fn friend(&self, id: &NativeId) -> Option<&Friend> {
        self.friends.friends.iter().find(|f| &f.id == id)
    }

    pub fn group_name(&self, id: &NativeId) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| &g.id == id)
            .map(|g| g.name.as_str())
    }

    pub fn discussion_name(&self, id: &NativeId) -> Option<&str> {
        self.discussions
            .iter()
            .find(|d| &d.id == id)
            .map(|d| d.name.as_str())
    }

    /// Best human-readable name for an entity, falling back to its native id.
    pub fn display_name(&self, entity: &EntityRef) -> String {
        let name = match entity.kind {
            EntityKind::Friend | EntityKind::TempSession => {
                self.friend(&entity.native_id).map(|f| f.show_name())
            }
            EntityKind::Group => self.group_name(&entity.native_id),
            EntityKind::Discussion => self.discussion_name(&entity.native_id),
        };
        name.map(str::to_string)
            .unwrap_or_else(|| entity.native_id.to_string())
    }
}
