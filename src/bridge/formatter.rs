//! Message formatting for display on the control channel.
//!
//! Every inbound event type gets its own bracketed tag:
//! `[Q]` group, `[D]` discussion, `[F]` friend, `[T]` temporary session,
//! `[S]` bridge/system notices.

use crate::bridge::registry::IdentityRegistry;
use crate::common::types::{
    Category, CompactId, Discussion, EntityKind, Friend, FriendList, Group,
};

/// Prefix for notices generated by the bridge itself.
pub const SYSTEM_TAG: &str = "[S]";

pub fn system(text: &str) -> String {
    format!("{} {}", SYSTEM_TAG, text)
}

pub fn group_message(
    group_name: &str,
    group_id: CompactId,
    member_nick: &str,
    member_id: CompactId,
    content: &str,
) -> String {
    format!(
        "[Q][{}({})][{}({})] {}",
        group_name, group_id, member_nick, member_id, content
    )
}

pub fn discussion_message(
    name: &str,
    id: CompactId,
    member_nick: &str,
    member_id: CompactId,
    content: &str,
) -> String {
    format!(
        "[D][{}({})][{}({})] {}",
        name, id, member_nick, member_id, content
    )
}

pub fn buddy_message(name: &str, id: CompactId, content: &str) -> String {
    format!("[F][{}({})] {}", name, id, content)
}

pub fn session_message(
    member_nick: &str,
    member_id: CompactId,
    group_name: &str,
    group_id: CompactId,
    content: &str,
) -> String {
    format!(
        "[T][{}({}) from {}({})] {}",
        member_nick, member_id, group_name, group_id, content
    )
}

pub fn file_offer(sender: &str, sender_id: CompactId, file_name: &str) -> String {
    format!(
        "[F][{}({})] wants to send you {}, accept? (y/n)",
        sender, sender_id, file_name
    )
}

/// Online/away friends grouped by category, categories in sort order.
pub fn friend_list(list: &FriendList, registry: &mut IdentityRegistry) -> String {
    let mut categories: Vec<&Category> = list.categories.iter().collect();
    categories.sort_by_key(|c| c.sort);

    let mut lines = vec!["Online friends".to_string()];
    for category in &categories {
        lines.push(format!("== {} ==", category.name));
        for friend in listed(list, |f| f.category == category.index) {
            lines.push(friend_line(friend, registry));
        }
    }

    let uncategorized: Vec<&Friend> =
        listed(list, |f| !categories.iter().any(|c| c.index == f.category)).collect();
    if !uncategorized.is_empty() {
        lines.push("== Uncategorized ==".to_string());
        for friend in uncategorized {
            lines.push(friend_line(friend, registry));
        }
    }

    lines.join("\n")
}

fn listed<'a>(
    list: &'a FriendList,
    filter: impl Fn(&Friend) -> bool + 'a,
) -> impl Iterator<Item = &'a Friend> + 'a {
    list.friends
        .iter()
        .filter(move |f| f.status.is_listed() && filter(f))
}

fn friend_line(friend: &Friend, registry: &mut IdentityRegistry) -> String {
    let id = registry.get_or_create(&friend.id, EntityKind::Friend);
    let name = match friend.mark_name.as_deref().filter(|m| !m.is_empty()) {
        Some(mark) => format!("{}({})", mark, friend.nick),
        None => friend.nick.clone(),
    };
    format!("({}) {}[{}]", id, name, friend.status.as_str())
}

pub fn group_list(groups: &[Group], registry: &mut IdentityRegistry) -> String {
    let mut lines = vec!["Groups".to_string()];
    for group in groups {
        let id = registry.get_or_create(&group.id, EntityKind::Group);
        lines.push(format!("({}) {}", id, group.name));
    }
    lines.join("\n")
}

pub fn discussion_list(discussions: &[Discussion], registry: &mut IdentityRegistry) -> String {
    let mut lines = vec!["Discussions".to_string()];
    for discussion in discussions {
        let id = registry.get_or_create(&discussion.id, EntityKind::Discussion);
        lines.push(format!("({}) {}", id, discussion.name));
    }
    lines.join("\n")
}
