//! Bridge orchestrator tying the XMPP control channel to the IM network.
//!
//! Every inbound event is handled synchronously to completion by [`Bridge`].
//! Operator text is either the answer to the active prompt or a command;
//! IM-network events are rendered for the operator, turned into prompts, or
//! drive the reconnect policy.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bridge::channels::{BridgeOutputs, ControlHandle, ImHandle};
use crate::bridge::commands::{build_dispatcher, CommandDispatcher};
use crate::bridge::files::FileStore;
use crate::bridge::formatter;
use crate::bridge::interactive::Prompt;
use crate::bridge::prompt::{PromptQueue, Retired};
use crate::bridge::registry::IdentityRegistry;
use crate::common::reconnect::{ReconnectDecision, ReconnectState};
use crate::common::{
    BridgeError, BridgeResult, CompactId, Contacts, EntityKind, EntityRef, ImAction, ImEvent,
    NativeId, RequestKind, TransferId, XmppAction, XmppEvent,
};
use crate::config::Config;

/// Poll result codes after which the session must be re-established.
const RECONNECT_CODES: &[i64] = &[100006];
/// Poll result codes after which the bridge gives up.
const TERMINAL_CODES: &[i64] = &[103, 100002];

/// Why the bridge stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    XmppDisconnected,
    /// The IM network returned a code that ends the session for good.
    Terminal(i64),
    ReconnectExhausted,
    Shutdown,
    ChannelsClosed,
}

/// State the operator commands work on.
pub struct Session {
    control: ControlHandle,
    im: ImHandle,
    registry: IdentityRegistry,
    contacts: Contacts,
    help_text: String,
}

impl Session {
    pub fn new(control: ControlHandle, im: ImHandle) -> Self {
        Self {
            control,
            im,
            registry: IdentityRegistry::new(),
            contacts: Contacts::default(),
            help_text: String::new(),
        }
    }

    /// Send text to the operator as is.
    pub fn reply(&self, text: impl Into<String>) {
        self.control.send_text(text);
    }

    /// Send a bridge notice (`[S]` tagged) to the operator.
    pub fn notify(&self, text: &str) {
        self.control.send_text(formatter::system(text));
    }

    pub fn help_text(&self) -> &str {
        &self.help_text
    }

    #[cfg(test)]
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Run `f` against the latest contact snapshot, letting it issue compact ids.
    pub fn with_contacts<T>(&mut self, f: impl FnOnce(&Contacts, &mut IdentityRegistry) -> T) -> T {
        f(&self.contacts, &mut self.registry)
    }

    fn lookup(&self, raw_id: &str) -> BridgeResult<(CompactId, EntityRef)> {
        let id: CompactId = raw_id
            .parse()
            .map_err(|_| BridgeError::UnknownId(raw_id.trim().to_string()))?;
        let entity = self
            .registry
            .resolve(id)
            .ok_or_else(|| BridgeError::UnknownId(id.to_string()))?;
        Ok((id, entity.clone()))
    }

    /// Send `content` to whatever compact id `raw_id` stands for.
    pub fn send_to(&mut self, raw_id: &str, content: &str) -> BridgeResult<()> {
        let (id, entity) = self.lookup(raw_id)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(BridgeError::EmptyContent(id));
        }

        let to = entity.native_id;
        let content = content.to_string();
        debug!(%id, kind = entity.kind.name(), native_id = %to, "Sending to IM network");

        let action = match entity.kind {
            EntityKind::Friend => ImAction::SendFriend { to, content },
            EntityKind::Group => ImAction::SendGroup { to, content },
            EntityKind::Discussion => ImAction::SendDiscussion { to, content },
            EntityKind::TempSession => ImAction::SendSession { to, content },
        };
        self.im.send(action)
    }

    /// Ask the IM network for the account number behind a friend or group.
    pub fn query_account(&mut self, raw_id: &str) -> BridgeResult<()> {
        let (id, entity) = self.lookup(raw_id)?;
        let kind = entity.kind;
        match kind {
            EntityKind::Friend | EntityKind::Group => self.im.send(ImAction::QueryAccount { entity }),
            kind => Err(BridgeError::WrongKind {
                id,
                kind,
                expected: "not a friend or group",
            }),
        }
    }
}

#[derive(Debug)]
struct Transfer {
    file_name: String,
    accepted: bool,
}

/// The bridge between the control account and the IM-network identity.
pub struct Bridge {
    session: Session,
    commands: CommandDispatcher<Session>,
    prompts: PromptQueue<Prompt>,
    files: FileStore,
    reconnect: ReconnectState,
    display_name: String,
    transfers: HashMap<TransferId, Transfer>,
    pending_reconnect: Option<Duration>,
    pending_attempt_timeout: Option<Duration>,
    stopped: Option<StopReason>,
}

impl Bridge {
    /// Create a bridge writing to the given output channels.
    pub fn new(config: &Config, outputs: BridgeOutputs) -> BridgeResult<Self> {
        let control = ControlHandle::new(outputs.xmpp_tx, config.xmpp.control_account.clone());
        let im = ImHandle::new(outputs.im_tx);

        let commands = build_dispatcher()?;
        let mut session = Session::new(control.clone(), im);
        session.help_text = commands.help_text();

        Ok(Self {
            session,
            commands,
            prompts: PromptQueue::new(control.sender()),
            files: FileStore::new(config.bridge.staging_dir.clone()),
            reconnect: ReconnectState::new(config.bridge.reconnect.to_reconnect_config()),
            display_name: config.display_name().to_string(),
            transfers: HashMap::new(),
            pending_reconnect: None,
            pending_attempt_timeout: None,
            stopped: None,
        })
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Set once the bridge should stop running.
    pub fn stopped(&self) -> Option<StopReason> {
        self.stopped
    }

    fn stop(&mut self, reason: StopReason) {
        if self.stopped.is_none() {
            info!(?reason, "Bridge stopping");
            self.stopped = Some(reason);
        }
    }

    /// Stop on request (signal). Outstanding prompts are dropped.
    pub fn shutdown(&mut self) {
        let dropped = self.prompts.clear();
        if dropped > 0 {
            debug!(dropped, "Dropped pending prompts on shutdown");
        }
        self.stop(StopReason::Shutdown);
    }

    pub(crate) fn channels_closed(&mut self) {
        self.stop(StopReason::ChannelsClosed);
    }

    /// Handle an event from the XMPP stack.
    pub fn handle_xmpp_event(&mut self, event: XmppEvent) {
        match event {
            XmppEvent::Ready => {
                info!("XMPP session ready, connecting to the IM network");
                self.send_im(ImAction::Connect);
            }
            XmppEvent::Message { from, body } => {
                if bare_address(&from) != self.session.control.control_account() {
                    info!(from = %from, "Ignoring message from non-control sender");
                    return;
                }
                self.handle_control_message(body.as_deref().unwrap_or(""));
            }
            XmppEvent::Subscribe { from } | XmppEvent::Subscribed { from } => {
                let to = bare_address(&from).to_string();
                info!(from = %to, "Accepting and returning subscription");
                self.session
                    .control
                    .send(XmppAction::Subscribed { to: to.clone() });
                self.session.control.send(XmppAction::Subscribe { to });
            }
            XmppEvent::Unsubscribe { from } => {
                let to = bare_address(&from).to_string();
                info!(from = %to, "Acknowledging and returning unsubscription");
                self.session
                    .control
                    .send(XmppAction::Unsubscribed { to: to.clone() });
                self.session.control.send(XmppAction::Unsubscribe { to });
            }
            XmppEvent::Unsubscribed { from } => {
                info!(from = %from, "Unsubscribed");
            }
            XmppEvent::PresenceAvailable { from } => {
                debug!(from = %from, "Presence available");
            }
            XmppEvent::PresenceUnavailable { from } => {
                debug!(from = %from, "Presence unavailable");
            }
            XmppEvent::Disconnected => {
                warn!("XMPP stream disconnected");
                self.prompts.clear();
                self.stop(StopReason::XmppDisconnected);
            }
        }
    }

    /// Handle a chat message from the control account.
    pub fn handle_control_message(&mut self, text: &str) {
        info!("Control -> {}", text);

        if self.prompts.needs_input() {
            if text.trim().is_empty() {
                self.prompts.send_tip();
                return;
            }
            if let Some(action) = self.prompts.input(text) {
                self.prompt_action(action);
            }
            return;
        }

        let text = text.trim();
        if text.is_empty() {
            return;
        }

        match self.commands.parse(&mut self.session, text) {
            Ok(true) => {}
            Ok(false) => self
                .session
                .notify("Unknown command, send -help for the command list"),
            Err(e) => {
                warn!(command = text, "Command failed: {}", e);
                self.session.notify(&e.to_string());
            }
        }
    }

    fn prompt_action(&mut self, action: ImAction) {
        match &action {
            ImAction::AcceptFile { transfer } => {
                if let Some(state) = self.transfers.get_mut(transfer) {
                    state.accepted = true;
                }
            }
            ImAction::RejectFile { transfer } => {
                self.transfers.remove(transfer);
            }
            _ => {}
        }
        self.send_im(action);
    }

    fn send_im(&mut self, action: ImAction) {
        if let Err(e) = self.session.im.send(action) {
            error!("{}", e);
            self.session.notify(&e.to_string());
        }
    }

    /// Handle an event from the IM-network client.
    pub fn handle_im_event(&mut self, event: ImEvent) {
        match event {
            ImEvent::LoggedIn => {
                info!("IM login succeeded");
                self.reconnect.reset();
                self.pending_reconnect = None;
                self.pending_attempt_timeout = None;
                self.session
                    .control
                    .set_status(format!("{}[online]", self.display_name));
                self.session.notify("IM login succeeded");
            }
            ImEvent::GroupMessage {
                group,
                group_name,
                member,
                member_nick,
                content,
            } => {
                let session = &mut self.session;
                let group_id = session.registry.get_or_create(&group, EntityKind::Group);
                let member_id = session.registry.get_or_create(&member, EntityKind::TempSession);
                let name = group_name
                    .or_else(|| session.contacts.group_name(&group).map(str::to_string))
                    .unwrap_or_else(|| group.to_string());
                session.reply(formatter::group_message(
                    &name,
                    group_id,
                    &member_nick,
                    member_id,
                    &content,
                ));
            }
            ImEvent::DiscussionMessage {
                discussion,
                discussion_name,
                member,
                member_nick,
                content,
            } => {
                let session = &mut self.session;
                let id = session
                    .registry
                    .get_or_create(&discussion, EntityKind::Discussion);
                let member_id = session.registry.get_or_create(&member, EntityKind::TempSession);
                let name = discussion_name
                    .or_else(|| {
                        session
                            .contacts
                            .discussion_name(&discussion)
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| discussion.to_string());
                session.reply(formatter::discussion_message(
                    &name,
                    id,
                    &member_nick,
                    member_id,
                    &content,
                ));
            }
            ImEvent::BuddyMessage { from, content } => {
                let (id, name) = self.friend_identity(&from);
                self.session
                    .reply(formatter::buddy_message(&name, id, &content));
            }
            ImEvent::SessionMessage {
                group,
                group_name,
                member,
                member_nick,
                content,
            } => {
                let session = &mut self.session;
                let group_id = session.registry.get_or_create(&group, EntityKind::Group);
                let member_id = session.registry.get_or_create(&member, EntityKind::TempSession);
                let name = group_name
                    .or_else(|| session.contacts.group_name(&group).map(str::to_string))
                    .unwrap_or_else(|| group.to_string());
                session.reply(formatter::session_message(
                    &member_nick,
                    member_id,
                    &name,
                    group_id,
                    &content,
                ));
            }
            ImEvent::FileOffer {
                transfer,
                from,
                file_name,
            } => {
                let (sender_id, sender) = self.friend_identity(&from);
                info!(%transfer, file = %file_name, %sender_id, "File offered");
                self.transfers.insert(
                    transfer,
                    Transfer {
                        file_name: file_name.clone(),
                        accepted: false,
                    },
                );
                let prompt = Prompt::FileConsent {
                    transfer,
                    sender,
                    sender_id,
                    file_name,
                };
                self.prompts.enqueue(prompt.tip(), prompt);
            }
            ImEvent::FileCancelled { transfer } => self.file_cancelled(transfer),
            ImEvent::FileReceived {
                transfer,
                file_name,
                data,
            } => {
                self.transfers.remove(&transfer);
                match self.files.save(&file_name, &data) {
                    Ok(path) => self.session.notify(&format!(
                        "File {} saved to {}",
                        file_name,
                        path.display()
                    )),
                    Err(e) => {
                        error!(%transfer, "{}", e);
                        self.session.notify(&e.to_string());
                    }
                }
            }
            ImEvent::FriendRequest { from, account } => {
                info!(from = %from, %account, "Accepting friend request");
                self.send_im(ImAction::AcceptFriendRequest {
                    from,
                    account: account.clone(),
                });
                self.session
                    .notify(&format!("Accepted friend request from {}", account));
            }
            ImEvent::Kicked { reason } => {
                warn!(?reason, "Kicked off the IM network");
                let text = match reason {
                    Some(reason) => format!("Kicked off the IM network: {}", reason),
                    None => "Kicked off the IM network".to_string(),
                };
                self.session.notify(&text);
                self.begin_reconnect();
            }
            ImEvent::VerifyCodeRequired { image_path } => self.verify_code_required(image_path),
            ImEvent::FriendsLoaded(list) => {
                debug!(
                    friends = list.friends.len(),
                    categories = list.categories.len(),
                    "Friend list updated"
                );
                self.session.contacts.friends = list;
            }
            ImEvent::GroupsLoaded(groups) => {
                debug!(groups = groups.len(), "Group list updated");
                self.session.contacts.groups = groups;
            }
            ImEvent::DiscussionsLoaded(discussions) => {
                debug!(discussions = discussions.len(), "Discussion list updated");
                self.session.contacts.discussions = discussions;
            }
            ImEvent::AccountResolved { entity, account } => {
                let name = self.session.contacts.display_name(&entity);
                let text = match (account, entity.kind) {
                    (Some(n), EntityKind::Group) => format!("{}'s group number is {}", name, n),
                    (Some(n), _) => format!("{}'s account number is {}", name, n),
                    (None, _) => format!("Failed to get the account number of {}", name),
                };
                self.session.notify(&text);
            }
            ImEvent::RequestFailed {
                request,
                retcode,
                message,
            } => self.handle_request_failure(request, retcode, message),
        }
    }

    /// Compact id and display name for a friend-side peer.
    fn friend_identity(&mut self, native_id: &NativeId) -> (CompactId, String) {
        let session = &mut self.session;
        let id = session.registry.get_or_create(native_id, EntityKind::Friend);
        let name = session
            .contacts
            .friend(native_id)
            .map(|f| f.show_name().to_string())
            .unwrap_or_else(|| native_id.to_string());
        (id, name)
    }

    fn verify_code_required(&mut self, image_path: PathBuf) {
        info!(path = %image_path.display(), "Verification code required");
        let prompt = Prompt::VerifyCode { image_path };
        self.prompts.enqueue(prompt.tip(), prompt);
    }

    fn file_cancelled(&mut self, transfer: TransferId) {
        let state = self.transfers.remove(&transfer);
        let retired = self.prompts.cancel(
            |p| p.transfer() == Some(transfer),
            |p| p.withdrawn_notice(),
        );

        match (retired, state) {
            (Retired::Active, _) => info!(%transfer, "Active file offer withdrawn"),
            (Retired::Queued, _) => debug!(%transfer, "Queued file offer withdrawn"),
            (Retired::NotFound, Some(state)) if state.accepted => {
                self.session.notify(&format!(
                    "Transfer of {} was cancelled by the sender",
                    state.file_name
                ));
            }
            (Retired::NotFound, _) => debug!(%transfer, "Cancellation for unknown transfer"),
        }
    }

    fn handle_request_failure(
        &mut self,
        request: RequestKind,
        retcode: Option<i64>,
        message: Option<String>,
    ) {
        warn!(request = request.name(), ?retcode, ?message, "IM request failed");

        if let (RequestKind::Poll, Some(code)) = (request, retcode) {
            if RECONNECT_CODES.contains(&code) {
                self.session
                    .notify(&format!("IM session lost (code {}), reconnecting", code));
                self.begin_reconnect();
                return;
            }
            if TERMINAL_CODES.contains(&code) {
                self.session
                    .notify(&format!("IM session ended (code {}), stopping", code));
                self.prompts.clear();
                self.stop(StopReason::Terminal(code));
                return;
            }
        }

        let text = match (request, retcode) {
            (RequestKind::VerifyCheck, code) => message.unwrap_or_else(|| match code {
                Some(code) => format!("Verification check failed: {}", code),
                None => "Verification check returned no data".to_string(),
            }),
            (RequestKind::Login, None) => "IM network returned no data, retrying login".to_string(),
            (RequestKind::Login, Some(code)) => format!("IM login failed: {}", code),
            (RequestKind::FriendList, _) => "Failed to fetch the friend list".to_string(),
            (RequestKind::Send, Some(code)) => {
                format!("Failed to send message, error code: {}", code)
            }
            (kind, Some(code)) => format!("{} request failed: {}", kind.name(), code),
            (kind, None) => format!("{} request returned no data", kind.name()),
        };
        self.session.notify(&text);

        let login_failed = matches!(request, RequestKind::Login | RequestKind::VerifyCheck);
        if login_failed && self.reconnect.running() {
            let decision = self.reconnect.attempt_failed();
            self.apply_reconnect(decision);
        }
    }

    fn begin_reconnect(&mut self) {
        let decision = self.reconnect.trigger();
        self.apply_reconnect(decision);
    }

    fn apply_reconnect(&mut self, decision: ReconnectDecision) {
        match decision {
            ReconnectDecision::Scheduled { attempt, delay } => {
                info!(attempt, delay_secs = delay.as_secs_f64(), "Reconnect scheduled");
                self.session.notify(&format!(
                    "Reconnecting to the IM network (attempt {}) in {:.1}s",
                    attempt,
                    delay.as_secs_f64()
                ));
                self.session
                    .control
                    .set_status(format!("{}[reconnecting]", self.display_name));
                self.pending_reconnect = Some(delay);
            }
            ReconnectDecision::AlreadyPending => {
                debug!("Reconnect already in flight, ignoring trigger");
            }
            ReconnectDecision::Exhausted => {
                error!(attempts = self.reconnect.attempts(), "Reconnect attempts exhausted");
                self.session.notify(&format!(
                    "Reconnect failed after {} attempts, giving up",
                    self.reconnect.attempts()
                ));
                self.prompts.clear();
                self.stop(StopReason::ReconnectExhausted);
            }
        }
    }

    /// Delay of a newly scheduled reconnect, taken at most once.
    pub fn take_reconnect_delay(&mut self) -> Option<Duration> {
        self.pending_reconnect.take()
    }

    /// Time the attempt just started may take, taken at most once.
    pub fn take_attempt_timeout(&mut self) -> Option<Duration> {
        self.pending_attempt_timeout.take()
    }

    /// The reconnect delay elapsed: re-run the connect sequence.
    pub fn fire_reconnect(&mut self) {
        info!(attempt = self.reconnect.attempts(), "Reconnecting to the IM network");
        self.reconnect.fired();
        self.pending_attempt_timeout = Some(self.reconnect.attempt_timeout());
        self.send_im(ImAction::Connect);
    }

    /// The running attempt got no login result in time.
    pub fn attempt_timed_out(&mut self) {
        if !self.reconnect.running() {
            return;
        }
        warn!(attempt = self.reconnect.attempts(), "Reconnect attempt timed out");
        self.session.notify("IM login attempt timed out");
        let decision = self.reconnect.attempt_failed();
        self.apply_reconnect(decision);
    }
}

/// Strip the resource part of an XMPP address.
fn bare_address(jid: &str) -> &str {
    jid.split_once('/').map_or(jid, |(bare, _)| bare)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::channels::ChannelBundle;
    use crate::bridge::commands::{CommandArgs, CommandSpec};
    use crate::common::types::{Category, Discussion, Friend, FriendList, FriendStatus, Group};
    use crate::config::{BridgeConfig, ImConfig, ReconnectSettings, XmppConfig};
    use bytes::Bytes;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    const CONTROL: &str = "boss@example.org";

    struct Harness {
        bridge: Bridge,
        xmpp_rx: UnboundedReceiver<XmppAction>,
        im_rx: UnboundedReceiver<ImAction>,
        staging: TempDir,
    }

    fn config(staging: &TempDir, max_attempts: usize) -> Config {
        Config {
            xmpp: XmppConfig {
                account: "bridge@example.org".to_string(),
                password: "secret".to_string(),
                control_account: CONTROL.to_string(),
                resource: "Bridge".to_string(),
            },
            im: ImConfig {
                account: "10001".to_string(),
                password: "secret".to_string(),
                display_name: Some("magpie".to_string()),
            },
            bridge: BridgeConfig {
                staging_dir: staging.path().join("files"),
                reconnect: ReconnectSettings {
                    initial_delay_secs: 1,
                    max_delay_secs: 8,
                    max_attempts,
                    attempt_timeout_secs: 30,
                },
            },
        }
    }

    impl Harness {
        fn new() -> Self {
            Self::with_attempts(10)
        }

        fn with_attempts(max_attempts: usize) -> Self {
            let staging = tempfile::tempdir().unwrap();
            let bundle = ChannelBundle::new();
            let bridge = Bridge::new(&config(&staging, max_attempts), bundle.outputs).unwrap();
            Self {
                bridge,
                xmpp_rx: bundle.xmpp.action_rx,
                im_rx: bundle.im.action_rx,
                staging,
            }
        }

        fn say(&mut self, text: &str) {
            self.bridge.handle_xmpp_event(XmppEvent::Message {
                from: format!("{}/phone", CONTROL),
                body: Some(text.to_string()),
            });
        }

        fn im(&mut self, event: ImEvent) {
            self.bridge.handle_im_event(event);
        }

        fn xmpp_actions(&mut self) -> Vec<XmppAction> {
            let mut actions = Vec::new();
            while let Ok(action) = self.xmpp_rx.try_recv() {
                actions.push(action);
            }
            actions
        }

        /// Bodies sent to the control account; presence updates are skipped.
        fn texts(&mut self) -> Vec<String> {
            self.xmpp_actions()
                .into_iter()
                .filter_map(|a| match a {
                    XmppAction::Message { to, body } => {
                        assert_eq!(to, CONTROL);
                        Some(body)
                    }
                    _ => None,
                })
                .collect()
        }

        fn im_actions(&mut self) -> Vec<ImAction> {
            let mut actions = Vec::new();
            while let Ok(action) = self.im_rx.try_recv() {
                actions.push(action);
            }
            actions
        }

        fn group_message(&mut self, group: &str, member: &str, content: &str) {
            self.im(ImEvent::GroupMessage {
                group: NativeId::from(group),
                group_name: Some("Rust".to_string()),
                member: NativeId::from(member),
                member_nick: "ann".to_string(),
                content: content.to_string(),
            });
        }

        fn file_offer(&mut self, transfer: u64, file_name: &str) {
            self.im(ImEvent::FileOffer {
                transfer: TransferId(transfer),
                from: NativeId::from("F1"),
                file_name: file_name.to_string(),
            });
        }
    }

    #[test]
    fn test_group_message_assigns_ids_in_order() {
        let mut h = Harness::new();
        h.group_message("G1", "M1", "hi");

        assert_eq!(h.texts(), vec!["[Q][Rust(1)][ann(2)] hi"]);

        h.group_message("G1", "M1", "again");
        assert_eq!(h.texts(), vec!["[Q][Rust(1)][ann(2)] again"]);
        assert_eq!(h.bridge.session().registry().len(), 2);
    }

    #[test]
    fn test_message_names_fall_back_to_snapshot_then_native_id() {
        let mut h = Harness::new();
        h.im(ImEvent::GroupsLoaded(vec![Group {
            id: NativeId::from("G1"),
            name: "Snapshot".to_string(),
        }]));
        h.im(ImEvent::GroupMessage {
            group: NativeId::from("G1"),
            group_name: None,
            member: NativeId::from("M1"),
            member_nick: "ann".to_string(),
            content: "hi".to_string(),
        });
        h.im(ImEvent::DiscussionMessage {
            discussion: NativeId::from("D7"),
            discussion_name: None,
            member: NativeId::from("M1"),
            member_nick: "ann".to_string(),
            content: "yo".to_string(),
        });

        assert_eq!(
            h.texts(),
            vec!["[Q][Snapshot(1)][ann(2)] hi", "[D][D7(3)][ann(2)] yo"]
        );
    }

    #[test]
    fn test_buddy_and_session_messages() {
        let mut h = Harness::new();
        h.im(ImEvent::FriendsLoaded(FriendList {
            categories: Vec::new(),
            friends: vec![Friend {
                id: NativeId::from("F1"),
                nick: "kitty".to_string(),
                mark_name: Some("Cat".to_string()),
                category: 0,
                status: FriendStatus::Online,
            }],
        }));
        h.im(ImEvent::BuddyMessage {
            from: NativeId::from("F1"),
            content: "meow".to_string(),
        });
        h.im(ImEvent::SessionMessage {
            group: NativeId::from("G1"),
            group_name: Some("Rust".to_string()),
            member: NativeId::from("M9"),
            member_nick: "dan".to_string(),
            content: "psst".to_string(),
        });

        assert_eq!(
            h.texts(),
            vec!["[F][Cat(1)] meow", "[T][dan(3) from Rust(2)] psst"]
        );
    }

    #[test]
    fn test_send_routes_by_entity_kind() {
        let mut h = Harness::new();
        h.group_message("G1", "M1", "hi");
        h.texts();

        h.say("#1 hello");
        h.say("#2  psst\nsecond line");

        assert_eq!(
            h.im_actions(),
            vec![
                ImAction::SendGroup {
                    to: NativeId::from("G1"),
                    content: "hello".to_string()
                },
                ImAction::SendSession {
                    to: NativeId::from("M1"),
                    content: "psst\nsecond line".to_string()
                },
            ]
        );
        assert!(h.texts().is_empty());

        // Trailing digits belong to the id, never to the content.
        h.say("#12");
        h.say("#123");
        assert!(h.im_actions().is_empty());
        assert_eq!(
            h.texts(),
            vec![
                "[S] Unknown command, send -help for the command list",
                "[S] Unknown command, send -help for the command list",
            ]
        );
    }

    #[test]
    fn test_send_to_unknown_id_reports_error() {
        let mut h = Harness::new();
        h.group_message("G1", "M1", "hi");
        h.texts();

        h.say("#5 hey there");
        h.say("#12 hi");
        h.say("#12hi");

        assert_eq!(
            h.texts(),
            vec![
                "[S] No mapping for #5",
                "[S] No mapping for #12",
                "[S] No mapping for #12",
            ]
        );
        assert!(h.im_actions().is_empty());
    }

    fn broken_command(_session: &mut Session, _args: &CommandArgs) -> BridgeResult<()> {
        panic!("handler bug");
    }

    #[test]
    fn test_command_panic_is_reported_and_bridge_continues() {
        let mut h = Harness::new();
        h.bridge
            .commands
            .register(CommandSpec {
                pattern: "-broken",
                usage: None,
                help: "always fails",
                examples: &["-broken"],
                handler: broken_command,
            })
            .unwrap();

        h.say("-broken");
        h.say("#5 hi");

        assert_eq!(
            h.texts(),
            vec![
                "[S] Command '-broken' failed unexpectedly",
                "[S] No mapping for #5",
            ]
        );
    }

    #[test]
    fn test_send_blank_content_is_rejected() {
        let mut h = Harness::new();
        h.group_message("G1", "M1", "hi");

        let err = h.bridge.session.send_to("1", "   ").unwrap_err();
        assert!(matches!(err, BridgeError::EmptyContent(id) if id == CompactId::new(1)));
        assert!(h.im_actions().is_empty());
    }

    #[test]
    fn test_unknown_command_hint_and_blank_input() {
        let mut h = Harness::new();
        h.say("nonsense");
        h.say("   ");
        h.say("");

        assert_eq!(
            h.texts(),
            vec!["[S] Unknown command, send -help for the command list"]
        );
    }

    #[test]
    fn test_help_lists_commands() {
        let mut h = Harness::new();
        h.say("-help");

        let texts = h.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Commands\n"));
        assert!(texts[0].contains("#id content"));
        assert!(texts[0].contains("-qn id"));
        assert!(h.bridge.session().registry().is_empty());
    }

    #[test]
    fn test_list_commands_read_snapshots() {
        let mut h = Harness::new();
        h.im(ImEvent::FriendsLoaded(FriendList {
            categories: vec![Category {
                index: 0,
                name: "Friends".to_string(),
                sort: 0,
            }],
            friends: vec![Friend {
                id: NativeId::from("F1"),
                nick: "kitty".to_string(),
                mark_name: None,
                category: 0,
                status: FriendStatus::Away,
            }],
        }));
        h.im(ImEvent::GroupsLoaded(vec![Group {
            id: NativeId::from("G1"),
            name: "Rust".to_string(),
        }]));
        h.im(ImEvent::DiscussionsLoaded(vec![Discussion {
            id: NativeId::from("D1"),
            name: "Plans".to_string(),
        }]));

        h.say("-list");
        h.say("-glist");
        h.say("-dlist");

        assert_eq!(
            h.texts(),
            vec![
                "Online friends\n== Friends ==\n(1) kitty[away]",
                "Groups\n(2) Rust",
                "Discussions\n(3) Plans",
            ]
        );
    }

    #[test]
    fn test_query_account() {
        let mut h = Harness::new();
        h.group_message("G1", "M1", "hi");
        h.im(ImEvent::DiscussionMessage {
            discussion: NativeId::from("D1"),
            discussion_name: Some("Plans".to_string()),
            member: NativeId::from("M1"),
            member_nick: "ann".to_string(),
            content: "x".to_string(),
        });
        h.texts();

        h.say("-qn 3");
        assert_eq!(h.texts(), vec!["[S] #3 is a discussion, not a friend or group"]);
        assert!(h.im_actions().is_empty());

        h.say("-qn 1");
        let group = EntityRef::new(NativeId::from("G1"), EntityKind::Group);
        assert_eq!(
            h.im_actions(),
            vec![ImAction::QueryAccount {
                entity: group.clone()
            }]
        );

        h.im(ImEvent::GroupsLoaded(vec![Group {
            id: NativeId::from("G1"),
            name: "Rust".to_string(),
        }]));
        h.im(ImEvent::AccountResolved {
            entity: group.clone(),
            account: Some(123456),
        });
        h.im(ImEvent::AccountResolved {
            entity: group,
            account: None,
        });
        assert_eq!(
            h.texts(),
            vec![
                "[S] Rust's group number is 123456",
                "[S] Failed to get the account number of Rust",
            ]
        );
    }

    #[test]
    fn test_non_control_sender_is_ignored() {
        let mut h = Harness::new();
        h.bridge.handle_xmpp_event(XmppEvent::Message {
            from: "mallory@example.org/pc".to_string(),
            body: Some("-help".to_string()),
        });
        h.bridge.handle_xmpp_event(XmppEvent::Message {
            from: "boss@example.org.evil/pc".to_string(),
            body: Some("-help".to_string()),
        });

        assert!(h.xmpp_actions().is_empty());
    }

    #[test]
    fn test_subscription_requests() {
        let mut h = Harness::new();
        h.bridge.handle_xmpp_event(XmppEvent::Subscribe {
            from: "friend@example.org/x".to_string(),
        });
        h.bridge.handle_xmpp_event(XmppEvent::Unsubscribe {
            from: "friend@example.org".to_string(),
        });

        let to = "friend@example.org".to_string();
        assert_eq!(
            h.xmpp_actions(),
            vec![
                XmppAction::Subscribed { to: to.clone() },
                XmppAction::Subscribe { to: to.clone() },
                XmppAction::Unsubscribed { to: to.clone() },
                XmppAction::Unsubscribe { to },
            ]
        );
    }

    #[test]
    fn test_accepted_subscription_is_returned() {
        let mut h = Harness::new();
        h.bridge.handle_xmpp_event(XmppEvent::Subscribed {
            from: "friend@example.org/phone".to_string(),
        });
        h.bridge.handle_xmpp_event(XmppEvent::Unsubscribed {
            from: "friend@example.org".to_string(),
        });

        let to = "friend@example.org".to_string();
        assert_eq!(
            h.xmpp_actions(),
            vec![
                XmppAction::Subscribed { to: to.clone() },
                XmppAction::Subscribe { to },
            ]
        );
    }

    #[test]
    fn test_ready_connects_and_login_sets_status() {
        let mut h = Harness::new();
        h.bridge.handle_xmpp_event(XmppEvent::Ready);
        assert_eq!(h.im_actions(), vec![ImAction::Connect]);

        h.im(ImEvent::LoggedIn);
        assert_eq!(
            h.xmpp_actions(),
            vec![
                XmppAction::Status {
                    status: "magpie[online]".to_string()
                },
                XmppAction::Message {
                    to: CONTROL.to_string(),
                    body: "[S] IM login succeeded".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_file_offers_are_answered_in_order() {
        let mut h = Harness::new();
        h.file_offer(1, "a.txt");
        h.file_offer(2, "b.txt");

        assert_eq!(
            h.texts(),
            vec!["[F][F1(1)] wants to send you a.txt, accept? (y/n)"]
        );

        h.say("y");
        assert_eq!(
            h.texts(),
            vec![
                "[S] Receiving a.txt...",
                "[F][F1(1)] wants to send you b.txt, accept? (y/n)",
            ]
        );
        assert_eq!(
            h.im_actions(),
            vec![ImAction::AcceptFile {
                transfer: TransferId(1)
            }]
        );

        h.say("nope");
        assert_eq!(h.texts(), vec!["[S] Cancelled receiving b.txt"]);
        assert_eq!(
            h.im_actions(),
            vec![ImAction::RejectFile {
                transfer: TransferId(2)
            }]
        );

        // Back to command mode.
        h.say("-glist");
        assert_eq!(h.texts(), vec!["Groups"]);
    }

    #[test]
    fn test_blank_input_repeats_prompt() {
        let mut h = Harness::new();
        h.file_offer(1, "a.txt");
        h.texts();

        h.say("  ");
        assert_eq!(
            h.texts(),
            vec!["[F][F1(1)] wants to send you a.txt, accept? (y/n)"]
        );
        assert!(h.im_actions().is_empty());
    }

    #[test]
    fn test_commands_are_answers_while_prompt_is_active() {
        let mut h = Harness::new();
        h.file_offer(1, "a.txt");
        h.texts();

        h.say("-help");
        assert_eq!(h.texts(), vec!["[S] Cancelled receiving a.txt"]);
    }

    #[test]
    fn test_sender_cancels_active_and_queued_offers() {
        let mut h = Harness::new();
        h.file_offer(1, "a.txt");
        h.file_offer(2, "b.txt");
        h.file_offer(3, "c.txt");
        h.texts();

        h.im(ImEvent::FileCancelled {
            transfer: TransferId(2),
        });
        assert!(h.texts().is_empty());

        h.im(ImEvent::FileCancelled {
            transfer: TransferId(1),
        });
        assert_eq!(
            h.texts(),
            vec![
                "[S] F1 cancelled sending a.txt",
                "[F][F1(1)] wants to send you c.txt, accept? (y/n)",
            ]
        );
    }

    #[test]
    fn test_accepted_transfer_saved_or_cancelled() {
        let mut h = Harness::new();
        h.file_offer(1, "a.txt");
        h.file_offer(2, "b.txt");
        h.say("y");
        h.say("yes");
        h.texts();

        h.im(ImEvent::FileReceived {
            transfer: TransferId(1),
            file_name: "a.txt".to_string(),
            data: Bytes::from_static(b"contents"),
        });
        let path = h.staging.path().join("files").join("a.txt");
        assert_eq!(
            h.texts(),
            vec![format!("[S] File a.txt saved to {}", path.display())]
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"contents");

        h.im(ImEvent::FileCancelled {
            transfer: TransferId(2),
        });
        assert_eq!(
            h.texts(),
            vec!["[S] Transfer of b.txt was cancelled by the sender"]
        );
    }

    #[test]
    fn test_verify_code_prompt() {
        let mut h = Harness::new();
        h.im(ImEvent::VerifyCodeRequired {
            image_path: PathBuf::from("/tmp/verify.jpg"),
        });
        assert_eq!(
            h.texts(),
            vec!["[S] Verification code required, enter the code shown in /tmp/verify.jpg"]
        );

        h.say(" AB12 ");
        assert!(h.texts().is_empty());
        assert_eq!(
            h.im_actions(),
            vec![ImAction::SubmitVerifyCode {
                code: "AB12".to_string()
            }]
        );
    }

    #[test]
    fn test_friend_request_is_accepted() {
        let mut h = Harness::new();
        h.im(ImEvent::FriendRequest {
            from: NativeId::from("U1"),
            account: "424242".to_string(),
        });

        assert_eq!(
            h.im_actions(),
            vec![ImAction::AcceptFriendRequest {
                from: NativeId::from("U1"),
                account: "424242".to_string()
            }]
        );
        assert_eq!(h.texts(), vec!["[S] Accepted friend request from 424242"]);
    }

    #[test]
    fn test_request_failures_are_reported() {
        let mut h = Harness::new();
        let fail = |request, retcode, message: Option<&str>| ImEvent::RequestFailed {
            request,
            retcode,
            message: message.map(str::to_string),
        };

        h.im(fail(RequestKind::VerifyCheck, Some(1), Some("Account locked")));
        h.im(fail(RequestKind::Login, None, None));
        h.im(fail(RequestKind::Login, Some(4), None));
        h.im(fail(RequestKind::FriendList, Some(1), None));
        h.im(fail(RequestKind::Send, Some(1202), None));
        h.im(fail(RequestKind::Poll, Some(116), None));

        assert_eq!(
            h.texts(),
            vec![
                "[S] Account locked",
                "[S] IM network returned no data, retrying login",
                "[S] IM login failed: 4",
                "[S] Failed to fetch the friend list",
                "[S] Failed to send message, error code: 1202",
                "[S] Poll request failed: 116",
            ]
        );
        assert!(h.bridge.stopped().is_none());
        assert!(h.bridge.take_reconnect_delay().is_none());
    }

    #[test]
    fn test_reconnect_is_not_reentrant() {
        let mut h = Harness::new();
        h.im(ImEvent::RequestFailed {
            request: RequestKind::Poll,
            retcode: Some(100006),
            message: None,
        });

        let actions = h.xmpp_actions();
        assert!(actions.contains(&XmppAction::Status {
            status: "magpie[reconnecting]".to_string()
        }));
        assert!(actions.iter().any(|a| matches!(
            a,
            XmppAction::Message { body, .. } if body.contains("attempt 1")
        )));
        let delay = h.bridge.take_reconnect_delay().unwrap();
        assert!(delay >= Duration::from_secs(1));

        // A kick while the first attempt is pending starts nothing new.
        h.im(ImEvent::Kicked { reason: None });
        assert_eq!(h.texts(), vec!["[S] Kicked off the IM network"]);
        assert!(h.bridge.take_reconnect_delay().is_none());

        h.bridge.fire_reconnect();
        assert_eq!(h.im_actions(), vec![ImAction::Connect]);

        // The attempt fails: the next one is scheduled.
        h.im(ImEvent::RequestFailed {
            request: RequestKind::Login,
            retcode: Some(3),
            message: None,
        });
        let texts = h.texts();
        assert_eq!(texts[0], "[S] IM login failed: 3");
        assert!(texts[1].contains("attempt 2"));
        assert!(h.bridge.take_reconnect_delay().is_some());

        h.im(ImEvent::LoggedIn);
        h.xmpp_actions();
        h.im(ImEvent::Kicked {
            reason: Some("logged in elsewhere".to_string()),
        });
        let texts = h.texts();
        assert_eq!(texts[0], "[S] Kicked off the IM network: logged in elsewhere");
        assert!(texts[1].contains("attempt 1"));
    }

    /// Kick, wait out the delay and start attempt 1.
    fn start_first_attempt(h: &mut Harness) {
        h.im(ImEvent::Kicked { reason: None });
        assert!(h.bridge.take_reconnect_delay().is_some());
        h.bridge.fire_reconnect();
        assert_eq!(h.im_actions(), vec![ImAction::Connect]);
        h.xmpp_actions();
    }

    #[test]
    fn test_fatal_code_during_attempt_schedules_next() {
        let mut h = Harness::new();
        start_first_attempt(&mut h);

        h.im(ImEvent::RequestFailed {
            request: RequestKind::Poll,
            retcode: Some(100006),
            message: None,
        });
        let texts = h.texts();
        assert_eq!(texts[0], "[S] IM session lost (code 100006), reconnecting");
        assert!(texts[1].contains("attempt 2"));
        assert!(h.bridge.take_reconnect_delay().is_some());

        h.bridge.fire_reconnect();
        h.texts();
        h.im(ImEvent::Kicked { reason: None });
        assert!(h.texts()[1].contains("attempt 3"));
        assert!(h.bridge.take_reconnect_delay().is_some());
    }

    #[test]
    fn test_empty_login_during_attempt_schedules_next() {
        let mut h = Harness::new();
        start_first_attempt(&mut h);

        h.im(ImEvent::RequestFailed {
            request: RequestKind::Login,
            retcode: None,
            message: None,
        });
        let texts = h.texts();
        assert_eq!(texts[0], "[S] IM network returned no data, retrying login");
        assert!(texts[1].contains("attempt 2"));
        assert!(h.bridge.take_reconnect_delay().is_some());
    }

    #[test]
    fn test_attempt_without_login_result_times_out() {
        let mut h = Harness::new();
        start_first_attempt(&mut h);
        assert_eq!(h.bridge.take_attempt_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(h.bridge.take_attempt_timeout(), None);

        h.bridge.attempt_timed_out();
        let texts = h.texts();
        assert_eq!(texts[0], "[S] IM login attempt timed out");
        assert!(texts[1].contains("attempt 2"));

        // A timer left over from an attempt that already logged in does nothing.
        h.bridge.take_reconnect_delay();
        h.bridge.fire_reconnect();
        h.im(ImEvent::LoggedIn);
        h.xmpp_actions();
        h.bridge.attempt_timed_out();
        assert!(h.texts().is_empty());
        assert!(h.bridge.take_reconnect_delay().is_none());
    }

    #[test]
    fn test_reconnect_gives_up_after_max_attempts() {
        let mut h = Harness::with_attempts(1);
        h.im(ImEvent::Kicked { reason: None });
        assert!(h.bridge.take_reconnect_delay().is_some());
        h.bridge.fire_reconnect();
        h.xmpp_actions();

        h.im(ImEvent::RequestFailed {
            request: RequestKind::Login,
            retcode: Some(3),
            message: None,
        });

        assert_eq!(
            h.texts(),
            vec![
                "[S] IM login failed: 3",
                "[S] Reconnect failed after 1 attempts, giving up",
            ]
        );
        assert_eq!(h.bridge.stopped(), Some(StopReason::ReconnectExhausted));
    }

    #[test]
    fn test_terminal_poll_code_stops_bridge() {
        let mut h = Harness::new();
        h.im(ImEvent::RequestFailed {
            request: RequestKind::Poll,
            retcode: Some(103),
            message: None,
        });

        assert_eq!(h.texts(), vec!["[S] IM session ended (code 103), stopping"]);
        assert_eq!(h.bridge.stopped(), Some(StopReason::Terminal(103)));
        assert!(h.bridge.take_reconnect_delay().is_none());
    }

    #[test]
    fn test_xmpp_disconnect_drops_prompts_and_stops() {
        let mut h = Harness::new();
        h.file_offer(1, "a.txt");
        h.file_offer(2, "b.txt");
        h.texts();

        h.bridge.handle_xmpp_event(XmppEvent::Disconnected);
        assert_eq!(h.bridge.stopped(), Some(StopReason::XmppDisconnected));
        assert!(h.texts().is_empty());
    }

    #[test]
    fn test_bare_address() {
        assert_eq!(bare_address("a@b.org/res/extra"), "a@b.org");
        assert_eq!(bare_address("a@b.org"), "a@b.org");
    }
}
