//! Terminal stand-ins for the two network collaborators.
//!
//! The XMPP side reads operator lines from stdin as if they came from the
//! control account and prints whatever the bridge sends back. The IM side
//! is an offline network: it logs in immediately, has no contacts and logs
//! outbound traffic instead of delivering it.

use futures::{SinkExt, StreamExt};
use tokio::io::{stdin, stdout};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use crate::bridge::channels::{ImSideChannels, XmppSideChannels};
use crate::common::types::FriendList;
use crate::common::{ImAction, ImEvent, XmppAction, XmppEvent};

/// Longest line accepted from the terminal.
const MAX_LINE: usize = 64 * 1024;

/// Resource the console session appears under.
const CONSOLE_RESOURCE: &str = "console";

/// Text shown on the terminal for an action the bridge sent to XMPP.
pub fn render_action(action: &XmppAction) -> String {
    match action {
        XmppAction::Message { body, .. } => body.clone(),
        XmppAction::Status { status } => format!("(status) {}", status),
        XmppAction::Subscribe { to } => format!("(presence) subscribe {}", to),
        XmppAction::Subscribed { to } => format!("(presence) subscribed {}", to),
        XmppAction::Unsubscribe { to } => format!("(presence) unsubscribe {}", to),
        XmppAction::Unsubscribed { to } => format!("(presence) unsubscribed {}", to),
    }
}

/// A terminal line, as a chat message from the control account.
pub fn operator_message(control_account: &str, line: String) -> XmppEvent {
    XmppEvent::Message {
        from: format!("{}/{}", control_account, CONSOLE_RESOURCE),
        body: Some(line),
    }
}

/// Play the XMPP stack on stdin/stdout until stdin closes.
pub async fn run_xmpp_console(control_account: String, channels: XmppSideChannels) {
    let XmppSideChannels {
        event_tx,
        mut action_rx,
    } = channels;

    let mut lines = FramedRead::new(stdin(), LinesCodec::new_with_max_length(MAX_LINE));
    let mut output = FramedWrite::new(stdout(), LinesCodec::new());

    info!(control = %control_account, "Console session ready, type -help for commands");
    if event_tx.send(XmppEvent::Ready).is_err() {
        return;
    }

    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if event_tx.send(operator_message(&control_account, line)).is_err() {
                        break;
                    }
                }
                Some(Err(e)) => warn!("Failed to read console input: {}", e),
                None => {
                    info!("Console input closed");
                    let _ = event_tx.send(XmppEvent::Disconnected);
                    break;
                }
            },
            action = action_rx.recv() => match action {
                Some(action) => {
                    if let Err(e) = output.send(render_action(&action)).await {
                        warn!("Failed to write console output: {}", e);
                    }
                }
                None => break,
            },
        }
    }

    debug!("Console XMPP adapter ended");
}

/// Reply of the offline network to a bridge action, if any.
pub fn offline_reply(action: &ImAction) -> Vec<ImEvent> {
    match action {
        ImAction::Connect => vec![
            ImEvent::LoggedIn,
            ImEvent::FriendsLoaded(FriendList::default()),
            ImEvent::GroupsLoaded(Vec::new()),
            ImEvent::DiscussionsLoaded(Vec::new()),
        ],
        ImAction::QueryAccount { entity } => vec![ImEvent::AccountResolved {
            entity: entity.clone(),
            account: None,
        }],
        _ => Vec::new(),
    }
}

/// Play an IM network with no contacts until the bridge goes away.
pub async fn run_offline_im(channels: ImSideChannels) {
    let ImSideChannels {
        event_tx,
        mut action_rx,
    } = channels;

    while let Some(action) = action_rx.recv().await {
        info!(?action, "IM <- bridge");
        for event in offline_reply(&action) {
            if event_tx.send(event).is_err() {
                return;
            }
        }
    }

    debug!("Offline IM adapter ended");
}
