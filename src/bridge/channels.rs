//! Bridge channel management.
//!
//! Provides communication channel structures for the bridge, grouping the
//! channels that connect it to the XMPP stack and to the IM-network client.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::bridge::prompt::ControlSender;
use crate::common::{BridgeError, BridgeResult, ImAction, ImEvent, XmppAction, XmppEvent};

/// Channels the XMPP adapter uses.
pub struct XmppSideChannels {
    /// Sender for inbound stanzas and stream events.
    pub event_tx: mpsc::UnboundedSender<XmppEvent>,
    /// Receiver for messages and presence the bridge wants sent.
    pub action_rx: mpsc::UnboundedReceiver<XmppAction>,
}

/// Channels the IM-network adapter uses.
pub struct ImSideChannels {
    /// Sender for IM-network events.
    pub event_tx: mpsc::UnboundedSender<ImEvent>,
    /// Receiver for actions the bridge wants performed.
    pub action_rx: mpsc::UnboundedReceiver<ImAction>,
}

/// Outbound halves owned by the bridge.
pub struct BridgeOutputs {
    pub xmpp_tx: mpsc::UnboundedSender<XmppAction>,
    pub im_tx: mpsc::UnboundedSender<ImAction>,
}

/// Inbound halves consumed by the bridge event loop.
pub struct BridgeInputs {
    pub xmpp_rx: mpsc::UnboundedReceiver<XmppEvent>,
    pub im_rx: mpsc::UnboundedReceiver<ImEvent>,
    /// Receiver for shutdown signal.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Control channels for shutdown coordination.
pub struct ControlChannels {
    /// Sender to trigger shutdown.
    pub shutdown_tx: watch::Sender<bool>,
}

/// Bundle of all channels between the bridge and its collaborators.
pub struct ChannelBundle {
    pub outputs: BridgeOutputs,
    pub inputs: BridgeInputs,
    pub xmpp: XmppSideChannels,
    pub im: ImSideChannels,
    pub control: ControlChannels,
}

impl ChannelBundle {
    /// Create a new set of bridge channels.
    pub fn new() -> Self {
        let (xmpp_event_tx, xmpp_rx) = mpsc::unbounded_channel();
        let (xmpp_tx, xmpp_action_rx) = mpsc::unbounded_channel();
        let (im_event_tx, im_rx) = mpsc::unbounded_channel();
        let (im_tx, im_action_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            outputs: BridgeOutputs { xmpp_tx, im_tx },
            inputs: BridgeInputs {
                xmpp_rx,
                im_rx,
                shutdown_rx,
            },
            xmpp: XmppSideChannels {
                event_tx: xmpp_event_tx,
                action_rx: xmpp_action_rx,
            },
            im: ImSideChannels {
                event_tx: im_event_tx,
                action_rx: im_action_rx,
            },
            control: ControlChannels { shutdown_tx },
        }
    }
}

impl Default for ChannelBundle {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends text and presence to the control account.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<XmppAction>,
    control_account: String,
}

impl ControlHandle {
    pub fn new(tx: mpsc::UnboundedSender<XmppAction>, control_account: impl Into<String>) -> Self {
        Self {
            tx,
            control_account: control_account.into(),
        }
    }

    pub fn control_account(&self) -> &str {
        &self.control_account
    }

    /// Send a chat message to the control account.
    pub fn send_text(&self, text: impl Into<String>) {
        let body = text.into();
        info!(to = %self.control_account, "Control <- {}", body);
        self.send(XmppAction::Message {
            to: self.control_account.clone(),
            body,
        });
    }

    /// Replace our presence status text.
    pub fn set_status(&self, status: impl Into<String>) {
        self.send(XmppAction::Status {
            status: status.into(),
        });
    }

    pub fn send(&self, action: XmppAction) {
        if let Err(e) = self.tx.send(action) {
            warn!("XMPP channel closed, dropping {:?}", e.0);
        }
    }

    /// Text sender for components that only need to talk to the operator.
    pub fn sender(&self) -> ControlSender {
        let handle = self.clone();
        Arc::new(move |text| handle.send_text(text))
    }
}

/// Submits actions to the IM-network client.
#[derive(Debug, Clone)]
pub struct ImHandle {
    tx: mpsc::UnboundedSender<ImAction>,
}

impl ImHandle {
    pub fn new(tx: mpsc::UnboundedSender<ImAction>) -> Self {
        Self { tx }
    }

    pub fn send(&self, action: ImAction) -> BridgeResult<()> {
        self.tx.send(action).map_err(|_| BridgeError::ImClosed)
    }
}
