//! Sequential prompt queue for interactive exchanges.
//!
//! Some IM-network flows need one answer from the operator before they
//! can continue (verification codes, file-transfer consent). The control
//! channel carries free-form commands too, so only one question may be
//! outstanding at a time: the first prompt becomes active and its tip is
//! sent, later prompts wait in arrival order until the active one is
//! answered.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

/// Function that delivers text to the control channel.
pub type ControlSender = Arc<dyn Fn(String) + Send + Sync>;

/// Result of feeding operator input to a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<A> {
    /// Whether the prompt is answered and can be retired.
    pub accepted: bool,
    /// Text for the operator; nothing is sent when blank.
    pub reply: String,
    /// Follow-up for the caller to carry out.
    pub action: Option<A>,
}

impl<A> Resolution<A> {
    pub fn accept(reply: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reply: reply.into(),
            action: None,
        }
    }

    /// Keep the prompt active and ask again.
    pub fn retry(reply: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reply: reply.into(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: A) -> Self {
        self.action = Some(action);
        self
    }
}

/// Something that can judge an operator's answer.
pub trait Resolve {
    type Action;

    fn resolve(&self, input: &str) -> Resolution<Self::Action>;
}

/// Where a cancelled prompt was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retired {
    /// It was the active prompt; the next one (if any) has been activated.
    Active,
    /// It was waiting in the backlog and has been dropped.
    Queued,
    NotFound,
}

struct PendingPrompt<R> {
    tip: String,
    resolver: R,
}

/// Single-slot FIFO of prompts awaiting operator input.
pub struct PromptQueue<R> {
    send: ControlSender,
    active: Option<PendingPrompt<R>>,
    backlog: VecDeque<PendingPrompt<R>>,
}

impl<R: Resolve> PromptQueue<R> {
    pub fn new(send: ControlSender) -> Self {
        Self {
            send,
            active: None,
            backlog: VecDeque::new(),
        }
    }

    /// No active prompt and nothing waiting.
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.backlog.is_empty()
    }

    /// The next operator message answers the active prompt.
    pub fn needs_input(&self) -> bool {
        self.active.is_some()
    }

    /// Prompts held, active one included.
    pub fn len(&self) -> usize {
        self.backlog.len() + usize::from(self.active.is_some())
    }

    /// Add a prompt. Its tip is sent right away only if the queue was idle.
    pub fn enqueue(&mut self, tip: impl Into<String>, resolver: R) {
        let prompt = PendingPrompt {
            tip: tip.into(),
            resolver,
        };

        if self.is_idle() {
            self.active = Some(prompt);
            self.send_tip();
        } else {
            debug!(backlog = self.backlog.len() + 1, "Prompt queued");
            self.backlog.push_back(prompt);
        }
    }

    /// Re-send the active prompt's tip.
    pub fn send_tip(&self) {
        if let Some(prompt) = &self.active {
            (self.send)(prompt.tip.clone());
        }
    }

    /// Answer the active prompt with operator text.
    ///
    /// Returns the resolver's follow-up action, if any. A rejected answer
    /// leaves the prompt active; an accepted one activates the next prompt.
    pub fn input(&mut self, text: &str) -> Option<R::Action> {
        let Some(prompt) = &self.active else {
            warn!("Prompt input received with no active prompt");
            return None;
        };

        let resolution = prompt.resolver.resolve(text);
        if !resolution.reply.trim().is_empty() {
            (self.send)(resolution.reply);
        }

        if resolution.accepted {
            self.advance();
        }

        resolution.action
    }

    /// Retire the first prompt matching `pred`.
    ///
    /// If it was active, `notice` is sent and the next prompt is activated.
    /// A queued match is removed silently.
    pub fn cancel(
        &mut self,
        pred: impl Fn(&R) -> bool,
        notice: impl FnOnce(&R) -> String,
    ) -> Retired {
        if let Some(prompt) = &self.active {
            if pred(&prompt.resolver) {
                (self.send)(notice(&prompt.resolver));
                self.advance();
                return Retired::Active;
            }
        }

        match self.backlog.iter().position(|p| pred(&p.resolver)) {
            Some(index) => {
                self.backlog.remove(index);
                Retired::Queued
            }
            None => Retired::NotFound,
        }
    }

    /// Drop every prompt without sending anything. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.active = None;
        self.backlog.clear();
        dropped
    }

    fn advance(&mut self) {
        self.active = self.backlog.pop_front();
        self.send_tip();
    }
}
