//! Operator commands (-help, -list, #id, etc).
//!
//! Commands are regular expressions matched against the whole control
//! message. The table is built once at startup; registration refuses a
//! command whose pattern could also claim another command's input, so the
//! first match is the only match.

use std::panic::{self, AssertUnwindSafe};

use fancy_regex::Regex;
use tracing::{debug, error, warn};

use crate::bridge::formatter;
use crate::bridge::orchestrator::Session;
use crate::common::{BridgeError, BridgeResult};

/// Command handler. Receives the pattern's capture groups.
pub type Handler<C> = fn(&mut C, &CommandArgs) -> BridgeResult<()>;

/// Capture groups of a matched command, group 1 first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    groups: Vec<Option<String>>,
}

impl CommandArgs {
    pub fn new(groups: Vec<Option<String>>) -> Self {
        Self { groups }
    }

    /// Positional capture, 0-based. Empty for a group that did not participate.
    pub fn get(&self, index: usize) -> &str {
        self.groups
            .get(index)
            .and_then(|g| g.as_deref())
            .unwrap_or("")
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.groups.len()
    }
}

/// Static description of a command.
pub struct CommandSpec<C> {
    /// Regular expression the whole message must match.
    pub pattern: &'static str,
    /// Shown in -help instead of the raw pattern.
    pub usage: Option<&'static str>,
    pub help: &'static str,
    /// Inputs this command must accept; used to detect overlapping patterns.
    pub examples: &'static [&'static str],
    pub handler: Handler<C>,
}

impl<C> CommandSpec<C> {
    fn display(&self) -> &'static str {
        self.usage.unwrap_or(self.pattern)
    }
}

struct Command<C> {
    regex: Regex,
    spec: CommandSpec<C>,
}

impl<C> Command<C> {
    fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text).unwrap_or_else(|e| {
            warn!("Regex match error for command '{}': {}", self.spec.display(), e);
            false
        })
    }
}

/// Ordered table of commands.
pub struct CommandDispatcher<C> {
    commands: Vec<Command<C>>,
}

impl<C> CommandDispatcher<C> {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Add a command.
    ///
    /// Fails if the pattern does not compile, does not accept its own
    /// examples, or overlaps with an already registered command.
    pub fn register(&mut self, spec: CommandSpec<C>) -> BridgeResult<()> {
        let anchored = format!("^(?:{})$", spec.pattern);
        let regex = Regex::new(&anchored).map_err(|e| BridgeError::InvalidPattern {
            pattern: spec.pattern.to_string(),
            message: e.to_string(),
        })?;
        let command = Command { regex, spec };

        if command.spec.examples.is_empty() {
            return Err(BridgeError::InvalidPattern {
                pattern: command.spec.pattern.to_string(),
                message: "at least one example input is required".to_string(),
            });
        }
        if let Some(example) = command.spec.examples.iter().find(|e| !command.matches(e)) {
            return Err(BridgeError::InvalidPattern {
                pattern: command.spec.pattern.to_string(),
                message: format!("does not match its own example '{}'", example),
            });
        }

        for existing in &self.commands {
            let clash = command
                .spec
                .examples
                .iter()
                .find(|e| existing.matches(e))
                .or_else(|| existing.spec.examples.iter().find(|e| command.matches(e)));

            if let Some(input) = clash {
                return Err(BridgeError::CommandOverlap {
                    usage: command.spec.display().to_string(),
                    other: existing.spec.display().to_string(),
                    input: input.to_string(),
                });
            }
        }

        self.commands.push(command);
        Ok(())
    }

    /// Run the first command whose pattern matches the whole of `text`.
    ///
    /// Returns `Ok(false)` when nothing matched.
    pub fn parse(&self, ctx: &mut C, text: &str) -> BridgeResult<bool> {
        for command in &self.commands {
            let captures = match command.regex.captures(text) {
                Ok(Some(captures)) => captures,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Regex match error for command '{}': {}", command.spec.display(), e);
                    continue;
                }
            };

            let groups = (1..captures.len())
                .map(|i| captures.get(i).map(|m| m.as_str().to_string()))
                .collect();
            let args = CommandArgs::new(groups);

            debug!(command = command.spec.display(), ?args, "Running command");
            let handler = command.spec.handler;
            return match panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, &args))) {
                Ok(result) => result.map(|()| true),
                Err(_) => {
                    error!(command = command.spec.display(), "Command handler panicked");
                    Err(BridgeError::CommandPanicked(command.spec.display().to_string()))
                }
            };
        }

        Ok(false)
    }

    /// Help listing: one line per command, in registration order.
    pub fn help_text(&self) -> String {
        let mut lines = vec!["Commands".to_string()];
        for command in &self.commands {
            lines.push(format!("{}    {}", command.spec.display(), command.spec.help));
        }
        lines.join("\n")
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.commands.len()
    }
}

impl<C> Default for CommandDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// The operator command set.
pub fn builtin_commands() -> Vec<CommandSpec<Session>> {
    vec![
        CommandSpec {
            pattern: r"-help",
            usage: None,
            help: "Show this help",
            examples: &["-help"],
            handler: help,
        },
        CommandSpec {
            pattern: r"-list",
            usage: None,
            help: "List online friends",
            examples: &["-list"],
            handler: list_friends,
        },
        CommandSpec {
            pattern: r"-glist",
            usage: None,
            help: "List groups",
            examples: &["-glist"],
            handler: list_groups,
        },
        CommandSpec {
            pattern: r"-dlist",
            usage: None,
            help: "List discussions",
            examples: &["-dlist"],
            handler: list_discussions,
        },
        CommandSpec {
            pattern: r"(?s)#(\d+)(?!\d)\s*(.+)",
            usage: Some("#id content"),
            help: "Send content to the friend, group, discussion or session with this id",
            examples: &["#3 hello", "#12hi there"],
            handler: send_to,
        },
        CommandSpec {
            pattern: r"-qn\s+(\d+)",
            usage: Some("-qn id"),
            help: "Show the account number of a friend or group",
            examples: &["-qn 3"],
            handler: query_account,
        },
    ]
}

/// Build the dispatcher holding every built-in command.
pub fn build_dispatcher() -> BridgeResult<CommandDispatcher<Session>> {
    let mut dispatcher = CommandDispatcher::new();
    for spec in builtin_commands() {
        dispatcher.register(spec)?;
    }
    Ok(dispatcher)
}

fn help(session: &mut Session, _args: &CommandArgs) -> BridgeResult<()> {
    session.reply(session.help_text().to_string());
    Ok(())
}

fn list_friends(session: &mut Session, _args: &CommandArgs) -> BridgeResult<()> {
    let text = session.with_contacts(|contacts, registry| {
        formatter::friend_list(&contacts.friends, registry)
    });
    session.reply(text);
    Ok(())
}

fn list_groups(session: &mut Session, _args: &CommandArgs) -> BridgeResult<()> {
    let text = session
        .with_contacts(|contacts, registry| formatter::group_list(&contacts.groups, registry));
    session.reply(text);
    Ok(())
}

fn list_discussions(session: &mut Session, _args: &CommandArgs) -> BridgeResult<()> {
    let text = session.with_contacts(|contacts, registry| {
        formatter::discussion_list(&contacts.discussions, registry)
    });
    session.reply(text);
    Ok(())
}

fn send_to(session: &mut Session, args: &CommandArgs) -> BridgeResult<()> {
    session.send_to(args.get(0), args.get(1))
}

fn query_account(session: &mut Session, args: &CommandArgs) -> BridgeResult<()> {
    session.query_account(args.get(0))
}
