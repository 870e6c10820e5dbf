//! Admin chat commands: `/subscribe [text]` and `/unsubscribe`.
//!
//! Only the configured administrator can run them; messages from anyone else
//! are dropped before parsing, so they never reach the store.

use std::sync::Arc;
use wallcast_core::traits::{MessageSender, SubscriptionStore};
use wallcast_core::types::{IncomingMessage, OutgoingMessage};

use crate::placeholders;

pub const SUBSCRIBE: &str = "/subscribe";
pub const UNSUBSCRIBE: &str = "/unsubscribe";

pub const ACK_OK: &str = "okay";
pub const ACK_FAILED: &str = "not okay, check console";

/// A recognized chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Subscribe the chat, optionally with a custom (raw) notification text.
    Subscribe(Option<String>),
    Unsubscribe,
}

/// What happened to an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Not a command, not from the admin, or not in a group chat.
    Ignored,
    Applied(Command),
    /// The store rejected the change; the admin was told so.
    Failed(Command),
}

/// Parse a chat message into a command.
///
/// A leading bot mention such as `[club123|@bot]` is skipped, and the command
/// word is matched case-insensitively. Text after `/unsubscribe` is ignored.
pub fn parse(text: &str) -> Option<Command> {
    let text = strip_mention(text.trim());
    let (head, tail) = match text.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (text, ""),
    };

    if head.eq_ignore_ascii_case(SUBSCRIBE) {
        let template = (!tail.is_empty()).then(|| tail.to_string());
        Some(Command::Subscribe(template))
    } else if head.eq_ignore_ascii_case(UNSUBSCRIBE) {
        Some(Command::Unsubscribe)
    } else {
        None
    }
}

fn strip_mention(text: &str) -> &str {
    if text.starts_with('[')
        && let Some(end) = text.find(']')
        && text[1..end].contains('|')
    {
        return text[end + 1..].trim_start_matches([',', ' ']).trim_start();
    }
    text
}

/// Applies admin commands to the subscription store for one source.
pub struct CommandInterpreter {
    source_id: i64,
    admin_id: i64,
    store: Arc<dyn SubscriptionStore>,
    replies: Arc<dyn MessageSender>,
}

impl CommandInterpreter {
    pub fn new(
        source_id: i64,
        admin_id: i64,
        store: Arc<dyn SubscriptionStore>,
        replies: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            source_id,
            admin_id,
            store,
            replies,
        }
    }

    /// Handle one incoming message. Never fails; problems are logged and
    /// reported back to the chat.
    pub async fn handle(&self, message: &IncomingMessage) -> CommandOutcome {
        if message.from_id != self.admin_id {
            return CommandOutcome::Ignored;
        }
        let Some(chat_id) = message.chat_id() else {
            return CommandOutcome::Ignored;
        };
        let Some(command) = parse(&message.text) else {
            return CommandOutcome::Ignored;
        };

        let result = match &command {
            Command::Subscribe(raw) => {
                tracing::info!("\"subscribe\" command invoked by {} in chat {chat_id}", message.from_id);
                let expanded = raw.as_deref().map(placeholders::expand);
                self.store
                    .upsert(self.source_id, chat_id, expanded.as_deref())
                    .await
            }
            Command::Unsubscribe => {
                tracing::info!("\"unsubscribe\" command invoked by {} in chat {chat_id}", message.from_id);
                self.store.delete(self.source_id, chat_id).await
            }
        };

        let (ack, outcome) = match result {
            Ok(()) => (ACK_OK, CommandOutcome::Applied(command)),
            Err(e) => {
                tracing::error!("❌ Command failed in chat {chat_id}: {e}");
                (ACK_FAILED, CommandOutcome::Failed(command))
            }
        };

        if let Err(e) = self
            .replies
            .send(message.peer_id, &OutgoingMessage::text(ack))
            .await
        {
            tracing::warn!("⚠️ Could not acknowledge command in chat {chat_id}: {e}");
        }
        outcome
    }
}
