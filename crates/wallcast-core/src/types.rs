//! Domain types shared by every Wallcast crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Peer ids of group chats are this offset plus the chat's local id.
pub const CHAT_PEER_OFFSET: i64 = 2_000_000_000;

/// Peer id addressing the group chat with local id `chat_id`.
pub fn chat_peer_id(chat_id: i64) -> i64 {
    CHAT_PEER_OFFSET + chat_id
}

/// Local chat id for a peer id, if the peer is a group chat.
pub fn chat_id_from_peer(peer_id: i64) -> Option<i64> {
    (peer_id > CHAT_PEER_OFFSET).then(|| peer_id - CHAT_PEER_OFFSET)
}

/// Durable opt-in binding a chat to a source wall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Monitored community.
    pub source_id: i64,
    /// Local id of the destination chat.
    pub chat_id: i64,
    /// Custom notification text, already placeholder-expanded.
    pub message_template: Option<String>,
}

impl Subscription {
    pub fn new(source_id: i64, chat_id: i64, message_template: Option<String>) -> Self {
        Self {
            source_id,
            chat_id,
            message_template,
        }
    }

    /// The custom text, treating an empty template as unset.
    pub fn template(&self) -> Option<&str> {
        self.message_template.as_deref().filter(|t| !t.is_empty())
    }

    pub fn peer_id(&self) -> i64 {
        chat_peer_id(self.chat_id)
    }
}

/// A new post appeared on a source wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEvent {
    pub source_id: i64,
    pub post_id: i64,
}

/// A post as returned by the wall reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallPost {
    pub id: i64,
    pub date: DateTime<Utc>,
}

/// Reference to a wall post, rendered as `wall<owner>_<post>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WallAttachment {
    pub owner_id: i64,
    pub post_id: i64,
}

impl WallAttachment {
    /// Attachment for a post on a source wall.
    ///
    /// Community-owned content is addressed by the negated community id. A
    /// source id that is already negative is taken as an owner id as-is.
    pub fn for_post(source_id: i64, post_id: i64) -> Self {
        let owner_id = if source_id > 0 { -source_id } else { source_id };
        Self { owner_id, post_id }
    }
}

impl fmt::Display for WallAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wall{}_{}", self.owner_id, self.post_id)
    }
}

/// A chat message received by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Conversation the message was posted in.
    pub peer_id: i64,
    /// Author of the message.
    pub from_id: i64,
    pub text: String,
}

impl IncomingMessage {
    /// Local chat id, if the message was posted in a group chat.
    pub fn chat_id(&self) -> Option<i64> {
        chat_id_from_peer(self.peer_id)
    }
}

/// Everything the event source can hand to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Post(PostEvent),
    Message(IncomingMessage),
}

/// A message to send to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub attachment: Option<WallAttachment>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: WallAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Result of a reachability probe for a candidate chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeStatus {
    /// The chat exists and can be written to.
    Available,
    /// The probe itself was throttled; ask again after a pause.
    CantWrite,
    /// No chat has this id.
    NotFound,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Available => write!(f, "available"),
            ProbeStatus::CantWrite => write!(f, "cant_write"),
            ProbeStatus::NotFound => write!(f, "not_found"),
        }
    }
}
