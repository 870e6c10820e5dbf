//! Collaborator interfaces injected into the relay.
//!
//! Storage and platform clients are passed in explicitly as `Arc<dyn Trait>`;
//! nothing in the relay reaches for global connections.

use async_trait::async_trait;

use crate::error::{Result, SendError};
use crate::types::{OutgoingMessage, ProbeStatus, Subscription, WallPost};

/// Durable table of subscriptions, unique per (source, chat).
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert the subscription or replace the template of an existing one.
    async fn upsert(&self, source_id: i64, chat_id: i64, template: Option<&str>) -> Result<()>;

    /// Remove the subscription. Absent rows are not an error.
    async fn delete(&self, source_id: i64, chat_id: i64) -> Result<()>;

    /// All subscriptions for a source, in no particular order.
    async fn list_by_source(&self, source_id: i64) -> Result<Vec<Subscription>>;
}

/// Last processed post id per source, used by the discovery sweep.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load_watermark(&self, source_id: i64) -> Result<Option<i64>>;

    /// Persist a new watermark. Never moves an existing one backwards.
    async fn save_watermark(&self, source_id: i64, last_post_id: i64) -> Result<()>;
}

/// Outbound chat messages.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, peer_id: i64, message: &OutgoingMessage) -> std::result::Result<(), SendError>;
}

/// Reachability diagnostics for candidate chat peers.
#[async_trait]
pub trait ChatProbe: Send + Sync {
    async fn probe(&self, peer_id: i64) -> Result<ProbeStatus>;
}

/// Reads recent posts from a source wall.
#[async_trait]
pub trait WallSource: Send + Sync {
    /// Up to `count` most recent posts, in whatever order the platform returns.
    async fn latest_posts(&self, source_id: i64, count: u32) -> Result<Vec<WallPost>>;
}
