//! Dispatch engine: fans a new wall post out to every subscribed chat.
//!
//! The recipient list is read once per event, before the first send. Each
//! recipient is attempted independently: a failed chat is logged and the loop
//! moves on.

use std::sync::Arc;
use wallcast_core::config::DispatchConfig;
use wallcast_core::error::{Result, SendError, WallcastError};
use wallcast_core::traits::{MessageSender, SubscriptionStore};
use wallcast_core::types::{OutgoingMessage, PostEvent, WallAttachment};

use crate::retry::{RetryPolicy, send_with_retry};

/// Per-event delivery summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub source_id: i64,
    pub post_id: i64,
    /// Chat ids that received the notification.
    pub delivered: Vec<i64>,
    /// Chat ids that did not, with the final error.
    pub failed: Vec<(i64, SendError)>,
}

impl DispatchReport {
    pub fn recipients(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Subscription-driven fan-out.
pub struct DispatchEngine {
    store: Arc<dyn SubscriptionStore>,
    sender: Arc<dyn MessageSender>,
    default_text: String,
    retry: RetryPolicy,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        sender: Arc<dyn MessageSender>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            store,
            sender,
            default_text: config.default_text.clone(),
            retry: RetryPolicy::exponential(config.rate_limit_backoff(), config.max_send_attempts),
        }
    }

    /// Deliver one post to all of its source's subscribers.
    ///
    /// Fails only when the recipient list cannot be loaded.
    pub async fn dispatch(&self, event: &PostEvent) -> Result<DispatchReport> {
        let recipients = self
            .store
            .list_by_source(event.source_id)
            .await
            .map_err(|e| WallcastError::DispatchLoad(e.to_string()))?;

        let attachment = WallAttachment::for_post(event.source_id, event.post_id);
        let mut report = DispatchReport {
            source_id: event.source_id,
            post_id: event.post_id,
            ..Default::default()
        };

        tracing::info!(
            "📣 New post {attachment}: notifying {} chat(s)",
            recipients.len()
        );

        for subscription in &recipients {
            let text = subscription.template().unwrap_or(&self.default_text);
            let message = OutgoingMessage::text(text).with_attachment(attachment);

            match send_with_retry(self.sender.as_ref(), subscription.peer_id(), &message, &self.retry)
                .await
            {
                Ok(()) => report.delivered.push(subscription.chat_id),
                Err(e) => {
                    tracing::error!("❌ Can't send to chat {}: {e}", subscription.chat_id);
                    report.failed.push((subscription.chat_id, e));
                }
            }
        }

        Ok(report)
    }

    /// Dispatch and log; never propagates, so the event loop keeps running.
    pub async fn handle(&self, event: &PostEvent) -> Option<DispatchReport> {
        match self.dispatch(event).await {
            Ok(report) => {
                tracing::info!(
                    "✅ Post {} distributed: {}/{} chat(s) reached",
                    event.post_id,
                    report.delivered.len(),
                    report.recipients()
                );
                Some(report)
            }
            Err(e) => {
                tracing::error!("❌ Common error while distributing post {}: {e}", event.post_id);
                None
            }
        }
    }
}
