//! Worker loops: one event at a time for the subscription relay, a timed loop
//! for the discovery sweep.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use wallcast_core::types::InboundEvent;

use crate::commands::CommandInterpreter;
use crate::dispatch::DispatchEngine;
use crate::sweep::DiscoverySweep;

/// Routes inbound events to the command interpreter or the dispatch engine.
pub struct Relay {
    commands: CommandInterpreter,
    dispatcher: DispatchEngine,
}

impl Relay {
    pub fn new(commands: CommandInterpreter, dispatcher: DispatchEngine) -> Self {
        Self {
            commands,
            dispatcher,
        }
    }

    /// Process a single event. Errors are handled inside the unit of work.
    pub async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message(message) => {
                let outcome = self.commands.handle(&message).await;
                tracing::debug!("Message in {} from {}: {outcome:?}", message.peer_id, message.from_id);
            }
            InboundEvent::Post(post) => {
                self.dispatcher.handle(&post).await;
            }
        }
    }

    /// Consume events until the source ends. Returns the number processed.
    pub async fn run<S>(&self, mut events: S) -> u64
    where
        S: Stream<Item = InboundEvent> + Unpin,
    {
        tracing::info!("🚀 Relay worker started");
        let mut processed = 0u64;
        while let Some(event) = events.next().await {
            self.handle_event(event).await;
            processed += 1;
        }
        tracing::info!("Relay worker stopped after {processed} event(s)");
        processed
    }
}

/// Run the sweep on its own schedule, forever.
pub async fn spawn_sweep(sweep: Arc<DiscoverySweep>) {
    let period = sweep.interval();
    tracing::info!("⏰ Discovery sweep started (every {}s)", period.as_secs());

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        sweep.handle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingStore, MemoryStore, RecordingSender};
    use wallcast_core::config::DispatchConfig;
    use wallcast_core::traits::SubscriptionStore;
    use wallcast_core::types::{IncomingMessage, PostEvent, chat_peer_id};

    const SOURCE: i64 = 123;
    const ADMIN: i64 = 42;

    fn relay(store: Arc<dyn SubscriptionStore>, sender: Arc<RecordingSender>) -> Relay {
        let config = DispatchConfig {
            default_text: "New post!".into(),
            rate_limit_backoff_ms: 0,
            max_send_attempts: 1,
        };
        Relay::new(
            CommandInterpreter::new(SOURCE, ADMIN, store.clone(), sender.clone()),
            DispatchEngine::new(store, sender, &config),
        )
    }

    fn command(chat_id: i64, text: &str) -> InboundEvent {
        InboundEvent::Message(IncomingMessage {
            peer_id: chat_peer_id(chat_id),
            from_id: ADMIN,
            text: text.into(),
        })
    }

    fn post(post_id: i64) -> InboundEvent {
        InboundEvent::Post(PostEvent {
            source_id: SOURCE,
            post_id,
        })
    }

    #[tokio::test]
    async fn test_subscribe_then_post_then_unsubscribe() {
        let store = Arc::new(MemoryStore::default());
        let sender = Arc::new(RecordingSender::default());
        let relay = relay(store, sender.clone());

        let events = futures::stream::iter(vec![
            command(1, "/subscribe Hey {online}"),
            command(2, "/subscribe"),
            post(10),
            command(1, "/unsubscribe"),
            post(11),
        ]);
        assert_eq!(relay.run(events).await, 5);

        let chat1 = sender.texts_to(chat_peer_id(1));
        assert_eq!(chat1, vec!["okay", "Hey @online", "okay"]);
        let chat2 = sender.texts_to(chat_peer_id(2));
        assert_eq!(chat2, vec!["okay", "New post!", "New post!"]);
    }

    #[tokio::test]
    async fn test_resubscribe_against_sqlite() {
        let store = Arc::new(wallcast_db::SubscriptionDb::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::default());
        let relay = relay(store.clone(), sender.clone());

        let events = futures::stream::iter(vec![
            command(4, "/subscribe first {all}"),
            command(4, "/subscribe second {here}"),
            post(30),
        ]);
        relay.run(events).await;

        assert_eq!(store.subscription_count().unwrap(), 1);
        assert_eq!(
            sender.texts_to(chat_peer_id(4)),
            vec!["okay", "okay", "second @here"]
        );
    }

    #[tokio::test]
    async fn test_long_poll_post_reaches_command_subscribers() {
        let store = Arc::new(MemoryStore::default());
        let sender = Arc::new(RecordingSender::default());
        let relay = relay(store, sender.clone());

        let update: wallcast_channels::longpoll::LongPollUpdate = serde_json::from_str(&format!(
            r#"{{"type":"wall_post_new","object":{{"id":31,"owner_id":-{SOURCE},"post_type":"post"}},"group_id":{SOURCE}}}"#
        ))
        .unwrap();
        let post = wallcast_channels::longpoll::parse_update(&update).unwrap();

        let events = futures::stream::iter(vec![command(6, "/subscribe Fresh {all}"), post]);
        relay.run(events).await;

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, chat_peer_id(6));
        assert_eq!(sent[1].1.text, "Fresh @all");
        assert_eq!(sent[1].1.attachment.unwrap().to_string(), "wall-123_31");
    }

    #[tokio::test]
    async fn test_loop_survives_failing_events() {
        let sender = Arc::new(RecordingSender::default());
        let relay = relay(Arc::new(FailingStore), sender.clone());

        let events = futures::stream::iter(vec![post(1), command(3, "/subscribe"), post(2)]);
        assert_eq!(relay.run(events).await, 3);
        assert_eq!(sender.texts_to(chat_peer_id(3)), vec!["not okay, check console"]);
    }
}
