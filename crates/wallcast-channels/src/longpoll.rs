//! Bots Long Poll: turns community events into a stream of `InboundEvent`s.

use futures::stream::Stream;
use serde::{Deserialize, Deserializer};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use wallcast_core::error::{Result, WallcastError};
use wallcast_core::types::{InboundEvent, IncomingMessage, PostEvent};

use crate::vk::{LongPollServer, VkClient};

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Long poll session for one community.
pub struct LongPoll {
    client: VkClient,
    group_id: i64,
    wait: u64,
    server: Option<LongPollServer>,
}

impl LongPoll {
    pub fn new(client: VkClient, group_id: i64, wait: u64) -> Self {
        Self {
            client,
            group_id,
            wait,
            server: None,
        }
    }

    /// Fetch the next batch of events, refreshing the server key as needed.
    pub async fn poll(&mut self) -> Result<Vec<InboundEvent>> {
        let server = match self.server.take() {
            Some(server) => server,
            None => self.client.long_poll_server(self.group_id).await?,
        };

        let response = self
            .client
            .http()
            .get(&server.server)
            .query(&[
                ("act", "a_check".to_string()),
                ("key", server.key.clone()),
                ("ts", server.ts.clone()),
                ("wait", self.wait.to_string()),
            ])
            .timeout(Duration::from_secs(self.wait + 10))
            .send()
            .await
            .map_err(|e| WallcastError::Http(format!("Long poll request failed: {e}")))?;

        let body: LongPollResponse = response
            .json()
            .await
            .map_err(|e| WallcastError::Channel(format!("Invalid long poll response: {e}")))?;

        let events = match body.failed {
            None => body.updates.iter().filter_map(parse_update).collect(),
            Some(1) => {
                tracing::debug!("Long poll history outdated, resuming from new ts");
                Vec::new()
            }
            Some(code) => {
                tracing::debug!("Long poll failed with code {code}, refreshing server");
                Vec::new()
            }
        };
        self.server = next_server(server, &body);
        Ok(events)
    }

    /// Start the polling loop: returns a stream of events.
    pub fn start(self) -> LongPollStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut session = self;
            tracing::info!("📡 Long poll loop started for community {}", session.group_id);

            loop {
                match session.poll().await {
                    Ok(events) => {
                        for event in events {
                            if tx.send(event).is_err() {
                                tracing::info!("Long poll stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Long poll error: {e}");
                        session.server = None;
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        });

        LongPollStream { rx }
    }
}

/// Stream of events produced by the long poll loop.
pub struct LongPollStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<InboundEvent>,
}

impl Stream for LongPollStream {
    type Item = InboundEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Server to use for the next request, or `None` to fetch a fresh one.
///
/// `failed: 1` means the history is out of date and polling resumes from the
/// returned `ts`. Codes 2 and 3 mean the key or the whole session expired.
fn next_server(server: LongPollServer, response: &LongPollResponse) -> Option<LongPollServer> {
    match response.failed {
        None | Some(1) => Some(LongPollServer {
            ts: response.ts.clone().unwrap_or(server.ts),
            ..server
        }),
        Some(_) => None,
    }
}

/// Convert one raw update into an event the relay understands.
pub fn parse_update(update: &LongPollUpdate) -> Option<InboundEvent> {
    match update.kind.as_str() {
        "wall_post_new" => {
            let post: WallPostObject = serde_json::from_value(update.object.clone()).ok()?;
            if post.post_type.as_deref().is_some_and(|t| t != "post") {
                // Suggested and postponed posts are not published yet.
                return None;
            }
            let source_id = if update.group_id != 0 {
                update.group_id
            } else {
                post.owner_id.abs()
            };
            Some(InboundEvent::Post(PostEvent {
                source_id,
                post_id: post.id,
            }))
        }
        "message_new" => {
            let object: MessageNewObject = serde_json::from_value(update.object.clone()).ok()?;
            let message = object.message;
            Some(InboundEvent::Message(IncomingMessage {
                peer_id: message.peer_id,
                from_id: message.from_id,
                text: message.text,
            }))
        }
        _ => None,
    }
}

/// Accept `ts` both as a string and as a number.
pub(crate) fn de_ts<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ts {
        Str(String),
        Num(i64),
    }
    Ok(match Ts::deserialize(deserializer)? {
        Ts::Str(s) => s,
        Ts::Num(n) => n.to_string(),
    })
}

fn de_opt_ts<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    de_ts(deserializer).map(Some)
}

// --- Long Poll Types ---

#[derive(Debug, Deserialize)]
pub struct LongPollResponse {
    #[serde(default, deserialize_with = "de_opt_ts")]
    pub ts: Option<String>,
    #[serde(default)]
    pub updates: Vec<LongPollUpdate>,
    pub failed: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LongPollUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub object: serde_json::Value,
    #[serde(default)]
    pub group_id: i64,
}

#[derive(Debug, Deserialize)]
struct WallPostObject {
    id: i64,
    #[serde(default)]
    owner_id: i64,
    post_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageNewObject {
    message: MessageObject,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    peer_id: i64,
    from_id: i64,
    #[serde(default)]
    text: String,
}
