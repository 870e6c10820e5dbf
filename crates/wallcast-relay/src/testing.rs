//! In-memory fakes of the collaborator traits for unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use wallcast_core::error::{Result, SendError, WallcastError};
use wallcast_core::traits::{ChatProbe, MessageSender, SubscriptionStore, WallSource, WatermarkStore};
use wallcast_core::types::{OutgoingMessage, ProbeStatus, Subscription, WallPost};

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<(i64, i64), Option<String>>>,
    watermarks: Mutex<HashMap<i64, i64>>,
    writes: Mutex<usize>,
    watermark_writes: Mutex<Vec<(i64, i64)>>,
}

impl MemoryStore {
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    pub fn watermark_writes(&self) -> Vec<(i64, i64)> {
        self.watermark_writes.lock().unwrap().clone()
    }

    pub fn with_watermark(self, source_id: i64, post_id: i64) -> Self {
        self.watermarks.lock().unwrap().insert(source_id, post_id);
        self
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn upsert(&self, source_id: i64, chat_id: i64, template: Option<&str>) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        self.rows
            .lock()
            .unwrap()
            .insert((source_id, chat_id), template.map(String::from));
        Ok(())
    }

    async fn delete(&self, source_id: i64, chat_id: i64) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        self.rows.lock().unwrap().remove(&(source_id, chat_id));
        Ok(())
    }

    async fn list_by_source(&self, source_id: i64) -> Result<Vec<Subscription>> {
        let mut subs: Vec<Subscription> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|((source, _), _)| *source == source_id)
            .map(|((source, chat), template)| Subscription::new(*source, *chat, template.clone()))
            .collect();
        subs.sort_by_key(|s| s.chat_id);
        Ok(subs)
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn load_watermark(&self, source_id: i64) -> Result<Option<i64>> {
        Ok(self.watermarks.lock().unwrap().get(&source_id).copied())
    }

    async fn save_watermark(&self, source_id: i64, last_post_id: i64) -> Result<()> {
        self.watermark_writes.lock().unwrap().push((source_id, last_post_id));
        let mut marks = self.watermarks.lock().unwrap();
        let entry = marks.entry(source_id).or_insert(last_post_id);
        *entry = (*entry).max(last_post_id);
        Ok(())
    }
}

/// Every operation fails with a storage error.
pub struct FailingStore;

#[async_trait]
impl SubscriptionStore for FailingStore {
    async fn upsert(&self, _: i64, _: i64, _: Option<&str>) -> Result<()> {
        Err(WallcastError::Storage("disk full".into()))
    }

    async fn delete(&self, _: i64, _: i64) -> Result<()> {
        Err(WallcastError::Storage("disk full".into()))
    }

    async fn list_by_source(&self, _: i64) -> Result<Vec<Subscription>> {
        Err(WallcastError::Storage("database is locked".into()))
    }
}

/// Records every send; per-peer scripted failures are returned first.
#[derive(Default)]
pub struct RecordingSender {
    failures: Mutex<HashMap<i64, VecDeque<SendError>>>,
    attempts: Mutex<Vec<i64>>,
    sent: Mutex<Vec<(i64, OutgoingMessage)>>,
}

impl RecordingSender {
    pub fn fail(self, peer_id: i64, errors: Vec<SendError>) -> Self {
        self.failures.lock().unwrap().insert(peer_id, errors.into());
        self
    }

    /// Successfully delivered messages, in order.
    pub fn sent(&self) -> Vec<(i64, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Every send call, including failed ones.
    pub fn attempts(&self) -> Vec<i64> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn texts_to(&self, peer_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(peer, _)| *peer == peer_id)
            .map(|(_, m)| m.text)
            .collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, peer_id: i64, message: &OutgoingMessage) -> std::result::Result<(), SendError> {
        self.attempts.lock().unwrap().push(peer_id);
        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&peer_id)
            .and_then(|queue| queue.pop_front())
        {
            return Err(err);
        }
        self.sent.lock().unwrap().push((peer_id, message.clone()));
        Ok(())
    }
}

/// Answers probes from a per-peer script; unknown peers are `NotFound`.
#[derive(Default)]
pub struct ScriptedProbe {
    script: Mutex<HashMap<i64, VecDeque<ProbeStatus>>>,
    calls: Mutex<Vec<i64>>,
}

impl ScriptedProbe {
    pub fn answer(self, peer_id: i64, statuses: Vec<ProbeStatus>) -> Self {
        self.script.lock().unwrap().insert(peer_id, statuses.into());
        self
    }

    /// Peers contiguous from `first` that are all available.
    pub fn available_range(mut self, first: i64, count: i64) -> Self {
        for peer in first..first + count {
            self = self.answer(peer, vec![ProbeStatus::Available]);
        }
        self
    }

    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProbe for ScriptedProbe {
    async fn probe(&self, peer_id: i64) -> Result<ProbeStatus> {
        self.calls.lock().unwrap().push(peer_id);
        let mut script = self.script.lock().unwrap();
        let Some(queue) = script.get_mut(&peer_id) else {
            return Ok(ProbeStatus::NotFound);
        };
        // The last answer sticks once the script runs out.
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        Ok(status.unwrap_or(ProbeStatus::NotFound))
    }
}

/// A wall with a fixed set of posts, newest first like the platform returns.
pub struct FakeWall {
    posts: Vec<i64>,
    fail: bool,
}

impl FakeWall {
    pub fn new(mut post_ids: Vec<i64>) -> Self {
        post_ids.sort_unstable_by(|a, b| b.cmp(a));
        Self {
            posts: post_ids,
            fail: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            posts: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl WallSource for FakeWall {
    async fn latest_posts(&self, _source_id: i64, count: u32) -> Result<Vec<WallPost>> {
        if self.fail {
            return Err(WallcastError::Http("wall.get timed out".into()));
        }
        let date = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Ok(self
            .posts
            .iter()
            .take(count as usize)
            .map(|id| WallPost { id: *id, date })
            .collect())
    }
}
