//! Discovery sweep: the subscription-free distribution mode.
//!
//! Each run reads the newest wall posts with a user token, keeps the ones past
//! the stored watermark, then walks chat peer ids upward from a fixed start,
//! delivering every new post to each reachable chat until the first id that
//! does not exist. The watermark moves only after the walk has finished.

use std::sync::Arc;
use std::time::{Duration, Instant};
use wallcast_core::config::SweepConfig;
use wallcast_core::error::{Result, SendError, WallcastError};
use wallcast_core::traits::{ChatProbe, MessageSender, WallSource, WatermarkStore};
use wallcast_core::types::{OutgoingMessage, ProbeStatus, WallAttachment, WallPost};

use crate::retry::{RetryPolicy, send_with_retry};

/// Phase of a sweep run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepPhase {
    Fetching,
    Filtering,
    Probing,
    Done,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing past the watermark; no side effects.
    NoNewPosts,
    /// First peer id without a chat (by probe or by a not-found send).
    EndOfChats { peer_id: i64 },
}

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// New post ids, ascending.
    pub new_posts: Vec<i64>,
    /// Peers that probed as available.
    pub chats_reached: Vec<i64>,
    /// Messages delivered across all chats.
    pub deliveries: usize,
    pub stop: StopReason,
    /// Watermark persisted at the end of the run.
    pub watermark: Option<i64>,
}

impl SweepReport {
    fn empty() -> Self {
        Self {
            new_posts: Vec::new(),
            chats_reached: Vec::new(),
            deliveries: 0,
            stop: StopReason::NoNewPosts,
            watermark: None,
        }
    }
}

/// How delivery to one chat ended.
enum ChatDelivery {
    /// All posts attempted.
    Finished,
    /// The bot may not write here; remaining posts skipped.
    Forbidden,
    /// The chat turned out not to exist.
    Gone,
}

/// Pick the posts a run should deliver, ascending by id.
///
/// Without a watermark only the newest post counts as new, so a first run
/// does not replay the whole wall.
pub fn filter_new_posts(posts: &[WallPost], watermark: Option<i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = match watermark {
        None => posts.iter().map(|p| p.id).max().into_iter().collect(),
        Some(mark) => posts.iter().map(|p| p.id).filter(|id| *id > mark).collect(),
    };
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub struct DiscoverySweep {
    source_id: i64,
    wall: Arc<dyn WallSource>,
    probe: Arc<dyn ChatProbe>,
    sender: Arc<dyn MessageSender>,
    watermarks: Arc<dyn WatermarkStore>,
    config: SweepConfig,
    text: String,
}

impl DiscoverySweep {
    pub fn new(
        source_id: i64,
        wall: Arc<dyn WallSource>,
        probe: Arc<dyn ChatProbe>,
        sender: Arc<dyn MessageSender>,
        watermarks: Arc<dyn WatermarkStore>,
        config: &SweepConfig,
        text: &str,
    ) -> Self {
        Self {
            source_id,
            wall,
            probe,
            sender,
            watermarks,
            config: config.clone(),
            text: text.to_string(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval()
    }

    /// Execute one full run.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let mut report = SweepReport::empty();

        tracing::debug!("Sweep phase: {:?}", SweepPhase::Fetching);
        let posts = self
            .wall
            .latest_posts(self.source_id, self.config.fetch_count)
            .await?;

        tracing::debug!("Sweep phase: {:?}", SweepPhase::Filtering);
        let watermark = self.watermarks.load_watermark(self.source_id).await?;
        report.new_posts = filter_new_posts(&posts, watermark);
        let Some(&newest) = report.new_posts.last() else {
            tracing::debug!("No posts past watermark {watermark:?}");
            return Ok(report);
        };
        tracing::info!(
            "🆕 {} new post(s) on wall {}: {:?}",
            report.new_posts.len(),
            self.source_id,
            report.new_posts
        );

        tracing::debug!("Sweep phase: {:?}", SweepPhase::Probing);
        let stop = self.probe_chats(&mut report).await?;
        report.stop = stop;

        tracing::debug!("Sweep phase: {:?}", SweepPhase::Done);
        self.watermarks.save_watermark(self.source_id, newest).await?;
        report.watermark = Some(newest);
        Ok(report)
    }

    /// Run once and log the outcome; never propagates.
    pub async fn handle(&self) -> Option<SweepReport> {
        match self.run_once().await {
            Ok(report) => {
                if !report.new_posts.is_empty() {
                    tracing::info!(
                        "✅ Sweep finished: {} chat(s), {} deliveries, stopped at {:?}",
                        report.chats_reached.len(),
                        report.deliveries,
                        report.stop
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::error!("❌ Sweep aborted, watermark unchanged: {e}");
                None
            }
        }
    }

    /// Walk peer ids upward until the first missing chat.
    async fn probe_chats(&self, report: &mut SweepReport) -> Result<StopReason> {
        let started = Instant::now();
        let max_duration = self.config.max_duration();
        let mut peer_id = self.config.first_peer_id;
        let mut candidates = 0u32;
        let mut throttled = 0u32;

        loop {
            if candidates >= self.config.max_probes {
                return Err(WallcastError::DispatchLoad(format!(
                    "probe limit of {} reached at peer {peer_id}",
                    self.config.max_probes
                )));
            }
            if started.elapsed() > max_duration {
                return Err(WallcastError::DispatchLoad(format!(
                    "sweep exceeded {max_duration:?} at peer {peer_id}"
                )));
            }

            let status = self.probe.probe(peer_id).await?;
            tracing::debug!("Probe {peer_id}: {status}");

            match status {
                ProbeStatus::CantWrite => {
                    throttled += 1;
                    if throttled > self.config.max_probe_retries {
                        return Err(WallcastError::DispatchLoad(format!(
                            "probe for peer {peer_id} throttled {throttled} times"
                        )));
                    }
                    tokio::time::sleep(self.config.backoff()).await;
                    continue;
                }
                ProbeStatus::NotFound => return Ok(StopReason::EndOfChats { peer_id }),
                ProbeStatus::Available => {
                    report.chats_reached.push(peer_id);
                    let (outcome, delivered) = self.deliver_posts(peer_id, &report.new_posts).await;
                    report.deliveries += delivered;
                    if let ChatDelivery::Gone = outcome {
                        return Ok(StopReason::EndOfChats { peer_id });
                    }
                }
            }

            throttled = 0;
            candidates += 1;
            peer_id += 1;
        }
    }

    /// Send every new post to one chat, oldest first. Returns how delivery
    /// ended and how many posts went through.
    async fn deliver_posts(&self, peer_id: i64, posts: &[i64]) -> (ChatDelivery, usize) {
        // One retry after a fixed pause.
        let policy = RetryPolicy::fixed(self.config.backoff(), 2);

        let mut delivered = 0;

        for &post_id in posts {
            let message = OutgoingMessage::text(&self.text)
                .with_attachment(WallAttachment::for_post(self.source_id, post_id));

            match send_with_retry(self.sender.as_ref(), peer_id, &message, &policy).await {
                Ok(()) => delivered += 1,
                Err(SendError::Forbidden { code, .. }) => {
                    tracing::warn!("⚠️ Forbidden to write to {peer_id} (code {code}), skipping chat");
                    return (ChatDelivery::Forbidden, delivered);
                }
                Err(SendError::NotFound { .. }) => {
                    tracing::info!("Peer {peer_id} vanished during delivery, ending sweep");
                    return (ChatDelivery::Gone, delivered);
                }
                Err(e) => {
                    tracing::error!("❌ Post {post_id} not delivered to {peer_id}: {e}");
                }
            }
        }
        (ChatDelivery::Finished, delivered)
    }
}
