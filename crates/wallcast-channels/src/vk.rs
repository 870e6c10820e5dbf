//! VK API client: method calls over HTTPS with error-code classification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use wallcast_core::config::VkConfig;
use wallcast_core::error::{Result, SendError, WallcastError};
use wallcast_core::traits::{ChatProbe, MessageSender, WallSource};
use wallcast_core::types::{OutgoingMessage, ProbeStatus, WallAttachment, WallPost};

const API_BASE: &str = "https://api.vk.com/method";

// Platform error codes the relay reacts to.
const TOO_MANY_REQUESTS: i64 = 6;
const PERMISSION_DENIED: i64 = 7;
const ACCESS_DENIED: i64 = 15;
const CANT_SEND_TO_USER: i64 = 901;
const NO_ACCESS_TO_CHAT: i64 = 917;
const CHAT_DISABLED: i64 = 945;
const CHAT_NOT_FOUND: i64 = 927;

/// Failure of a single API call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("VK API error {code}: {message}")]
    Api { code: i64, message: String },
}

impl From<ApiError> for WallcastError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Transport(msg) => WallcastError::Http(msg),
            api => WallcastError::Channel(api.to_string()),
        }
    }
}

impl From<ApiError> for SendError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Transport(msg) => SendError::other(msg),
            ApiError::Api { code, message } => classify_error_code(code, message),
        }
    }
}

/// Map a platform error code onto the relay's delivery taxonomy.
pub fn classify_error_code(code: i64, message: String) -> SendError {
    match code {
        TOO_MANY_REQUESTS => SendError::RateLimited { code },
        PERMISSION_DENIED | ACCESS_DENIED | CANT_SEND_TO_USER | NO_ACCESS_TO_CHAT
        | CHAT_DISABLED => SendError::Forbidden { code, message },
        CHAT_NOT_FOUND => SendError::NotFound { code },
        _ => SendError::Other {
            code: Some(code),
            message,
        },
    }
}

/// Classify a `messages.getConversationsById` outcome.
///
/// A throttled call is `CantWrite` and worth asking again. Access errors still
/// mean the chat exists; the send itself then fails as `Forbidden`.
fn probe_status(
    peer_id: i64,
    result: std::result::Result<Conversations, ApiError>,
) -> Result<ProbeStatus> {
    match result {
        Ok(conversations) => match conversations.items.first() {
            None => Ok(ProbeStatus::NotFound),
            Some(conversation) => {
                if conversation.can_write.as_ref().is_some_and(|c| !c.allowed) {
                    tracing::debug!("Peer {peer_id} reports writing disallowed");
                }
                Ok(ProbeStatus::Available)
            }
        },
        Err(ApiError::Api { code, message }) => match classify_error_code(code, message) {
            SendError::RateLimited { .. } => Ok(ProbeStatus::CantWrite),
            SendError::NotFound { .. } => Ok(ProbeStatus::NotFound),
            SendError::Forbidden { .. } => Ok(ProbeStatus::Available),
            other => Err(WallcastError::Channel(format!("Probe {peer_id} failed: {other}"))),
        },
        Err(e) => Err(e.into()),
    }
}

/// VK API client bound to one access token.
#[derive(Clone)]
pub struct VkClient {
    token: String,
    version: String,
    client: reqwest::Client,
}

impl VkClient {
    pub fn new(token: &str, config: &VkConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            token: token.to_string(),
            version: config.api_version.clone(),
            client,
        }
    }

    /// Client with the bot (community) token.
    pub fn bot(config: &VkConfig) -> Self {
        Self::new(&config.bot_token, config)
    }

    /// Client with the privileged user token, if one is configured.
    pub fn user(config: &VkConfig) -> Option<Self> {
        config
            .user_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| Self::new(t, config))
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Call an API method and decode its `response` field.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<T, ApiError> {
        let mut form: Vec<(&str, String)> = params.to_vec();
        form.push(("access_token", self.token.clone()));
        form.push(("v", self.version.clone()));

        let response = self
            .client
            .post(format!("{API_BASE}/{method}"))
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("{method} failed: {e}")))?;

        let body: VkApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiError::Transport(format!("Invalid {method} response: {e}")))?;
        body.into_result(method)
    }

    /// Id of the community that owns the bot token.
    pub async fn resolve_group_id(&self) -> Result<i64> {
        let groups: GroupsById = self.call("groups.getById", &[]).await?;
        groups
            .into_groups()
            .first()
            .map(|g| g.id)
            .ok_or_else(|| WallcastError::Channel("groups.getById returned no community".into()))
    }

    /// Credentials for the Bots Long Poll server.
    pub async fn long_poll_server(&self, group_id: i64) -> Result<LongPollServer> {
        let server = self
            .call("groups.getLongPollServer", &[("group_id", group_id.to_string())])
            .await?;
        Ok(server)
    }

    /// Send a message to a peer.
    pub async fn send_message(
        &self,
        peer_id: i64,
        message: &OutgoingMessage,
    ) -> std::result::Result<(), SendError> {
        let mut params = vec![
            ("peer_id", peer_id.to_string()),
            ("random_id", rand::random::<i32>().to_string()),
            ("message", message.text.clone()),
        ];
        if let Some(attachment) = &message.attachment {
            params.push(("attachment", attachment.to_string()));
        }
        let _: serde_json::Value = self.call("messages.send", &params).await?;
        Ok(())
    }

    /// Ask whether a conversation exists and can be reached.
    pub async fn probe_conversation(&self, peer_id: i64) -> Result<ProbeStatus> {
        let result = self
            .call("messages.getConversationsById", &[("peer_ids", peer_id.to_string())])
            .await;
        probe_status(peer_id, result)
    }

    /// Most recent posts on a wall.
    pub async fn wall_get(&self, owner_id: i64, count: u32) -> Result<Vec<WallPost>> {
        let page: WallPage = self
            .call(
                "wall.get",
                &[
                    ("owner_id", owner_id.to_string()),
                    ("count", count.to_string()),
                    ("filter", "owner".into()),
                ],
            )
            .await?;
        Ok(page.items.into_iter().filter_map(WallItem::into_post).collect())
    }
}

#[async_trait]
impl MessageSender for VkClient {
    async fn send(&self, peer_id: i64, message: &OutgoingMessage) -> std::result::Result<(), SendError> {
        self.send_message(peer_id, message).await
    }
}

#[async_trait]
impl ChatProbe for VkClient {
    async fn probe(&self, peer_id: i64) -> Result<ProbeStatus> {
        self.probe_conversation(peer_id).await
    }
}

#[async_trait]
impl WallSource for VkClient {
    async fn latest_posts(&self, source_id: i64, count: u32) -> Result<Vec<WallPost>> {
        let owner_id = WallAttachment::for_post(source_id, 0).owner_id;
        self.wall_get(owner_id, count).await
    }
}

// --- VK API Types ---

#[derive(Debug, Deserialize)]
pub struct VkApiResponse<T> {
    pub response: Option<T>,
    pub error: Option<VkApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VkApiError {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

impl<T> VkApiResponse<T> {
    fn into_result(self, method: &str) -> std::result::Result<T, ApiError> {
        if let Some(err) = self.error {
            return Err(ApiError::Api {
                code: err.error_code,
                message: err.error_msg,
            });
        }
        self.response
            .ok_or_else(|| ApiError::Transport(format!("{method}: empty response")))
    }
}

/// `groups.getById` changed shape across API versions.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupsById {
    Wrapped { groups: Vec<Group> },
    List(Vec<Group>),
}

impl GroupsById {
    fn into_groups(self) -> Vec<Group> {
        match self {
            GroupsById::Wrapped { groups } => groups,
            GroupsById::List(groups) => groups,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Group {
    id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LongPollServer {
    pub server: String,
    pub key: String,
    #[serde(deserialize_with = "crate::longpoll::de_ts")]
    pub ts: String,
}

#[derive(Debug, Deserialize)]
struct Conversations {
    #[serde(default)]
    items: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    can_write: Option<CanWrite>,
}

#[derive(Debug, Deserialize)]
struct CanWrite {
    allowed: bool,
}

#[derive(Debug, Deserialize)]
struct WallPage {
    #[serde(default)]
    items: Vec<WallItem>,
}

#[derive(Debug, Deserialize)]
struct WallItem {
    id: i64,
    date: i64,
}

impl WallItem {
    fn into_post(self) -> Option<WallPost> {
        let date: DateTime<Utc> = DateTime::from_timestamp(self.date, 0)?;
        Some(WallPost { id: self.id, date })
    }
}
