//! Wallcast configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WallcastError};
use crate::types::CHAT_PEER_OFFSET;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallcastConfig {
    /// The only user allowed to run chat commands.
    #[serde(default)]
    pub admin_id: i64,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub mode: RelayMode,
    #[serde(default)]
    pub vk: VkConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

fn default_database() -> String { "subscriptions.db".into() }

impl Default for WallcastConfig {
    fn default() -> Self {
        Self {
            admin_id: 0,
            database: default_database(),
            mode: RelayMode::default(),
            vk: VkConfig::default(),
            dispatch: DispatchConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl WallcastConfig {
    /// Load config from the default path (~/.wallcast/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WallcastError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| WallcastError::Config(format!("Failed to parse config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Wallcast home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wallcast")
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.vk.bot_token.trim().is_empty() {
            return Err(WallcastError::Config("Bot token is required".into()));
        }
        if self.vk.group_id < 0 {
            return Err(WallcastError::Config(format!(
                "vk.group_id must be the positive community id, got {}",
                self.vk.group_id
            )));
        }
        match self.mode {
            RelayMode::Subscriptions => {
                if self.admin_id == 0 {
                    return Err(WallcastError::Config(
                        "Admin id is required in subscriptions mode".into(),
                    ));
                }
            }
            RelayMode::Sweep => {
                if self.vk.user_token.as_deref().is_none_or(|t| t.trim().is_empty()) {
                    return Err(WallcastError::Config(
                        "A user token is required to read the wall in sweep mode".into(),
                    ));
                }
                if self.sweep.fetch_count == 0 {
                    return Err(WallcastError::Config("sweep.fetch_count must be positive".into()));
                }
                if self.sweep.max_probes == 0 {
                    return Err(WallcastError::Config("sweep.max_probes must be positive".into()));
                }
            }
        }
        Ok(())
    }
}

/// Which distribution policy the process runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Push new posts to chats that opted in via `/subscribe`.
    #[default]
    Subscriptions,
    /// Poll the wall and push to every reachable chat.
    Sweep,
}

impl std::str::FromStr for RelayMode {
    type Err = WallcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "subscriptions" | "subscription" => Ok(RelayMode::Subscriptions),
            "sweep" => Ok(RelayMode::Sweep),
            other => Err(WallcastError::Config(format!("Unknown mode: {other}"))),
        }
    }
}

/// Platform API credentials and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VkConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Privileged (non-bot) token used to read the wall in sweep mode.
    #[serde(default)]
    pub user_token: Option<String>,
    /// Community id; 0 means resolve from the bot token at startup.
    #[serde(default)]
    pub group_id: i64,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_long_poll_wait")]
    pub long_poll_wait: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_version() -> String { "5.199".into() }
fn default_long_poll_wait() -> u64 { 25 }
fn default_request_timeout() -> u64 { 35 }

impl Default for VkConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            user_token: None,
            group_id: 0,
            api_version: default_api_version(),
            long_poll_wait: default_long_poll_wait(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Subscription-mode delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Body used when a subscription has no custom text.
    #[serde(default)]
    pub default_text: String,
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
}

fn default_rate_limit_backoff_ms() -> u64 { 1000 }
fn default_max_send_attempts() -> u32 { 3 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_text: String::new(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            max_send_attempts: default_max_send_attempts(),
        }
    }
}

impl DispatchConfig {
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }
}

/// Discovery sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    /// How many recent posts to fetch per run.
    #[serde(default = "default_fetch_count")]
    pub fetch_count: u32,
    /// First candidate peer id to probe.
    #[serde(default = "default_first_peer_id")]
    pub first_peer_id: i64,
    #[serde(default = "default_max_probes")]
    pub max_probes: u32,
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
    #[serde(default = "default_sweep_backoff_ms")]
    pub backoff_ms: u64,
    /// Throttled probes allowed for one candidate before the run is aborted.
    #[serde(default = "default_max_probe_retries")]
    pub max_probe_retries: u32,
}

fn default_sweep_interval() -> u64 { 300 }
fn default_fetch_count() -> u32 { 10 }
fn default_first_peer_id() -> i64 { CHAT_PEER_OFFSET + 1 }
fn default_max_probes() -> u32 { 10_000 }
fn default_max_duration() -> u64 { 1800 }
fn default_sweep_backoff_ms() -> u64 { 1000 }
fn default_max_probe_retries() -> u32 { 10 }

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            fetch_count: default_fetch_count(),
            first_peer_id: default_first_peer_id(),
            max_probes: default_max_probes(),
            max_duration_secs: default_max_duration(),
            backoff_ms: default_sweep_backoff_ms(),
            max_probe_retries: default_max_probe_retries(),
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
