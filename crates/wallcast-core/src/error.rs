//! Error taxonomy for Wallcast.

use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum WallcastError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Dispatch load error: {0}")]
    DispatchLoad(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, WallcastError>;

/// Why a single outgoing message was not delivered.
///
/// Each variant keeps the platform error code so logs stay actionable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Too many requests; worth retrying after a pause.
    #[error("rate limited (code {code})")]
    RateLimited { code: i64 },

    /// The bot may not write to this chat.
    #[error("forbidden to write (code {code}): {message}")]
    Forbidden { code: i64, message: String },

    /// The chat does not exist.
    #[error("recipient not found (code {code})")]
    NotFound { code: i64 },

    /// Anything else: transport failures, malformed responses, unknown codes.
    #[error("send failed: {message}")]
    Other { code: Option<i64>, message: String },
}

impl SendError {
    pub fn other(message: impl Into<String>) -> Self {
        SendError::Other {
            code: None,
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SendError::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_display() {
        let err = SendError::Forbidden {
            code: 917,
            message: "no access".into(),
        };
        assert_eq!(err.to_string(), "forbidden to write (code 917): no access");
        assert!(!err.is_rate_limited());
        assert!(SendError::RateLimited { code: 6 }.is_rate_limited());
    }
}
