//! Rate-limit backoff for outgoing messages.
//! Only `SendError::RateLimited` is retried; every other error is final.

use std::time::Duration;
use wallcast_core::error::SendError;
use wallcast_core::traits::MessageSender;
use wallcast_core::types::OutgoingMessage;

/// How the pause grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// Retry policy for rate-limited sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Same pause before every retry.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            max_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Pause doubles after each attempt, capped at 32x the base.
    pub fn exponential(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: base_delay.saturating_mul(32),
            backoff: Backoff::Exponential,
        }
    }

    /// Pause after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 1u32 << attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }
}

/// Send a message, pausing and retrying while the platform throttles us.
pub async fn send_with_retry(
    sender: &dyn MessageSender,
    peer_id: i64,
    message: &OutgoingMessage,
    policy: &RetryPolicy,
) -> Result<(), SendError> {
    let mut attempt = 1;
    loop {
        match sender.send(peer_id, message).await {
            Err(e) if e.is_rate_limited() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "⏳ Rate limited sending to {peer_id} (attempt {attempt}/{}), retrying in {delay:?}",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails with the queued errors, then succeeds.
    struct Scripted {
        errors: Mutex<Vec<SendError>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut errors: Vec<SendError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl MessageSender for Scripted {
        async fn send(&self, _peer_id: i64, _message: &OutgoingMessage) -> Result<(), SendError> {
            *self.calls.lock().unwrap() += 1;
            match self.errors.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn msg() -> OutgoingMessage {
        OutgoingMessage::text("hi")
    }

    #[test]
    fn test_delays() {
        let fixed = RetryPolicy::fixed(Duration::from_millis(100), 2);
        assert_eq!(fixed.delay_after(1), Duration::from_millis(100));
        assert_eq!(fixed.delay_after(5), Duration::from_millis(100));

        let exp = RetryPolicy::exponential(Duration::from_millis(100), 10);
        assert_eq!(exp.delay_after(1), Duration::from_millis(100));
        assert_eq!(exp.delay_after(2), Duration::from_millis(200));
        assert_eq!(exp.delay_after(3), Duration::from_millis(400));
        assert_eq!(exp.delay_after(20), Duration::from_millis(3200));
    }

    #[tokio::test]
    async fn test_retries_rate_limit_then_succeeds() {
        let sender = Scripted::new(vec![SendError::RateLimited { code: 6 }]);
        let policy = RetryPolicy::fixed(Duration::ZERO, 2);
        assert!(send_with_retry(&sender, 1, &msg(), &policy).await.is_ok());
        assert_eq!(sender.calls(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sender = Scripted::new(vec![
            SendError::RateLimited { code: 6 },
            SendError::RateLimited { code: 6 },
            SendError::RateLimited { code: 6 },
        ]);
        let policy = RetryPolicy::exponential(Duration::ZERO, 2);
        let err = send_with_retry(&sender, 1, &msg(), &policy).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(sender.calls(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_not_retried() {
        let sender = Scripted::new(vec![SendError::Forbidden {
            code: 917,
            message: "no access".into(),
        }]);
        let policy = RetryPolicy::fixed(Duration::ZERO, 5);
        let err = send_with_retry(&sender, 1, &msg(), &policy).await.unwrap_err();
        assert!(matches!(err, SendError::Forbidden { .. }));
        assert_eq!(sender.calls(), 1);
    }
}
