/// Exponential backoff for collaborator calls: base 2 s doubled per
/// attempt, capped at 30 s, with a uniform jitter on top.
use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Backoff {
    /// Total attempt budget, including the first call.
    pub attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    /// Upper bound of the uniform jitter added to every delay.
    pub jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 5,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(30),
            jitter: Duration::from_millis(500),
        }
    }
}

impl Backoff {
    /// Delay after the given failed attempt (1-based).
    fn delay(&self, attempt: u32) -> Duration {
        let doubled = self.base.saturating_mul(1u32 << (attempt - 1).min(16));
        let mut delay = doubled.min(self.cap);
        if !self.jitter.is_zero() {
            delay += self.jitter.mul_f64(rand::rng().random::<f64>());
        }
        delay
    }
}

/// Run `call` until it succeeds or the attempt budget is exhausted;
/// the error of the last attempt is returned.
pub async fn with_backoff<T, E, F, Fut>(
    policy: &Backoff,
    operation: &str,
    mut call: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let budget = policy.attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < budget => {
                let delay = policy.delay(attempt);
                warn!(
                    operation,
                    attempt,
                    budget,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "collaborator call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Backoff {
        Backoff {
            attempts: 5,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(4),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = Backoff {
            jitter: Duration::ZERO,
            ..Backoff::default()
        };
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(16));
        assert_eq!(policy.delay(5), Duration::from_secs(30));
        assert_eq!(policy.delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_under_bound() {
        let policy = Backoff::default();
        for attempt in 1..=5 {
            let bare = Backoff {
                jitter: Duration::ZERO,
                ..policy.clone()
            }
            .delay(attempt);
            let jittered = policy.delay(attempt);
            assert!(jittered >= bare);
            assert!(jittered < bare + Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let mut calls = 0u32;
        let result: Result<u32, String> = with_backoff(&fast(), "plan", || {
            calls += 1;
            let outcome = if calls < 3 {
                Err("transient".to_string())
            } else {
                Ok(calls)
            };
            async move { outcome }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_last_error() {
        let mut calls = 0u32;
        let result: Result<(), String> = with_backoff(&fast(), "plan", || {
            calls += 1;
            let err = format!("boom {calls}");
            async move { Err(err) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "boom 5");
        assert_eq!(calls, 5);
    }
}
