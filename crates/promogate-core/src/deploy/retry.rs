//! Bounded exponential backoff for registry publishes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::collaborators::{ArtifactHandle, ArtifactPublisher, PublishError, PublishedRef, RegistryCredentials};
use crate::metrics::METRICS;
use crate::obs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure.
    pub backoff_base_ms: u64,
    /// Upper bound for any single delay.
    pub backoff_cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_cap_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self.backoff_base_ms.saturating_mul(factor).min(self.backoff_cap_ms);
        Duration::from_millis(ms)
    }
}

/// Result of publishing with retries.
#[derive(Debug, Clone)]
pub struct PublishAttempts {
    pub result: Result<PublishedRef, PublishError>,
    pub attempts: u32,
    /// The deadline cut the sequence short: an attempt was still running
    /// when it passed, or the next backoff would have ended after it.
    pub timed_out: bool,
}

/// Publish `artifact`, retrying transient failures per `policy`, and give
/// up at `deadline`.
///
/// Fatal errors return immediately. The last transient error is returned
/// once attempts are exhausted. Each publish call runs under the deadline,
/// and a backoff that would end past it is not slept.
pub async fn publish_with_retry(
    publisher: &dyn ArtifactPublisher,
    artifact: &ArtifactHandle,
    credentials: &RegistryCredentials,
    policy: &RetryPolicy,
    deadline: Instant,
) -> PublishAttempts {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result =
            match tokio::time::timeout_at(deadline, publisher.publish(artifact, credentials)).await {
                Ok(result) => result,
                Err(_) => {
                    return PublishAttempts {
                        result: Err(PublishError::Transient(format!(
                            "attempt {attempt} still pending at deadline"
                        ))),
                        attempts: attempt,
                        timed_out: true,
                    }
                }
            };
        match result {
            Ok(published) => {
                return PublishAttempts {
                    result: Ok(published),
                    attempts: attempt,
                    timed_out: false,
                }
            }
            Err(err @ PublishError::Transient(_)) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                if Instant::now() + delay >= deadline {
                    return PublishAttempts {
                        result: Err(err),
                        attempts: attempt,
                        timed_out: true,
                    };
                }
                obs::emit_publish_retry(artifact.as_str(), attempt, delay.as_millis() as u64, &err);
                METRICS.inc_publish_retries();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                return PublishAttempts {
                    result: Err(err),
                    attempts: attempt,
                    timed_out: false,
                }
            }
        }
    }
}
