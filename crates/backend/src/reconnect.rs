//! Bounded exponential-backoff connect for the event feed.
//!
//! The feed is optional: if it cannot be opened after
//! [`ConnectRetry::max_attempts`] the caller falls back to job-status
//! polling. Cancellation is by dropping the returned future.

use std::time::Duration;

use postwise_core::types::JobId;

use crate::client::{EventConnection, EventFeedClient, FeedClientError};

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct ConnectRetry {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

/// Next backoff delay, clamped to [`ConnectRetry::max_delay`].
pub fn next_delay(current: Duration, config: &ConnectRetry) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Try to open the feed for `job_id`, backing off between attempts.
/// Returns the last connection error once attempts are exhausted.
pub async fn connect_with_backoff(
    client: &EventFeedClient,
    job_id: &JobId,
    config: &ConnectRetry,
) -> Result<EventConnection, FeedClientError> {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match client.connect(job_id).await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt >= config.max_attempts.max(1) => {
                tracing::warn!(job_id = %job_id, attempt, error = %e, "Giving up on event feed");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Event feed connect attempt {attempt} failed",
                );
            }
        }

        tokio::time::sleep(delay).await;
        delay = next_delay(delay, config);
    }
}
