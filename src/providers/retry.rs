use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            max_elapsed: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `attempt` (1-based).
    pub(crate) fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.max_delay)
    }

    /// Delay actually waited: jittered backoff, raised to `retry-after`
    /// when the server asked for longer.
    pub(crate) fn delay_for(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        let delay = with_jitter(self.backoff(attempt), jitter_seed());
        match retry_after {
            Some(requested) if requested > delay => requested.min(self.max_delay.max(delay)),
            _ => delay,
        }
    }

    pub(crate) fn has_budget(&self, attempt: usize, elapsed: Duration, next_wait: Duration) -> bool {
        attempt < self.max_attempts && elapsed.saturating_add(next_wait) <= self.max_elapsed
    }
}

/// Equal jitter: half the delay is fixed, the other half scales with `seed`.
pub(crate) fn with_jitter(delay: Duration, seed: u32) -> Duration {
    let half = delay / 2;
    let fraction = (seed % 1000) as f64 / 1000.0;
    half + half.mul_f64(fraction)
}

fn jitter_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|now| now.subsec_nanos())
        .unwrap_or(0)
}

pub(crate) fn is_retryable_status(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
        return true;
    }
    if status.is_server_error() || status.as_u16() == 529 {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("resource_exhausted")
        || lower.contains("overloaded")
}

pub(crate) fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) async fn wait_before_retry(provider: &str, attempt: usize, max: usize, wait: Duration) {
    warn!(
        "{} call failed; retrying in {:.1}s (attempt {}/{})",
        provider,
        wait.as_secs_f32(),
        attempt,
        max
    );
    sleep(wait).await;
}
