//! Exponential backoff with jitter for calls to flaky upstreams.
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter_fraction: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            max_retries,
            base_ms,
            max_ms,
            jitter_fraction: 0.2,
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Errors that may succeed when the same request is sent again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// `base * 2^attempt`, clamped to `max_ms`, then shifted by up to
/// `jitter_fraction` in either direction. `rand01` is expected in [0, 1).
pub fn backoff_delay_ms(policy: &RetryPolicy, attempt: u32, rand01: f64) -> u64 {
    let raw = policy
        .base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let clamped = raw.min(policy.max_ms);

    let jitter_raw = (clamped as f64) * policy.jitter_fraction;
    let centered = (rand01 * 2.0 - 1.0) * jitter_raw;

    (clamped as i64 + centered.round() as i64).max(0) as u64
}

pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay_ms = backoff_delay_ms(policy, attempt, rand::random::<f64>());
                warn!(op, attempt = attempt + 1, delay_ms, error = %e, "transient failure, retrying");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
