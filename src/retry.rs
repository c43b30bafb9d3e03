use crate::config::RetryConfig;
use anyhow::Result;
use log::{error, warn};
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff applied to every generation call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_seconds: f64,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_delay_seconds: cfg.base_delay_seconds,
            jitter: cfg.jitter,
        }
    }
}

/// Rate-limit signatures seen from the generation backends. Anything else is
/// not worth retrying.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    let text = format!("{err:#}");
    text.contains("429") || text.contains("RESOURCE_EXHAUSTED")
}

/// Runs `op` until it succeeds, fails non-retryably, or exhausts the attempt
/// budget. The delay doubles after each retryable failure and is stretched by
/// a random jitter factor so synchronized callers fan out.
pub async fn retry_with_backoff<T, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&anyhow::Error) -> bool,
{
    let mut delay = policy.base_delay_seconds;
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }
                attempt += 1;
                if attempt >= policy.max_attempts {
                    error!("Max retries exceeded for {label} due to rate limit.");
                    return Err(e);
                }

                let sleep_secs = delay * (1.0 + rand::random::<f64>() * policy.jitter);
                warn!(
                    "Rate limit hit in {label}. Retrying in {sleep_secs:.2}s... (Attempt {attempt}/{})",
                    policy.max_attempts
                );
                tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
                delay *= 2.0;
            }
        }
    }
}
