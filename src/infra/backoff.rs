//! Retry backoff and bounded polling

use crate::config::{BackoffConfig, PollingConfig};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Deterministic exponential delay: `min(base * 2^retry_count, cap)`.
pub fn base_delay(config: &BackoffConfig, retry_count: u32) -> Duration {
	let exp = config
		.base_ms
		.saturating_mul(1u64.checked_shl(retry_count).unwrap_or(u64::MAX));
	Duration::from_millis(exp.min(config.cap_ms))
}

/// Jittered retry delay, uniformly drawn from `[base/2, base]` so concurrent
/// retries from several queue items don't line up. Always within the cap.
pub fn retry_delay(config: &BackoffConfig, retry_count: u32) -> Duration {
	let base = base_delay(config, retry_count);
	let half = base / 2;
	half + rand::thread_rng().gen_range(Duration::ZERO..=base - half)
}

/// Outcome of a bounded poll: either the condition was observed or the
/// attempt budget ran out, leaving state unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
	Confirmed(T),
	Exhausted,
}

/// Poll `check` up to the configured attempt count, sleeping the configured
/// interval between attempts. Used for deferred confirmations (payment
/// webhooks) that land remotely some time after the local action.
pub async fn bounded_poll<T, F, Fut>(config: &PollingConfig, mut check: F) -> PollOutcome<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Option<T>>,
{
	for attempt in 0..config.premium_attempts {
		if let Some(value) = check().await {
			return PollOutcome::Confirmed(value);
		}
		debug!(attempt, "Poll condition not yet met");
		if attempt + 1 < config.premium_attempts {
			sleep(Duration::from_millis(config.premium_interval_ms)).await;
		}
	}
	PollOutcome::Exhausted
}
