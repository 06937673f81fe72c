use std::time::Duration;

const MAX_BACKOFF_SECS: u64 = 5;

/// Delay before retrying after the zero-based `attempt` failed.
///
/// Doubles each attempt and is capped at five seconds.
pub fn retry_backoff(attempt: u32) -> Duration {
    let secs = 2u64
        .checked_pow(attempt)
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}
