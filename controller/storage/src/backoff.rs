use rand::Rng;
use std::time::Duration;

/// Exponential backoff with up to 10% jitter. Attempt zero does not wait.
pub(crate) fn backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let delay_ms = base_ms
        .saturating_mul(2u64.saturating_pow(attempt - 1))
        .min(max_ms);

    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms + jitter)
}
