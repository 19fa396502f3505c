//! Time-related abstractions.
//!
//! - On native platforms: `tokio::time`
//! - On WASM: `gloo-timers` backed by the browser's `setTimeout`
//!
//! Token expiry is expressed as wall-clock timestamps (`chrono::DateTime`)
//! by the auth core; [`duration_until_millis`] converts such an instant into
//! the relative delay the timers need.

#[cfg(not(target_arch = "wasm32"))]
pub use tokio::time::{sleep, timeout, Sleep, Timeout};

pub use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[cfg(target_arch = "wasm32")]
pub use std::time::{SystemTime, UNIX_EPOCH};

/// Sleeps for the specified duration using the browser's timer queue.
#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    let millis = duration.as_millis().min(u32::MAX as u128) as u32;
    gloo_timers::future::TimeoutFuture::new(millis).await;
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[cfg(not(target_arch = "wasm32"))]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[cfg(target_arch = "wasm32")]
pub fn now_millis() -> u64 {
    js_sys::Date::now() as u64
}

/// Delay from now until the given Unix timestamp (milliseconds).
///
/// Instants in the past yield [`Duration::ZERO`] so timers fire immediately.
pub fn duration_until_millis(deadline_millis: i64) -> Duration {
    let now = now_millis() as i64;
    if deadline_millis <= now {
        Duration::ZERO
    } else {
        Duration::from_millis((deadline_millis - now) as u64)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn past_deadline_is_zero() {
        let past = now_millis() as i64 - 1;
        assert_eq!(duration_until_millis(past), Duration::ZERO);
    }

    #[test]
    fn future_deadline_is_positive() {
        let future = now_millis() as i64 + 60_000;
        let delay = duration_until_millis(future);
        assert!(delay > Duration::from_secs(59));
        assert!(delay <= Duration::from_secs(60));
    }
}
