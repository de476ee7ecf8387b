//! Log throttling utility
//!
//! Hot loops (frame capture, recognition round-trips) can fail on every
//! iteration while a device or the recognition service is down. The throttler
//! lets the first failure through, swallows repeats for an interval and
//! reports how many were swallowed on the next line that gets logged.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct KeyState {
    last_logged: Instant,
    suppressed: u64,
}

/// Per-key log rate limiter
///
/// # Example
///
/// ```rust
/// use signcam::utils::LogThrottler;
///
/// let throttler = LogThrottler::with_secs(5);
/// assert_eq!(throttler.check("recognition_transport"), Some(0));
/// assert_eq!(throttler.check("recognition_transport"), None);
/// ```
pub struct LogThrottler {
    keys: Mutex<HashMap<String, KeyState>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Decide whether a message for `key` should be emitted now.
    ///
    /// Returns `Some(n)` when the caller should log, where `n` is the number of
    /// messages suppressed since the last emitted one. Returns `None` when the
    /// message should be dropped (it is counted towards the next `Some`).
    pub fn check(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let mut keys = self.keys.lock();

        match keys.get_mut(key) {
            Some(state) if now.duration_since(state.last_logged) < self.interval => {
                state.suppressed = state.suppressed.saturating_add(1);
                None
            }
            Some(state) => {
                let suppressed = std::mem::take(&mut state.suppressed);
                state.last_logged = now;
                Some(suppressed)
            }
            None => {
                keys.insert(
                    key.to_string(),
                    KeyState {
                        last_logged: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }

    /// Forget a key, e.g. after the failing condition recovered
    pub fn clear(&self, key: &str) {
        self.keys.lock().remove(key);
    }
}

/// Throttled warning; appends the suppressed-repeat count when non-zero
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        match $throttler.check($key) {
            Some(0) => tracing::warn!($($arg)*),
            Some(n) => tracing::warn!(suppressed = n, $($arg)*),
            None => {}
        }
    };
}

/// Throttled error; appends the suppressed-repeat count when non-zero
#[macro_export]
macro_rules! error_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        match $throttler.check($key) {
            Some(0) => tracing::error!($($arg)*),
            Some(n) => tracing::error!(suppressed = n, $($arg)*),
            None => {}
        }
    };
}
