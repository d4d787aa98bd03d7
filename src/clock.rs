use chrono::Utc;

use crate::models::TimestampMs;

/// Wall-clock source for deadlines. All scheduling decisions read time through this.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> TimestampMs;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::Clock;
    use crate::models::TimestampMs;

    /// A clock that only moves when a test moves it.
    #[derive(Debug)]
    pub(crate) struct ManualClock {
        now: AtomicI64,
    }

    impl ManualClock {
        pub(crate) fn new(now: TimestampMs) -> Self {
            Self {
                now: AtomicI64::new(now),
            }
        }

        pub(crate) fn advance(&self, ms: i64) {
            self.now.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> TimestampMs {
            self.now.load(Ordering::SeqCst)
        }
    }
}
