//! Suspend/resume signals for the scheduler.
//!
//! Monotonic timers stop while the machine sleeps, so a wake is detected by
//! comparing how far the wall clock moved against how far the monotonic clock
//! moved between two polls.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::clock::Clock;
use crate::models::Settings;
use crate::service::SchedulerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerEvent {
    Suspend,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeDetectorConfig {
    pub check_every: Duration,
    pub drift_threshold: Duration,
}

impl Default for WakeDetectorConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for WakeDetectorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            check_every: Duration::from_secs(settings.wake_check_interval_s.max(1)),
            drift_threshold: Duration::from_millis(settings.wake_drift_threshold_ms),
        }
    }
}

/// True when the wall clock ran ahead of the monotonic clock by more than the
/// threshold, which is what a suspend/resume cycle looks like.
pub fn looks_like_wake(wall_elapsed_ms: i64, mono_elapsed: Duration, threshold: Duration) -> bool {
    let mono_ms = i64::try_from(mono_elapsed.as_millis()).unwrap_or(i64::MAX);
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    wall_elapsed_ms.saturating_sub(mono_ms) > threshold_ms
}

/// Polls the clocks and forwards `Resume` to the scheduler whenever a wake is
/// detected. Ends when the scheduler has stopped.
pub async fn wake_detector_task(
    handle: SchedulerHandle,
    clock: Arc<dyn Clock>,
    config: WakeDetectorConfig,
) {
    log::info!(
        "wake detector started check_every_ms={} drift_threshold_ms={}",
        config.check_every.as_millis(),
        config.drift_threshold.as_millis()
    );
    let mut ticker = interval(config.check_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_wall = clock.now_ms();
    let mut last_mono = Instant::now();
    loop {
        ticker.tick().await;
        let wall = clock.now_ms();
        let mono = Instant::now();
        let wall_elapsed = wall - last_wall;
        let mono_elapsed = mono.duration_since(last_mono);
        last_wall = wall;
        last_mono = mono;

        if looks_like_wake(wall_elapsed, mono_elapsed, config.drift_threshold) {
            log::info!(
                "wake detected wall_elapsed_ms={wall_elapsed} mono_elapsed_ms={}",
                mono_elapsed.as_millis()
            );
            if handle.power_event(PowerEvent::Resume).is_err() {
                break;
            }
        }
    }
    log::info!("wake detector stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_clocks_are_not_a_wake() {
        let threshold = Duration::from_secs(5);
        assert!(!looks_like_wake(15_000, Duration::from_millis(15_000), threshold));
        assert!(!looks_like_wake(19_000, Duration::from_millis(15_000), threshold));
        assert!(!looks_like_wake(20_000, Duration::from_millis(15_000), threshold));
    }

    #[test]
    fn wall_clock_jump_beyond_threshold_is_a_wake() {
        let threshold = Duration::from_secs(5);
        assert!(looks_like_wake(
            2 * 60 * 60 * 1000,
            Duration::from_millis(15_000),
            threshold
        ));
        assert!(looks_like_wake(20_001, Duration::from_millis(15_000), threshold));
    }

    #[test]
    fn backwards_wall_clock_is_not_a_wake() {
        assert!(!looks_like_wake(
            -60_000,
            Duration::from_millis(15_000),
            Duration::from_secs(5)
        ));
    }

    #[test]
    fn config_follows_settings() {
        let mut settings = Settings::default();
        settings.wake_check_interval_s = 0;
        settings.wake_drift_threshold_ms = 2_500;
        let config = WakeDetectorConfig::from(&settings);
        assert_eq!(config.check_every, Duration::from_secs(1));
        assert_eq!(config.drift_threshold, Duration::from_millis(2_500));

        let defaults = WakeDetectorConfig::default();
        assert_eq!(defaults.check_every, Duration::from_secs(15));
        assert_eq!(defaults.drift_threshold, Duration::from_secs(5));
    }
}
