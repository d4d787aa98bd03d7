use std::time::Duration;

use crate::events::CoreEvent;
use crate::models::{ReminderId, TimerId, TimestampMs};
use crate::store::ScheduleStore;

/// Key of a single-shot wakeup. `token` changes on every arm, so a wakeup that
/// belongs to a superseded schedule is recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alarm {
    Timer { id: TimerId, token: u64 },
    Reminder { id: ReminderId, token: u64 },
}

/// Everything the scheduling core needs from its surroundings.
///
/// The event loop provides the production implementation; tests drive the core
/// with a manual clock and deliver alarms by hand.
pub trait SchedulerCtx {
    fn now_ms(&self) -> TimestampMs;
    fn store(&mut self) -> &mut ScheduleStore;
    /// Requests that `alarm` be delivered back to the core after `delay`.
    fn arm(&mut self, alarm: Alarm, delay: Duration);
    /// Drops a pending wakeup. Disarming an alarm that already fired is a no-op.
    fn disarm(&mut self, alarm: Alarm);
    fn publish(&mut self, event: CoreEvent);
}

pub(crate) fn delay_until(deadline: TimestampMs, now: TimestampMs) -> Duration {
    Duration::from_millis(deadline.saturating_sub(now).max(0) as u64)
}
