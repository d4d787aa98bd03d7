use std::collections::HashMap;

use crate::ctx::{delay_until, Alarm, SchedulerCtx};
use crate::error::CoreError;
use crate::events::CoreEvent;
use crate::models::{Reminder, ReminderId, ReminderStatus};

/// Per-reminder single-shot handles plus the periodic sweep.
///
/// Both triggers converge on [`ReminderScheduler::fire`], which commits
/// `scheduled -> fired` through the store's check-and-set, so whichever trigger
/// runs second finds nothing to do.
#[derive(Debug, Default)]
pub struct ReminderScheduler {
    pending: HashMap<ReminderId, u64>,
    next_token: u64,
}

impl ReminderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, id: ReminderId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Persists a new reminder and arms its handle. A `fire_at` that is not in
    /// the future is rejected.
    pub fn create(
        &mut self,
        ctx: &mut impl SchedulerCtx,
        message: &str,
        fire_at: i64,
    ) -> Result<Reminder, CoreError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(CoreError::validation("reminder message must not be empty"));
        }
        let now = ctx.now_ms();
        if fire_at <= now {
            return Err(CoreError::validation(format!(
                "reminder time must be in the future (fire_at={fire_at}, now={now})"
            )));
        }
        let reminder = ctx.store().insert_reminder(message, fire_at, now)?;
        log::info!("reminder created id={} fire_at={fire_at}", reminder.id);
        self.schedule(ctx, &reminder);
        Ok(reminder)
    }

    /// Arms a handle for `max(0, fire_at - now)`, replacing any earlier one.
    pub fn schedule(&mut self, ctx: &mut impl SchedulerCtx, reminder: &Reminder) {
        self.cancel(ctx, reminder.id);
        let now = ctx.now_ms();
        self.next_token += 1;
        let token = self.next_token;
        self.pending.insert(reminder.id, token);
        ctx.arm(
            Alarm::Reminder {
                id: reminder.id,
                token,
            },
            delay_until(reminder.fire_at, now),
        );
        log::debug!("reminder armed id={} fire_at={}", reminder.id, reminder.fire_at);
    }

    /// Drops the pending handle, if any. Persisting `canceled` is up to the caller.
    pub fn cancel(&mut self, ctx: &mut impl SchedulerCtx, id: ReminderId) -> bool {
        match self.pending.remove(&id) {
            Some(token) => {
                ctx.disarm(Alarm::Reminder { id, token });
                true
            }
            None => false,
        }
    }

    /// Same as [`ReminderScheduler::cancel`]; removing the row is up to the caller.
    pub fn delete(&mut self, ctx: &mut impl SchedulerCtx, id: ReminderId) -> bool {
        self.cancel(ctx, id)
    }

    /// Throws away every handle and re-derives them from the store. Reminders whose
    /// time passed while nothing was armed fire immediately.
    pub fn reschedule_all(&mut self, ctx: &mut impl SchedulerCtx) -> Result<usize, CoreError> {
        for (id, token) in self.pending.drain() {
            ctx.disarm(Alarm::Reminder { id, token });
        }
        let now = ctx.now_ms();
        let mut armed = 0;
        let mut first_err = None;
        for reminder in ctx.store().reminders_with_status(ReminderStatus::Scheduled) {
            if reminder.fire_at > now {
                self.schedule(ctx, &reminder);
                armed += 1;
            } else if let Err(err) = self.fire(ctx, reminder.id) {
                log::warn!("missed reminder not persisted id={} err={err}", reminder.id);
                first_err.get_or_insert(err);
            }
        }
        log::info!("reminders rescheduled armed={armed}");
        match first_err {
            Some(err) => Err(err),
            None => Ok(armed),
        }
    }

    /// Fires every scheduled reminder that is due. Returns how many fired.
    pub fn sweep(&mut self, ctx: &mut impl SchedulerCtx) -> usize {
        let now = ctx.now_ms();
        let due: Vec<ReminderId> = ctx
            .store()
            .reminders_with_status(ReminderStatus::Scheduled)
            .into_iter()
            .filter(|reminder| reminder.is_due(now))
            .map(|reminder| reminder.id)
            .collect();
        let mut fired = 0;
        for id in due {
            match self.fire(ctx, id) {
                Ok(Some(_)) => fired += 1,
                Ok(None) => {}
                Err(err) => log::warn!("sweep could not fire reminder id={id} err={err}"),
            }
        }
        fired
    }

    /// Delivery of a single-shot handle. Superseded tokens are ignored.
    pub fn on_alarm(&mut self, ctx: &mut impl SchedulerCtx, id: ReminderId, token: u64) {
        if self.pending.get(&id) != Some(&token) {
            log::debug!("stale reminder alarm id={id} token={token}");
            return;
        }
        if let Err(err) = self.fire(ctx, id) {
            // The row is still scheduled; the sweep retries it.
            log::warn!("reminder fire not persisted id={id} err={err}");
        }
    }

    /// Commits `scheduled -> fired` and notifies the sink exactly once.
    pub fn fire(
        &mut self,
        ctx: &mut impl SchedulerCtx,
        id: ReminderId,
    ) -> Result<Option<Reminder>, CoreError> {
        let fired = ctx.store().mark_reminder_fired(id)?;
        self.cancel(ctx, id);
        if let Some(reminder) = &fired {
            log::info!("reminder fired id={id}");
            ctx.publish(CoreEvent::ReminderFired(reminder.clone()));
        }
        Ok(fired)
    }

    pub fn shutdown(&mut self, ctx: &mut impl SchedulerCtx) {
        for (id, token) in self.pending.drain() {
            ctx.disarm(Alarm::Reminder { id, token });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestCtx, T0};
    use std::time::Duration;

    fn fire_alarm(scheduler: &mut ReminderScheduler, ctx: &mut TestCtx, alarm: Alarm) {
        match alarm {
            Alarm::Reminder { id, token } => scheduler.on_alarm(ctx, id, token),
            Alarm::Timer { .. } => panic!("not a reminder alarm"),
        }
    }

    #[test]
    fn create_validates_message_and_future_fire_at() {
        let mut ctx = TestCtx::new();
        let mut scheduler = ReminderScheduler::new();
        assert!(matches!(
            scheduler.create(&mut ctx, "   ", T0 + 1_000),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            scheduler.create(&mut ctx, "late", T0),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            scheduler.create(&mut ctx, "late", T0 - 1),
            Err(CoreError::Validation(_))
        ));
        assert!(ctx.store.list_reminders().is_empty());

        let reminder = scheduler.create(&mut ctx, " drink water ", T0 + 200).unwrap();
        assert_eq!(reminder.message, "drink water");
        assert_eq!(reminder.status, ReminderStatus::Scheduled);
        assert_eq!(reminder.created_at, T0);
        assert!(scheduler.is_pending(reminder.id));
        assert_eq!(ctx.live_alarms()[0].1, Duration::from_millis(200));
    }

    #[test]
    fn handle_and_sweep_race_fires_once() {
        let mut ctx = TestCtx::new();
        let mut scheduler = ReminderScheduler::new();
        let reminder = scheduler.create(&mut ctx, "stretch", T0 + 200).unwrap();
        let alarm = ctx.last_armed();

        ctx.advance(300);
        assert_eq!(scheduler.sweep(&mut ctx), 1);
        fire_alarm(&mut scheduler, &mut ctx, alarm);
        assert_eq!(scheduler.sweep(&mut ctx), 0);

        assert_eq!(ctx.reminder_events(), 1);
        assert_eq!(
            ctx.store.reminder(reminder.id).unwrap().status,
            ReminderStatus::Fired
        );
        assert!(!scheduler.is_pending(reminder.id));
    }

    #[test]
    fn handle_first_then_sweep_fires_once() {
        let mut ctx = TestCtx::new();
        let mut scheduler = ReminderScheduler::new();
        scheduler.create(&mut ctx, "stretch", T0 + 200).unwrap();
        let alarm = ctx.last_armed();

        ctx.advance(200);
        fire_alarm(&mut scheduler, &mut ctx, alarm);
        fire_alarm(&mut scheduler, &mut ctx, alarm);
        assert_eq!(scheduler.sweep(&mut ctx), 0);
        assert_eq!(ctx.reminder_events(), 1);
    }

    #[test]
    fn sweep_ignores_future_and_terminal_reminders() {
        let mut ctx = TestCtx::new();
        let mut scheduler = ReminderScheduler::new();
        let future = scheduler.create(&mut ctx, "later", T0 + 10_000).unwrap();
        let canceled = scheduler.create(&mut ctx, "nope", T0 + 100).unwrap();
        ctx.store.cancel_reminder(canceled.id).unwrap();
        scheduler.cancel(&mut ctx, canceled.id);

        ctx.advance(500);
        assert_eq!(scheduler.sweep(&mut ctx), 0);
        assert!(ctx.events.is_empty());
        assert!(scheduler.is_pending(future.id));
    }

    #[test]
    fn cancel_clears_handle_and_is_a_no_op_without_one() {
        let mut ctx = TestCtx::new();
        let mut scheduler = ReminderScheduler::new();
        let reminder = scheduler.create(&mut ctx, "x", T0 + 1_000).unwrap();
        let alarm = ctx.last_armed();

        assert!(scheduler.cancel(&mut ctx, reminder.id));
        assert!(!scheduler.cancel(&mut ctx, reminder.id));
        assert!(!scheduler.delete(&mut ctx, 404));
        assert!(ctx.live_alarms().is_empty());

        // A late delivery of the cancelled handle is dropped.
        ctx.advance(1_000);
        fire_alarm(&mut scheduler, &mut ctx, alarm);
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn reschedule_after_restart_fires_once_at_or_after_fire_at() {
        let mut ctx = TestCtx::new();
        let mut scheduler = ReminderScheduler::new();
        let reminder = scheduler.create(&mut ctx, "call back", T0 + 200).unwrap();

        // Process restarts before the handle fires; nothing in memory survives.
        ctx.advance(50);
        let mut ctx = ctx.restart();
        let mut scheduler = ReminderScheduler::new();
        assert_eq!(scheduler.reschedule_all(&mut ctx).unwrap(), 1);
        assert!(ctx.events.is_empty());
        assert_eq!(ctx.live_alarms()[0].1, Duration::from_millis(150));

        let alarm = ctx.last_armed();
        ctx.advance(150);
        fire_alarm(&mut scheduler, &mut ctx, alarm);
        scheduler.sweep(&mut ctx);

        assert_eq!(ctx.reminder_events(), 1);
        match &ctx.events[0] {
            CoreEvent::ReminderFired(fired) => {
                assert_eq!(fired.id, reminder.id);
                assert!(ctx.now >= fired.fire_at);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn reschedule_after_sleep_fires_missed_reminders_immediately() {
        let mut ctx = TestCtx::new();
        let mut scheduler = ReminderScheduler::new();
        let missed = scheduler.create(&mut ctx, "missed", T0 + 1_000).unwrap();
        let upcoming = scheduler.create(&mut ctx, "upcoming", T0 + 3 * 60 * 60 * 1000).unwrap();

        ctx.advance(2 * 60 * 60 * 1000);
        assert_eq!(scheduler.reschedule_all(&mut ctx).unwrap(), 1);

        assert_eq!(ctx.reminder_events(), 1);
        assert_eq!(ctx.store.reminder(missed.id).unwrap().status, ReminderStatus::Fired);
        assert!(!scheduler.is_pending(missed.id));
        assert!(scheduler.is_pending(upcoming.id));
        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(ctx.live_alarms().len(), 1);
    }

    #[test]
    fn failed_fire_keeps_reminder_scheduled_for_the_sweep() {
        let mut ctx = TestCtx::new();
        let mut scheduler = ReminderScheduler::new();
        let reminder = scheduler.create(&mut ctx, "x", T0 + 100).unwrap();
        let alarm = ctx.last_armed();
        ctx.advance(100);

        ctx.break_storage();
        fire_alarm(&mut scheduler, &mut ctx, alarm);
        assert!(ctx.events.is_empty());
        assert_eq!(
            ctx.store.reminder(reminder.id).unwrap().status,
            ReminderStatus::Scheduled
        );
        assert_eq!(scheduler.sweep(&mut ctx), 0);

        ctx.repair_storage();
        assert_eq!(scheduler.sweep(&mut ctx), 1);
        assert_eq!(ctx.reminder_events(), 1);
    }

    #[test]
    fn shutdown_disarms_all_pending_handles() {
        let mut ctx = TestCtx::new();
        let mut scheduler = ReminderScheduler::new();
        scheduler.create(&mut ctx, "a", T0 + 100).unwrap();
        scheduler.create(&mut ctx, "b", T0 + 200).unwrap();
        scheduler.shutdown(&mut ctx);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(ctx.live_alarms().is_empty());
    }
}
