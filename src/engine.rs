use crate::ctx::{Alarm, SchedulerCtx};
use crate::error::CoreError;
use crate::events::CoreEvent;
use crate::models::{Reminder, ReminderId, TimerId, TimerView};
use crate::power::PowerEvent;
use crate::scheduler::ReminderScheduler;
use crate::timers::TimerEngine;

/// The scheduling core: timer engine, reminder scheduler and the context they
/// share. Constructed once per process and torn down with [`Engine::shutdown`].
pub struct Engine<C: SchedulerCtx> {
    ctx: C,
    timers: TimerEngine,
    reminders: ReminderScheduler,
}

impl<C: SchedulerCtx> Engine<C> {
    pub fn new(ctx: C) -> Self {
        Self {
            ctx,
            timers: TimerEngine::new(),
            reminders: ReminderScheduler::new(),
        }
    }

    pub fn ctx(&self) -> &C {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn timers(&self) -> &TimerEngine {
        &self.timers
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    /// Rebuilds all in-memory handles from the store. Called on process start.
    pub fn start(&mut self) -> Result<(), CoreError> {
        let timers = self.timers.restore_all(&mut self.ctx);
        let reminders = self.reminders.reschedule_all(&mut self.ctx);
        timers?;
        reminders?;
        Ok(())
    }

    pub fn create_timer(&mut self, name: &str, total_seconds: f64) -> Result<TimerView, CoreError> {
        self.timers.create(&mut self.ctx, name, total_seconds)
    }

    pub fn list_timers(&mut self) -> Vec<TimerView> {
        self.timers.list(&mut self.ctx)
    }

    pub fn pause_timer(&mut self, id: TimerId) -> Result<Option<TimerView>, CoreError> {
        self.timers.pause(&mut self.ctx, id)
    }

    pub fn resume_timer(&mut self, id: TimerId) -> Result<Option<TimerView>, CoreError> {
        self.timers.resume(&mut self.ctx, id)
    }

    pub fn cancel_timer(&mut self, id: TimerId) -> Result<Option<TimerView>, CoreError> {
        self.timers.cancel(&mut self.ctx, id)
    }

    pub fn delete_timer(&mut self, id: TimerId) -> Result<bool, CoreError> {
        self.timers.delete(&mut self.ctx, id)
    }

    pub fn create_reminder(&mut self, message: &str, fire_at: i64) -> Result<Reminder, CoreError> {
        self.reminders.create(&mut self.ctx, message, fire_at)
    }

    pub fn list_reminders(&mut self) -> Vec<Reminder> {
        self.ctx.store().list_reminders()
    }

    /// Persists `canceled` and drops the pending handle. `false` when the
    /// reminder is unknown or already terminal.
    pub fn cancel_reminder(&mut self, id: ReminderId) -> Result<bool, CoreError> {
        let canceled = self.ctx.store().cancel_reminder(id)?;
        self.reminders.cancel(&mut self.ctx, id);
        if canceled {
            log::info!("reminder canceled id={id}");
        }
        Ok(canceled)
    }

    /// Removes the row and drops the pending handle so it can never fire.
    pub fn delete_reminder(&mut self, id: ReminderId) -> Result<bool, CoreError> {
        let removed = self.ctx.store().delete_reminder(id)?;
        self.reminders.delete(&mut self.ctx, id);
        if removed {
            log::info!("reminder deleted id={id}");
        }
        Ok(removed)
    }

    pub fn on_alarm(&mut self, alarm: Alarm) {
        match alarm {
            Alarm::Timer { id, token } => self.timers.on_alarm(&mut self.ctx, id, token),
            Alarm::Reminder { id, token } => self.reminders.on_alarm(&mut self.ctx, id, token),
        }
    }

    /// Periodic redundancy pass over both tables, independent of single-shot handles.
    pub fn sweep(&mut self) {
        self.reminders.sweep(&mut self.ctx);
        self.timers.finish_overdue(&mut self.ctx);
    }

    pub fn on_power(&mut self, event: PowerEvent) {
        match event {
            PowerEvent::Suspend => log::info!("system suspending"),
            PowerEvent::Resume => {
                log::info!("system resumed, re-deriving deadlines");
                if let Err(err) = self.timers.restore_all(&mut self.ctx) {
                    log::error!("timer restore after resume incomplete err={err}");
                }
                if let Err(err) = self.reminders.reschedule_all(&mut self.ctx) {
                    log::error!("reminder reschedule after resume incomplete err={err}");
                }
                self.ctx.publish(CoreEvent::SystemResumed);
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.timers.shutdown(&mut self.ctx);
        self.reminders.shutdown(&mut self.ctx);
        log::info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReminderStatus, TimerStatus};
    use crate::test_support::{TestCtx, T0};

    fn engine() -> Engine<TestCtx> {
        Engine::new(TestCtx::new())
    }

    #[test]
    fn tea_timer_fires_exactly_once() {
        let mut engine = engine();
        let view = engine.create_timer("Tea", 1.0).unwrap();
        let alarm = engine.ctx().last_armed();

        engine.ctx_mut().advance(1_000);
        engine.on_alarm(alarm);
        engine.sweep();
        engine.on_alarm(alarm);

        let events = &engine.ctx().events;
        assert_eq!(events.len(), 1);
        match &events[0] {
            CoreEvent::TimerFired(timer) => {
                assert_eq!(timer.id, view.id);
                assert_eq!(timer.name, "Tea");
                assert_eq!(timer.status, TimerStatus::Done);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn paused_hour_timer_keeps_remaining_and_stays_quiet() {
        let mut engine = engine();
        let view = engine.create_timer("deep work", 3600.0).unwrap();

        engine.ctx_mut().advance(10_000);
        let paused = engine.pause_timer(view.id).unwrap().unwrap();
        assert_eq!(paused.remaining_ms, 3_590_000);

        engine.ctx_mut().advance(5_000);
        let resumed = engine.resume_timer(view.id).unwrap().unwrap();
        let now = engine.ctx().now;
        assert_eq!(resumed.deadline, Some(now + 3_590_000));
        assert_eq!(resumed.total_ms, view.total_ms);

        engine.ctx_mut().advance(3_589_999);
        engine.sweep();
        assert!(engine.ctx().events.is_empty());
        engine.ctx_mut().advance(1);
        engine.sweep();
        assert_eq!(engine.ctx().timer_events(), 1);
    }

    #[test]
    fn running_views_satisfy_remaining_equals_deadline_minus_now() {
        let mut engine = engine();
        engine.create_timer("a", 90.0).unwrap();
        let b = engine.create_timer("b", 30.0).unwrap();
        engine.ctx_mut().advance(12_345);
        engine.pause_timer(b.id).unwrap();
        engine.resume_timer(b.id).unwrap();
        engine.ctx_mut().advance(2_000);

        let now = engine.ctx().now;
        for view in engine.list_timers() {
            assert_eq!(view.status, TimerStatus::Running);
            let deadline = view.deadline.expect("running timers have a deadline");
            assert_eq!(view.remaining_ms, (deadline - now).max(0));
            assert!(engine.timers().is_armed(view.id));
        }
        assert_eq!(engine.timers().armed_count(), 2);
        assert_eq!(engine.ctx().live_alarms().len(), 2);
    }

    #[test]
    fn reminder_survives_restart_and_fires_once() {
        let mut engine = engine();
        let reminder = engine.create_reminder("standup", T0 + 200).unwrap();

        let ctx = Engine::into_ctx(engine).restart();
        let mut engine = Engine::new(ctx);
        engine.start().unwrap();
        assert!(engine.reminders().is_pending(reminder.id));

        engine.ctx_mut().advance(200);
        let alarm = engine.ctx().last_armed();
        engine.sweep();
        engine.on_alarm(alarm);

        assert_eq!(engine.ctx().reminder_events(), 1);
        assert_eq!(
            engine.ctx().store.reminder(reminder.id).unwrap().status,
            ReminderStatus::Fired
        );
    }

    #[test]
    fn resume_after_two_hours_completes_ten_minute_timer_once() {
        let mut engine = engine();
        let view = engine.create_timer("laundry", 600.0).unwrap();
        let stale = engine.ctx().last_armed();

        engine.on_power(PowerEvent::Suspend);
        engine.ctx_mut().advance(2 * 60 * 60 * 1000);
        engine.on_power(PowerEvent::Resume);
        engine.on_alarm(stale);
        engine.sweep();

        let events = &engine.ctx().events;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], CoreEvent::TimerFired(t) if t.id == view.id));
        assert_eq!(events[1], CoreEvent::SystemResumed);
        assert!(engine.ctx().live_alarms().is_empty());
        assert!(engine
            .ctx()
            .armed
            .iter()
            .all(|(_, delay)| !delay.is_zero()));
    }

    #[test]
    fn resume_rearms_timers_and_reminders_that_are_still_ahead() {
        let mut engine = engine();
        let timer = engine.create_timer("long", 3.0 * 3600.0).unwrap();
        let reminder = engine.create_reminder("later", T0 + 4 * 3600 * 1000).unwrap();

        engine.ctx_mut().advance(3600 * 1000);
        engine.on_power(PowerEvent::Resume);

        assert_eq!(engine.ctx().events, vec![CoreEvent::SystemResumed]);
        assert_eq!(
            engine.timers().armed_deadline(timer.id),
            Some(T0 + 3 * 3600 * 1000)
        );
        assert!(engine.reminders().is_pending(reminder.id));
        assert_eq!(engine.ctx().live_alarms().len(), 2);
    }

    #[test]
    fn cancel_then_pause_is_a_no_op() {
        let mut engine = engine();
        let view = engine.create_timer("x", 60.0).unwrap();
        engine.cancel_timer(view.id).unwrap();
        let after = engine.pause_timer(view.id).unwrap().unwrap();
        assert_eq!(after.status, TimerStatus::Cancelled);
    }

    #[test]
    fn cancel_and_delete_reminder_persist_and_disarm() {
        let mut engine = engine();
        let a = engine.create_reminder("a", T0 + 1_000).unwrap();
        let b = engine.create_reminder("b", T0 + 2_000).unwrap();

        assert!(engine.cancel_reminder(a.id).unwrap());
        assert!(!engine.cancel_reminder(a.id).unwrap());
        assert!(!engine.reminders().is_pending(a.id));

        assert!(engine.delete_reminder(b.id).unwrap());
        assert!(!engine.delete_reminder(b.id).unwrap());
        assert!(!engine.reminders().is_pending(b.id));

        engine.ctx_mut().advance(5_000);
        engine.sweep();
        assert!(engine.ctx().events.is_empty());

        let listed = engine.list_reminders();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ReminderStatus::Canceled);
    }

    #[test]
    fn cancel_reminder_failure_keeps_handle() {
        let mut engine = engine();
        let reminder = engine.create_reminder("a", T0 + 1_000).unwrap();
        engine.ctx().break_storage();
        assert!(engine.cancel_reminder(reminder.id).is_err());
        assert!(engine.reminders().is_pending(reminder.id));
        assert!(engine.delete_reminder(reminder.id).is_err());
        assert!(engine.reminders().is_pending(reminder.id));
    }

    #[test]
    fn start_completes_overdue_rows_and_fires_missed_reminders() {
        let mut engine = engine();
        engine.create_timer("t", 10.0).unwrap();
        engine.create_reminder("r", T0 + 10_000).unwrap();

        engine.ctx_mut().advance(60_000);
        let ctx = Engine::into_ctx(engine).restart();
        let mut engine = Engine::new(ctx);
        engine.start().unwrap();

        assert_eq!(engine.ctx().timer_events(), 1);
        assert_eq!(engine.ctx().reminder_events(), 1);
        assert_eq!(engine.timers().armed_count(), 0);
        assert_eq!(engine.reminders().pending_count(), 0);
    }

    #[test]
    fn shutdown_clears_every_handle() {
        let mut engine = engine();
        engine.create_timer("t", 10.0).unwrap();
        engine.create_reminder("r", T0 + 10_000).unwrap();
        engine.shutdown();
        assert!(engine.ctx().live_alarms().is_empty());
    }

    impl<C: SchedulerCtx> Engine<C> {
        fn into_ctx(engine: Self) -> C {
            engine.ctx
        }
    }
}
