use std::collections::HashMap;

use crate::ctx::{delay_until, Alarm, SchedulerCtx};
use crate::error::CoreError;
use crate::events::CoreEvent;
use crate::models::{Timer, TimerId, TimerStatus, TimerView, TimestampMs};

#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    token: u64,
    deadline: TimestampMs,
}

impl ArmedTimer {
    fn alarm(&self, id: TimerId) -> Alarm {
        Alarm::Timer {
            id,
            token: self.token,
        }
    }
}

/// Owns the id -> countdown handle mapping for timers.
///
/// Invariant: a timer is in `armed` iff its stored status is `Running` (a failed
/// completion write is the only exception, and it is retried by the next sweep).
#[derive(Debug, Default)]
pub struct TimerEngine {
    armed: HashMap<TimerId, ArmedTimer>,
    next_token: u64,
}

/// Longest countdown accepted: one leap year.
pub const MAX_TIMER_MS: i64 = 366 * 24 * 60 * 60 * 1000;

pub(crate) fn parse_duration_ms(total_seconds: f64) -> Result<i64, CoreError> {
    if !total_seconds.is_finite() || total_seconds <= 0.0 {
        return Err(CoreError::validation(format!(
            "timer duration must be a positive number of seconds, got {total_seconds}"
        )));
    }
    let total_ms = (total_seconds * 1000.0).round();
    if total_ms < 1.0 || total_ms > MAX_TIMER_MS as f64 {
        return Err(CoreError::validation(format!(
            "timer duration out of range: {total_seconds}s"
        )));
    }
    Ok(total_ms as i64)
}

impl TimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.armed.contains_key(&id)
    }

    pub fn armed_deadline(&self, id: TimerId) -> Option<TimestampMs> {
        self.armed.get(&id).map(|armed| armed.deadline)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    pub fn create(
        &mut self,
        ctx: &mut impl SchedulerCtx,
        name: &str,
        total_seconds: f64,
    ) -> Result<TimerView, CoreError> {
        let total_ms = parse_duration_ms(total_seconds)?;
        let now = ctx.now_ms();
        let deadline = now
            .checked_add(total_ms)
            .ok_or_else(|| CoreError::validation("timer deadline out of range"))?;
        let timer = ctx.store().insert_timer(name.trim(), total_ms, now)?;
        log::info!("timer created id={} total_ms={total_ms}", timer.id);
        self.schedule(ctx, timer, deadline)
    }

    pub fn list(&self, ctx: &mut impl SchedulerCtx) -> Vec<TimerView> {
        let now = ctx.now_ms();
        ctx.store()
            .list_timers()
            .iter()
            .map(|timer| TimerView::new(timer, now, self.armed_deadline(timer.id)))
            .collect()
    }

    /// `running -> paused`. Returns `None` for unknown ids and the unchanged view
    /// when the timer is not running.
    pub fn pause(
        &mut self,
        ctx: &mut impl SchedulerCtx,
        id: TimerId,
    ) -> Result<Option<TimerView>, CoreError> {
        let Some(timer) = ctx.store().timer(id) else {
            return Ok(None);
        };
        let now = ctx.now_ms();
        if timer.status != TimerStatus::Running {
            log::debug!("pause ignored id={id} status={:?}", timer.status);
            return Ok(Some(TimerView::new(&timer, now, None)));
        }

        let deadline = self
            .armed_deadline(id)
            .unwrap_or_else(|| now.saturating_add(timer.remaining_at(now)));
        let remaining_ms = deadline.saturating_sub(now).max(0);
        if remaining_ms == 0 {
            // Already expired; the completion just has not been delivered yet.
            let done = self.finish(ctx, timer)?;
            return Ok(Some(TimerView::new(&done, now, None)));
        }

        let paused = Timer {
            remaining_ms,
            status: TimerStatus::Paused,
            paused_at: Some(now),
            updated_at: now,
            ..timer
        };
        ctx.store().upsert_timer(paused.clone())?;
        self.disarm(ctx, id);
        log::info!("timer paused id={id} remaining_ms={remaining_ms}");
        Ok(Some(TimerView::new(&paused, now, None)))
    }

    /// `paused -> running`, re-anchoring the deadline to the current wall clock.
    pub fn resume(
        &mut self,
        ctx: &mut impl SchedulerCtx,
        id: TimerId,
    ) -> Result<Option<TimerView>, CoreError> {
        let Some(timer) = ctx.store().timer(id) else {
            return Ok(None);
        };
        let now = ctx.now_ms();
        if timer.status != TimerStatus::Paused {
            log::debug!("resume ignored id={id} status={:?}", timer.status);
            return Ok(Some(TimerView::new(&timer, now, self.armed_deadline(id))));
        }

        let running = Timer {
            status: TimerStatus::Running,
            paused_at: None,
            updated_at: now,
            ..timer
        };
        ctx.store().upsert_timer(running.clone())?;
        let deadline = now.saturating_add(running.remaining_ms);
        log::info!("timer resumed id={id} remaining_ms={}", running.remaining_ms);
        self.schedule(ctx, running, deadline).map(Some)
    }

    /// `running|paused -> cancelled`.
    pub fn cancel(
        &mut self,
        ctx: &mut impl SchedulerCtx,
        id: TimerId,
    ) -> Result<Option<TimerView>, CoreError> {
        let Some(timer) = ctx.store().timer(id) else {
            return Ok(None);
        };
        let now = ctx.now_ms();
        if !timer.is_active() {
            log::debug!("cancel ignored id={id} status={:?}", timer.status);
            return Ok(Some(TimerView::new(&timer, now, None)));
        }

        let cancelled = Timer {
            remaining_ms: 0,
            status: TimerStatus::Cancelled,
            paused_at: None,
            updated_at: now,
            ..timer
        };
        ctx.store().upsert_timer(cancelled.clone())?;
        self.disarm(ctx, id);
        log::info!("timer cancelled id={id}");
        Ok(Some(TimerView::new(&cancelled, now, None)))
    }

    /// Removes the row whatever its status. Returns whether a row existed.
    pub fn delete(&mut self, ctx: &mut impl SchedulerCtx, id: TimerId) -> Result<bool, CoreError> {
        let removed = ctx.store().delete_timer(id)?;
        self.disarm(ctx, id);
        if removed {
            log::info!("timer deleted id={id}");
        }
        Ok(removed)
    }

    /// Rebuilds every countdown from the store. Called at startup and after resume.
    ///
    /// Running rows are re-derived against the current wall clock: a row whose
    /// remaining time ran out while nothing was counting completes immediately.
    /// Returns how many running timers were processed; the first write failure is
    /// reported after every row has been attempted.
    pub fn restore_all(&mut self, ctx: &mut impl SchedulerCtx) -> Result<usize, CoreError> {
        self.disarm_all(ctx);
        let now = ctx.now_ms();
        let mut restored = 0;
        let mut first_err = None;
        for timer in ctx.store().timers_with_status(TimerStatus::Running) {
            let id = timer.id;
            let remaining = timer.remaining_at(now);
            let result = if remaining > 0 {
                self.schedule(ctx, timer, now.saturating_add(remaining)).map(|_| ())
            } else {
                self.finish(ctx, timer).map(|_| ())
            };
            match result {
                Ok(()) => restored += 1,
                Err(err) => {
                    log::warn!("timer restore failed id={id} err={err}");
                    first_err.get_or_insert(err);
                }
            }
        }
        log::info!("timers restored count={restored}");
        match first_err {
            Some(err) => Err(err),
            None => Ok(restored),
        }
    }

    /// Delivery of a single-shot alarm. Stale alarms (superseded or
    /// already completed) are dropped.
    pub fn on_alarm(&mut self, ctx: &mut impl SchedulerCtx, id: TimerId, token: u64) {
        match self.armed.get(&id) {
            Some(armed) if armed.token == token => {}
            _ => {
                log::debug!("stale timer alarm id={id} token={token}");
                return;
            }
        }
        self.complete(ctx, id);
    }

    /// Completes every armed timer whose deadline has passed by wall clock.
    pub fn finish_overdue(&mut self, ctx: &mut impl SchedulerCtx) {
        let now = ctx.now_ms();
        let overdue: Vec<TimerId> = self
            .armed
            .iter()
            .filter(|(_, armed)| armed.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in overdue {
            self.complete(ctx, id);
        }
    }

    pub fn shutdown(&mut self, ctx: &mut impl SchedulerCtx) {
        self.disarm_all(ctx);
    }

    fn complete(&mut self, ctx: &mut impl SchedulerCtx, id: TimerId) {
        match ctx.store().timer(id) {
            Some(timer) if timer.status == TimerStatus::Running => {
                if let Err(err) = self.finish(ctx, timer) {
                    log::error!("timer completion not persisted id={id} err={err}");
                }
            }
            _ => self.disarm(ctx, id),
        }
    }

    /// Arms (or re-arms) the countdown for a running timer. A deadline that is
    /// already due completes the timer on the spot.
    fn schedule(
        &mut self,
        ctx: &mut impl SchedulerCtx,
        timer: Timer,
        deadline: TimestampMs,
    ) -> Result<TimerView, CoreError> {
        self.disarm(ctx, timer.id);
        let now = ctx.now_ms();
        if deadline <= now {
            let done = self.finish(ctx, timer)?;
            return Ok(TimerView::new(&done, now, None));
        }

        self.next_token += 1;
        let armed = ArmedTimer {
            token: self.next_token,
            deadline,
        };
        self.armed.insert(timer.id, armed);
        ctx.arm(armed.alarm(timer.id), delay_until(deadline, now));
        log::debug!("timer armed id={} deadline={deadline}", timer.id);
        Ok(TimerView::new(&timer, now, Some(deadline)))
    }

    /// `running -> done`. The handle is cleared before the sink runs, so a second
    /// trigger for the same schedule finds nothing to do.
    fn finish(&mut self, ctx: &mut impl SchedulerCtx, timer: Timer) -> Result<Timer, CoreError> {
        let now = ctx.now_ms();
        let done = Timer {
            remaining_ms: 0,
            status: TimerStatus::Done,
            paused_at: None,
            updated_at: now,
            ..timer
        };
        ctx.store().upsert_timer(done.clone())?;
        self.disarm(ctx, done.id);
        log::info!("timer done id={}", done.id);
        ctx.publish(CoreEvent::TimerFired(done.clone()));
        Ok(done)
    }

    fn disarm(&mut self, ctx: &mut impl SchedulerCtx, id: TimerId) {
        if let Some(armed) = self.armed.remove(&id) {
            ctx.disarm(armed.alarm(id));
        }
    }

    fn disarm_all(&mut self, ctx: &mut impl SchedulerCtx) {
        for (id, armed) in self.armed.drain() {
            ctx.disarm(armed.alarm(id));
        }
    }
}
