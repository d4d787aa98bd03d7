use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};

use crate::clock::Clock;
use crate::ctx::{Alarm, SchedulerCtx};
use crate::engine::Engine;
use crate::error::CoreError;
use crate::events::{CoreEvent, EventSink};
use crate::models::{Reminder, ReminderId, Settings, TimerId, TimerView, TimestampMs};
use crate::power::PowerEvent;
use crate::store::ScheduleStore;

const MIN_SWEEP_MS: u64 = 100;
const MAX_SWEEP_MS: u64 = 60_000;

type Job = Box<dyn FnOnce(&mut Engine<AppCtx>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub sweep_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ServiceConfig {
    fn from(settings: &Settings) -> Self {
        let ms = settings.reminder_sweep_ms.clamp(MIN_SWEEP_MS, MAX_SWEEP_MS);
        Self {
            sweep_interval: Duration::from_millis(ms),
        }
    }
}

pub(crate) fn sweep_interval_in_range(ms: u64) -> bool {
    (MIN_SWEEP_MS..=MAX_SWEEP_MS).contains(&ms)
}

/// Scheduler context backed by tokio: each armed alarm is a sleeping task that
/// posts its key back to the event loop.
pub struct AppCtx {
    clock: Arc<dyn Clock>,
    store: ScheduleStore,
    sink: Box<dyn EventSink>,
    alarms: HashMap<Alarm, AbortHandle>,
    alarm_tx: mpsc::UnboundedSender<Alarm>,
}

impl SchedulerCtx for AppCtx {
    fn now_ms(&self) -> TimestampMs {
        self.clock.now_ms()
    }

    fn store(&mut self) -> &mut ScheduleStore {
        &mut self.store
    }

    fn arm(&mut self, alarm: Alarm, delay: Duration) {
        let tx = self.alarm_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(alarm);
        });
        if let Some(previous) = self.alarms.insert(alarm, task.abort_handle()) {
            previous.abort();
        }
    }

    fn disarm(&mut self, alarm: Alarm) {
        if let Some(task) = self.alarms.remove(&alarm) {
            task.abort();
        }
    }

    fn publish(&mut self, event: CoreEvent) {
        self.sink.publish(&event);
    }
}

/// Cloneable front door to the scheduler loop. Every call is serialized by the
/// loop, so operations on the same id never interleave.
#[derive(Clone)]
pub struct SchedulerHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

impl SchedulerHandle {
    async fn call<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine<AppCtx>) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |engine| {
            let _ = reply_tx.send(f(engine));
        });
        self.jobs.send(job).map_err(|_| CoreError::Unavailable)?;
        reply_rx.await.map_err(|_| CoreError::Unavailable)
    }

    pub async fn create_timer(
        &self,
        name: impl Into<String>,
        total_seconds: f64,
    ) -> Result<TimerView, CoreError> {
        let name = name.into();
        self.call(move |engine| engine.create_timer(&name, total_seconds))
            .await?
    }

    pub async fn list_timers(&self) -> Result<Vec<TimerView>, CoreError> {
        self.call(|engine| engine.list_timers()).await
    }

    pub async fn pause_timer(&self, id: TimerId) -> Result<Option<TimerView>, CoreError> {
        self.call(move |engine| engine.pause_timer(id)).await?
    }

    pub async fn resume_timer(&self, id: TimerId) -> Result<Option<TimerView>, CoreError> {
        self.call(move |engine| engine.resume_timer(id)).await?
    }

    pub async fn cancel_timer(&self, id: TimerId) -> Result<Option<TimerView>, CoreError> {
        self.call(move |engine| engine.cancel_timer(id)).await?
    }

    pub async fn delete_timer(&self, id: TimerId) -> Result<bool, CoreError> {
        self.call(move |engine| engine.delete_timer(id)).await?
    }

    pub async fn create_reminder(
        &self,
        message: impl Into<String>,
        fire_at: TimestampMs,
    ) -> Result<Reminder, CoreError> {
        let message = message.into();
        self.call(move |engine| engine.create_reminder(&message, fire_at))
            .await?
    }

    pub async fn list_reminders(&self) -> Result<Vec<Reminder>, CoreError> {
        self.call(|engine| engine.list_reminders()).await
    }

    pub async fn cancel_reminder(&self, id: ReminderId) -> Result<bool, CoreError> {
        self.call(move |engine| engine.cancel_reminder(id)).await?
    }

    pub async fn delete_reminder(&self, id: ReminderId) -> Result<bool, CoreError> {
        self.call(move |engine| engine.delete_reminder(id)).await?
    }

    /// Fire-and-forget delivery of a suspend/resume signal.
    pub fn power_event(&self, event: PowerEvent) -> Result<(), CoreError> {
        let job: Job = Box::new(move |engine| engine.on_power(event));
        self.jobs.send(job).map_err(|_| CoreError::Unavailable)
    }
}

/// Builds the scheduler loop without starting it. The returned future owns the
/// engine and runs until every [`SchedulerHandle`] has been dropped.
pub fn scheduler_service(
    store: ScheduleStore,
    clock: Arc<dyn Clock>,
    sink: Box<dyn EventSink>,
    config: ServiceConfig,
) -> (SchedulerHandle, impl Future<Output = ()> + Send + 'static) {
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
    let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();
    let ctx = AppCtx {
        clock,
        store,
        sink,
        alarms: HashMap::new(),
        alarm_tx,
    };
    let engine = Engine::new(ctx);
    let handle = SchedulerHandle { jobs: jobs_tx };
    (handle, run_loop(engine, jobs_rx, alarm_rx, config))
}

/// [`scheduler_service`] spawned onto the current tokio runtime.
pub fn spawn_scheduler(
    store: ScheduleStore,
    clock: Arc<dyn Clock>,
    sink: Box<dyn EventSink>,
    config: ServiceConfig,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (handle, service) = scheduler_service(store, clock, sink, config);
    (handle, tokio::spawn(service))
}

async fn run_loop(
    mut engine: Engine<AppCtx>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    mut alarms: mpsc::UnboundedReceiver<Alarm>,
    config: ServiceConfig,
) {
    log::info!(
        "scheduler started sweep_interval_ms={}",
        config.sweep_interval.as_millis()
    );
    if let Err(err) = engine.start() {
        log::error!("scheduler start incomplete err={err}");
    }

    let mut sweep = interval(config.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            job = jobs.recv() => match job {
                Some(job) => job(&mut engine),
                None => break,
            },
            Some(alarm) = alarms.recv() => engine.on_alarm(alarm),
            _ = sweep.tick() => engine.sweep(),
        }
    }
    engine.shutdown();
}
