use std::fs;
use std::time::Duration;

use crate::ctx::{Alarm, SchedulerCtx};
use crate::events::CoreEvent;
use crate::models::TimestampMs;
use crate::storage::Storage;
use crate::store::ScheduleStore;

pub(crate) const T0: TimestampMs = 1_700_000_000_000;

/// In-process scheduler context: a manual clock, a real on-disk store in a temp
/// directory, and recorders for alarms and events.
pub(crate) struct TestCtx {
    pub(crate) root: tempfile::TempDir,
    pub(crate) now: TimestampMs,
    pub(crate) store: ScheduleStore,
    pub(crate) armed: Vec<(Alarm, Duration)>,
    pub(crate) disarmed: Vec<Alarm>,
    pub(crate) events: Vec<CoreEvent>,
}

impl TestCtx {
    pub(crate) fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let store = ScheduleStore::open(Storage::new(root.path().to_path_buf())).unwrap();
        Self {
            root,
            now: T0,
            store,
            armed: Vec::new(),
            disarmed: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Same data directory, fresh process: nothing in memory survives.
    pub(crate) fn restart(self) -> Self {
        let store = ScheduleStore::open(Storage::new(self.root.path().to_path_buf())).unwrap();
        Self {
            root: self.root,
            now: self.now,
            store,
            armed: Vec::new(),
            disarmed: Vec::new(),
            events: Vec::new(),
        }
    }

    pub(crate) fn advance(&mut self, ms: i64) {
        self.now += ms;
    }

    /// Alarms armed and not disarmed since.
    pub(crate) fn live_alarms(&self) -> Vec<(Alarm, Duration)> {
        self.armed
            .iter()
            .filter(|(alarm, _)| !self.disarmed.contains(alarm))
            .cloned()
            .collect()
    }

    pub(crate) fn last_armed(&self) -> Alarm {
        self.armed.last().expect("an alarm was armed").0
    }

    /// Makes every subsequent schedule write fail until [`TestCtx::repair_storage`].
    pub(crate) fn break_storage(&self) {
        let path = self.root.path().join("schedule.json");
        if path.is_file() {
            fs::remove_file(&path).unwrap();
        }
        fs::create_dir_all(path).unwrap();
    }

    pub(crate) fn repair_storage(&self) {
        fs::remove_dir_all(self.root.path().join("schedule.json")).unwrap();
    }

    pub(crate) fn timer_events(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, CoreEvent::TimerFired(_)))
            .count()
    }

    pub(crate) fn reminder_events(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, CoreEvent::ReminderFired(_)))
            .count()
    }
}

impl SchedulerCtx for TestCtx {
    fn now_ms(&self) -> TimestampMs {
        self.now
    }

    fn store(&mut self) -> &mut ScheduleStore {
        &mut self.store
    }

    fn arm(&mut self, alarm: Alarm, delay: Duration) {
        self.armed.push((alarm, delay));
    }

    fn disarm(&mut self, alarm: Alarm) {
        self.disarmed.push(alarm);
    }

    fn publish(&mut self, event: CoreEvent) {
        self.events.push(event);
    }
}
