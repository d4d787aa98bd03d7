use crate::models::{
    Reminder, ReminderId, ReminderStatus, ScheduleFile, Timer, TimerId, TimerStatus,
    TimestampMs,
};
use crate::storage::{Storage, StorageError};

/// Row-level access to the timers and reminders tables.
///
/// Every mutation is applied to a copy of the document, persisted, and only then
/// made visible. A failed write leaves the in-memory rows exactly as they were.
pub struct ScheduleStore {
    storage: Storage,
    data: ScheduleFile,
}

impl ScheduleStore {
    pub fn open(storage: Storage) -> Result<Self, StorageError> {
        storage.ensure_dirs()?;
        let data = match storage.load_schedule() {
            Ok(data) => data,
            Err(StorageError::Json(err)) => {
                let moved = storage.quarantine_schedule()?;
                log::warn!(
                    "schedule unreadable, starting empty err={err} moved_to={}",
                    moved.display()
                );
                ScheduleFile::default()
            }
            Err(err) => return Err(err),
        };
        log::info!(
            "schedule loaded timers={} reminders={}",
            data.timers.len(),
            data.reminders.len()
        );
        Ok(Self { storage, data })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn timer(&self, id: TimerId) -> Option<Timer> {
        self.data.timers.iter().find(|t| t.id == id).cloned()
    }

    /// All timers, most recently touched first.
    pub fn list_timers(&self) -> Vec<Timer> {
        let mut timers = self.data.timers.clone();
        timers.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        timers
    }

    pub fn timers_with_status(&self, status: TimerStatus) -> Vec<Timer> {
        self.data
            .timers
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    /// Inserts a running timer anchored at `now`.
    pub fn insert_timer(
        &mut self,
        name: &str,
        total_ms: i64,
        now: TimestampMs,
    ) -> Result<Timer, StorageError> {
        let mut next = self.data.clone();
        let timer = Timer {
            id: next.next_timer_id,
            name: name.to_string(),
            total_ms,
            remaining_ms: total_ms,
            status: TimerStatus::Running,
            paused_at: None,
            updated_at: now,
        };
        next.next_timer_id += 1;
        next.timers.push(timer.clone());
        self.commit(next)?;
        Ok(timer)
    }

    /// Replaces the stored row with the same id. Unknown ids are inserted.
    pub fn upsert_timer(&mut self, timer: Timer) -> Result<(), StorageError> {
        let mut next = self.data.clone();
        match next.timers.iter_mut().find(|t| t.id == timer.id) {
            Some(existing) => *existing = timer,
            None => {
                next.next_timer_id = next.next_timer_id.max(timer.id + 1);
                next.timers.push(timer);
            }
        }
        self.commit(next)
    }

    pub fn delete_timer(&mut self, id: TimerId) -> Result<bool, StorageError> {
        if !self.data.timers.iter().any(|t| t.id == id) {
            return Ok(false);
        }
        let mut next = self.data.clone();
        next.timers.retain(|t| t.id != id);
        self.commit(next)?;
        Ok(true)
    }

    pub fn reminder(&self, id: ReminderId) -> Option<Reminder> {
        self.data.reminders.iter().find(|r| r.id == id).cloned()
    }

    /// All reminders, soonest first.
    pub fn list_reminders(&self) -> Vec<Reminder> {
        let mut reminders = self.data.reminders.clone();
        reminders.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.id.cmp(&b.id)));
        reminders
    }

    pub fn reminders_with_status(&self, status: ReminderStatus) -> Vec<Reminder> {
        let mut reminders: Vec<Reminder> = self
            .data
            .reminders
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        reminders.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.id.cmp(&b.id)));
        reminders
    }

    pub fn insert_reminder(
        &mut self,
        message: &str,
        fire_at: TimestampMs,
        now: TimestampMs,
    ) -> Result<Reminder, StorageError> {
        let mut next = self.data.clone();
        let reminder = Reminder {
            id: next.next_reminder_id,
            message: message.to_string(),
            fire_at,
            status: ReminderStatus::Scheduled,
            created_at: now,
        };
        next.next_reminder_id += 1;
        next.reminders.push(reminder.clone());
        self.commit(next)?;
        Ok(reminder)
    }

    /// `scheduled -> fired`. Returns the fired row, or `None` when the reminder is
    /// unknown or already terminal.
    pub fn mark_reminder_fired(&mut self, id: ReminderId) -> Result<Option<Reminder>, StorageError> {
        self.transition_reminder(id, ReminderStatus::Fired)
    }

    /// `scheduled -> canceled`. Returns `false` when nothing changed.
    pub fn cancel_reminder(&mut self, id: ReminderId) -> Result<bool, StorageError> {
        Ok(self.transition_reminder(id, ReminderStatus::Canceled)?.is_some())
    }

    pub fn delete_reminder(&mut self, id: ReminderId) -> Result<bool, StorageError> {
        if !self.data.reminders.iter().any(|r| r.id == id) {
            return Ok(false);
        }
        let mut next = self.data.clone();
        next.reminders.retain(|r| r.id != id);
        self.commit(next)?;
        Ok(true)
    }

    fn transition_reminder(
        &mut self,
        id: ReminderId,
        to: ReminderStatus,
    ) -> Result<Option<Reminder>, StorageError> {
        let scheduled = self
            .data
            .reminders
            .iter()
            .any(|r| r.id == id && r.status == ReminderStatus::Scheduled);
        if !scheduled {
            return Ok(None);
        }
        let mut next = self.data.clone();
        let mut updated = None;
        if let Some(reminder) = next.reminders.iter_mut().find(|r| r.id == id) {
            reminder.status = to;
            updated = Some(reminder.clone());
        }
        self.commit(next)?;
        Ok(updated)
    }

    fn commit(&mut self, next: ScheduleFile) -> Result<(), StorageError> {
        self.storage.save_schedule(&next)?;
        self.data = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn open_store() -> (tempfile::TempDir, ScheduleStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::open(Storage::new(dir.path().to_path_buf())).unwrap();
        (dir, store)
    }

    #[test]
    fn timer_rows_survive_reopen() {
        let (dir, mut store) = open_store();
        let created = store.insert_timer("tea", 60_000, 1_000).unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.remaining_ms, 60_000);
        assert_eq!(created.status, TimerStatus::Running);

        let mut paused = created.clone();
        paused.status = TimerStatus::Paused;
        paused.remaining_ms = 30_000;
        paused.paused_at = Some(31_000);
        paused.updated_at = 31_000;
        store.upsert_timer(paused.clone()).unwrap();

        let reopened = ScheduleStore::open(Storage::new(dir.path().to_path_buf())).unwrap();
        assert_eq!(reopened.timer(1), Some(paused));
        assert!(reopened.timers_with_status(TimerStatus::Running).is_empty());
        assert_eq!(reopened.timers_with_status(TimerStatus::Paused).len(), 1);

        let mut reopened = reopened;
        let second = reopened.insert_timer("pasta", 1_000, 2_000).unwrap();
        assert_eq!(second.id, 2);
    }

    #[test]
    fn delete_timer_reports_whether_a_row_was_removed() {
        let (_dir, mut store) = open_store();
        let timer = store.insert_timer("", 1_000, 0).unwrap();
        assert!(store.delete_timer(timer.id).unwrap());
        assert!(!store.delete_timer(timer.id).unwrap());
        assert!(store.list_timers().is_empty());
    }

    #[test]
    fn reminder_transitions_are_check_and_set() {
        let (_dir, mut store) = open_store();
        let a = store.insert_reminder("a", 5_000, 0).unwrap();
        let b = store.insert_reminder("b", 1_000, 0).unwrap();

        let listed = store.list_reminders();
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);

        let fired = store.mark_reminder_fired(a.id).unwrap().expect("first fire");
        assert_eq!(fired.status, ReminderStatus::Fired);
        assert!(store.mark_reminder_fired(a.id).unwrap().is_none());
        assert!(!store.cancel_reminder(a.id).unwrap());
        assert_eq!(store.reminder(a.id).unwrap().status, ReminderStatus::Fired);

        assert!(store.cancel_reminder(b.id).unwrap());
        assert!(store.mark_reminder_fired(b.id).unwrap().is_none());
        assert_eq!(store.reminder(b.id).unwrap().status, ReminderStatus::Canceled);

        assert!(store.mark_reminder_fired(404).unwrap().is_none());
        assert!(store.delete_reminder(b.id).unwrap());
        assert!(!store.delete_reminder(b.id).unwrap());
    }

    #[test]
    fn failed_write_leaves_rows_untouched() {
        let (dir, mut store) = open_store();
        let reminder = store.insert_reminder("water", 1_000, 0).unwrap();
        fs::remove_file(dir.path().join("schedule.json")).unwrap();
        fs::create_dir_all(dir.path().join("schedule.json")).unwrap();

        assert!(store.mark_reminder_fired(reminder.id).is_err());
        assert_eq!(
            store.reminder(reminder.id).unwrap().status,
            ReminderStatus::Scheduled
        );
        assert!(store.insert_timer("x", 1_000, 0).is_err());
        assert!(store.list_timers().is_empty());
    }

    #[test]
    fn corrupt_schedule_is_quarantined_on_open() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("schedule.json"), b"[1, 2").unwrap();
        let store = ScheduleStore::open(Storage::new(dir.path().to_path_buf())).unwrap();
        assert!(store.list_timers().is_empty());
        let quarantined = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().ends_with(".corrupt.json"));
        assert!(quarantined);
    }
}
