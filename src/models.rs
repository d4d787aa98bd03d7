use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type TimestampMs = i64;

pub type TimerId = u64;
pub type ReminderId = u64;
pub type NoteId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Running,
    Paused,
    Done,
    Cancelled,
}

/// A persisted countdown.
///
/// While `status` is `Running`, `remaining_ms` is the remaining duration as of
/// `updated_at` (the instant the timer last entered running). The deadline is
/// always derived from those two values and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Timer {
    pub id: TimerId,
    pub name: String,
    pub total_ms: i64,
    pub remaining_ms: i64,
    pub status: TimerStatus,
    pub paused_at: Option<TimestampMs>,
    pub updated_at: TimestampMs,
}

impl Timer {
    /// Remaining duration evaluated at `now`. A clock that moved backwards never
    /// extends the timer past its stored remaining duration.
    pub fn remaining_at(&self, now: TimestampMs) -> i64 {
        match self.status {
            TimerStatus::Running => {
                let elapsed = now.saturating_sub(self.updated_at).max(0);
                self.remaining_ms.saturating_sub(elapsed).max(0)
            }
            _ => self.remaining_ms.max(0),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TimerStatus::Running | TimerStatus::Paused)
    }
}

/// What the UI sees for a timer: the row plus values derived at read time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TimerView {
    pub id: TimerId,
    pub name: String,
    pub total_ms: i64,
    pub remaining_ms: i64,
    pub status: TimerStatus,
    pub paused_at: Option<TimestampMs>,
    pub updated_at: TimestampMs,
    pub deadline: Option<TimestampMs>,
}

impl TimerView {
    pub fn new(timer: &Timer, now: TimestampMs, deadline: Option<TimestampMs>) -> Self {
        let deadline = match timer.status {
            TimerStatus::Running => deadline.or(Some(now.saturating_add(timer.remaining_at(now)))),
            _ => None,
        };
        let remaining_ms = match deadline {
            Some(deadline) => deadline.saturating_sub(now).max(0),
            None => timer.remaining_at(now),
        };
        Self {
            id: timer.id,
            name: timer.name.clone(),
            total_ms: timer.total_ms,
            remaining_ms,
            status: timer.status,
            paused_at: timer.paused_at,
            updated_at: timer.updated_at,
            deadline,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Scheduled,
    Fired,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Reminder {
    pub id: ReminderId,
    pub message: String,
    pub fire_at: TimestampMs,
    pub status: ReminderStatus,
    pub created_at: TimestampMs,
}

impl Reminder {
    pub fn is_due(&self, now: TimestampMs) -> bool {
        self.status == ReminderStatus::Scheduled && self.fire_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScheduleFile {
    pub schema_version: u32,
    #[serde(default = "first_id")]
    pub next_timer_id: TimerId,
    #[serde(default = "first_id")]
    pub next_reminder_id: ReminderId,
    #[serde(default)]
    pub timers: Vec<Timer>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

impl Default for ScheduleFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            next_timer_id: first_id(),
            next_reminder_id: first_id(),
            timers: Vec::new(),
            reminders: Vec::new(),
        }
    }
}

pub const SCHEMA_VERSION: u32 = 1;

fn first_id() -> u64 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    #[default]
    Clickthrough,
    Interactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Theme {
    pub accent: String,
    pub accent_inactive: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: "#22c55e".to_string(),
            accent_inactive: "#16a34a".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_shortcut")]
    pub shortcut: String,
    #[serde(default = "default_auto_timeout_s")]
    pub overlay_auto_timeout_s: u32,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_sweep_interval_ms")]
    pub reminder_sweep_ms: u64,
    #[serde(default = "default_wake_check_interval_s")]
    pub wake_check_interval_s: u64,
    #[serde(default = "default_wake_drift_threshold_ms")]
    pub wake_drift_threshold_ms: u64,
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shortcut: default_shortcut(),
            overlay_auto_timeout_s: default_auto_timeout_s(),
            theme: Theme::default(),
            reminder_sweep_ms: default_sweep_interval_ms(),
            wake_check_interval_s: default_wake_check_interval_s(),
            wake_drift_threshold_ms: default_wake_drift_threshold_ms(),
            notifications_enabled: default_notifications_enabled(),
        }
    }
}

fn default_shortcut() -> String {
    "Control+Alt+Space".to_string()
}

fn default_auto_timeout_s() -> u32 {
    8
}

fn default_sweep_interval_ms() -> u64 {
    500
}

fn default_wake_check_interval_s() -> u64 {
    15
}

fn default_wake_drift_threshold_ms() -> u64 {
    5_000
}

fn default_notifications_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct WindowState {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub overlay_mode: OverlayMode,
}

impl Default for WindowState {
    fn default() -> Self {
        // Overlay size the radial menu is laid out for.
        Self {
            x: 0,
            y: 0,
            width: 230,
            height: 130,
            overlay_mode: OverlayMode::Clickthrough,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WindowStateFile {
    pub schema_version: u32,
    pub window: WindowState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub pos_x: i32,
    pub pos_y: i32,
    pub width: u32,
    pub height: u32,
    pub updated_at: TimestampMs,
}

/// Fields the UI supplies when creating a note; layout falls back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NoteDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pinned: bool,
    pub pos_x: Option<i32>,
    pub pos_y: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl NoteDraft {
    pub fn into_note(self, id: NoteId, now: TimestampMs) -> Note {
        Note {
            id,
            title: self.title,
            content: self.content,
            pinned: self.pinned,
            pos_x: self.pos_x.unwrap_or(50),
            pos_y: self.pos_y.unwrap_or(50),
            width: self.width.unwrap_or(200),
            height: self.height.unwrap_or(160),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotesFile {
    pub schema_version: u32,
    #[serde(default = "first_id")]
    pub next_id: NoteId,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Default for NotesFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            next_id: first_id(),
            notes: Vec::new(),
        }
    }
}
