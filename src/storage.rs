use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{
    Note, NoteDraft, NoteId, NotesFile, ScheduleFile, Settings, SettingsFile, TimestampMs,
    WindowState, WindowStateFile, SCHEMA_VERSION,
};

const SCHEDULE_FILE: &str = "schedule.json";
const SETTINGS_FILE: &str = "settings.json";
const NOTES_FILE: &str = "notes.json";
const WINDOW_STATE_FILE: &str = "window_state.json";

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        StorageError::Json(value)
    }
}

impl StorageError {
    fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

/// JSON documents under the app data directory.
///
/// The schedule document is owned by [`crate::store::ScheduleStore`]; notes, settings
/// and window state are read-modify-written here directly.
pub struct Storage {
    root: PathBuf,
    // Serializes read-modify-write cycles on the notes document.
    notes_lock: Mutex<()>,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            notes_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn load_schedule(&self) -> Result<ScheduleFile, StorageError> {
        self.load_or_default(self.root.join(SCHEDULE_FILE))
    }

    pub fn save_schedule(&self, data: &ScheduleFile) -> Result<(), StorageError> {
        self.write_atomic(self.root.join(SCHEDULE_FILE), data)
    }

    /// Moves an unreadable schedule out of the way so the next save starts fresh.
    pub fn quarantine_schedule(&self) -> Result<PathBuf, StorageError> {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let target = self.root.join(format!("schedule-{timestamp}.corrupt.json"));
        fs::rename(self.root.join(SCHEDULE_FILE), &target)?;
        Ok(target)
    }

    pub fn load_settings(&self) -> Result<Settings, StorageError> {
        let file: Option<SettingsFile> = self.load_optional(self.root.join(SETTINGS_FILE))?;
        Ok(file.map(|file| file.settings).unwrap_or_default())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        let file = SettingsFile {
            schema_version: SCHEMA_VERSION,
            settings: settings.clone(),
        };
        self.write_atomic(self.root.join(SETTINGS_FILE), &file)
    }

    pub fn load_window_state(&self) -> Result<Option<WindowState>, StorageError> {
        let file: Option<WindowStateFile> =
            self.load_optional(self.root.join(WINDOW_STATE_FILE))?;
        Ok(file.map(|file| file.window))
    }

    pub fn save_window_state(&self, window: &WindowState) -> Result<(), StorageError> {
        let file = WindowStateFile {
            schema_version: SCHEMA_VERSION,
            window: window.clone(),
        };
        self.write_atomic(self.root.join(WINDOW_STATE_FILE), &file)
    }

    pub fn list_notes(&self) -> Result<Vec<Note>, StorageError> {
        let mut notes = self.load_notes()?.notes;
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(notes)
    }

    pub fn create_note(&self, draft: NoteDraft, now: TimestampMs) -> Result<Note, StorageError> {
        let _guard = self.notes_lock.lock().expect("notes lock poisoned");
        let mut file = self.load_notes()?;
        let note = draft.into_note(file.next_id, now);
        file.next_id += 1;
        file.notes.push(note.clone());
        self.write_atomic(self.root.join(NOTES_FILE), &file)?;
        Ok(note)
    }

    /// Replaces an existing note. Returns `None` when the id is unknown.
    pub fn update_note(&self, note: Note, now: TimestampMs) -> Result<Option<Note>, StorageError> {
        let _guard = self.notes_lock.lock().expect("notes lock poisoned");
        let mut file = self.load_notes()?;
        let Some(existing) = file.notes.iter_mut().find(|n| n.id == note.id) else {
            return Ok(None);
        };
        *existing = Note {
            updated_at: now,
            ..note
        };
        let updated = existing.clone();
        self.write_atomic(self.root.join(NOTES_FILE), &file)?;
        Ok(Some(updated))
    }

    pub fn remove_note(&self, id: NoteId) -> Result<bool, StorageError> {
        let _guard = self.notes_lock.lock().expect("notes lock poisoned");
        let mut file = self.load_notes()?;
        let before = file.notes.len();
        file.notes.retain(|note| note.id != id);
        if file.notes.len() == before {
            return Ok(false);
        }
        self.write_atomic(self.root.join(NOTES_FILE), &file)?;
        Ok(true)
    }

    fn load_notes(&self) -> Result<NotesFile, StorageError> {
        self.load_or_default(self.root.join(NOTES_FILE))
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, path: PathBuf) -> Result<T, StorageError> {
        Ok(self.load_optional(path)?.unwrap_or_default())
    }

    fn load_optional<T: DeserializeOwned>(&self, path: PathBuf) -> Result<Option<T>, StorageError> {
        match self.load_json(path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn load_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, StorageError> {
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    fn write_atomic<T: Serialize>(&self, path: PathBuf, data: &T) -> Result<(), StorageError> {
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(data)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }
}
