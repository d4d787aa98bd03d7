use crate::error::CoreError;
use crate::models::{Note, NoteDraft, NoteId, Reminder, ReminderId, Settings, TimerId, TimerView, TimestampMs};
use crate::overlay::{OverlayController, OverlayStatus, OverlaySurface};
use crate::service::{sweep_interval_in_range, SchedulerHandle};
use crate::storage::Storage;

#[cfg(all(feature = "app", not(test)))]
use crate::clock::{Clock, SystemClock};
#[cfg(all(feature = "app", not(test)))]
use crate::events::{NotificationSwitch, EVENT_SETTINGS_UPDATED};
#[cfg(all(feature = "app", not(test)))]
use crate::overlay::AppOverlay;
#[cfg(all(feature = "app", not(test)))]
use tauri::{AppHandle, Emitter, Manager, Runtime, State};
#[cfg(all(feature = "app", not(test)))]
use tauri_plugin_global_shortcut::{GlobalShortcutExt, Shortcut};

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

trait CommandCtx {
    fn now_ms(&self) -> TimestampMs;
    fn settings_applied(&self, settings: &Settings);
    fn shortcut_unregister_all(&self);
    fn shortcut_validate(&self, shortcut: &str) -> Result<(), String>;
    fn shortcut_register(&self, shortcut: &str) -> Result<(), String>;
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn from_core<T>(result: Result<T, CoreError>) -> CommandResult<T> {
    match result {
        Ok(data) => ok(data),
        Err(error) => {
            log::warn!("command failed err={error}");
            err(&error.to_string())
        }
    }
}

#[cfg(all(feature = "app", not(test)))]
struct TauriCommandCtx<'a, R: Runtime> {
    app: &'a AppHandle<R>,
}

#[cfg(all(feature = "app", not(test)))]
impl<R: Runtime> CommandCtx for TauriCommandCtx<'_, R> {
    fn now_ms(&self) -> TimestampMs {
        SystemClock.now_ms()
    }

    fn settings_applied(&self, settings: &Settings) {
        self.app
            .state::<NotificationSwitch>()
            .set(settings.notifications_enabled);
        if let Some(overlay) = self.app.try_state::<AppOverlay>() {
            overlay.set_auto_revert(settings.overlay_auto_timeout_s);
        }
        let _ = self.app.emit(EVENT_SETTINGS_UPDATED, settings);
    }

    fn shortcut_unregister_all(&self) {
        let _ = self.app.global_shortcut().unregister_all();
    }

    fn shortcut_validate(&self, shortcut: &str) -> Result<(), String> {
        shortcut
            .trim()
            .parse::<Shortcut>()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn shortcut_register(&self, shortcut: &str) -> Result<(), String> {
        let parsed = shortcut.trim().parse::<Shortcut>().map_err(|e| e.to_string())?;
        self.app
            .global_shortcut()
            .register(parsed)
            .map_err(|e| e.to_string())
    }
}

async fn timer_create_impl(
    scheduler: &SchedulerHandle,
    name: String,
    total_seconds: f64,
) -> CommandResult<TimerView> {
    from_core(scheduler.create_timer(name, total_seconds).await)
}

async fn timer_list_impl(scheduler: &SchedulerHandle) -> CommandResult<Vec<TimerView>> {
    from_core(scheduler.list_timers().await)
}

async fn timer_pause_impl(
    scheduler: &SchedulerHandle,
    id: TimerId,
) -> CommandResult<Option<TimerView>> {
    from_core(scheduler.pause_timer(id).await)
}

async fn timer_resume_impl(
    scheduler: &SchedulerHandle,
    id: TimerId,
) -> CommandResult<Option<TimerView>> {
    from_core(scheduler.resume_timer(id).await)
}

async fn timer_cancel_impl(
    scheduler: &SchedulerHandle,
    id: TimerId,
) -> CommandResult<Option<TimerView>> {
    from_core(scheduler.cancel_timer(id).await)
}

async fn timer_delete_impl(scheduler: &SchedulerHandle, id: TimerId) -> CommandResult<bool> {
    from_core(scheduler.delete_timer(id).await)
}

async fn reminder_create_impl(
    scheduler: &SchedulerHandle,
    message: String,
    fire_at: TimestampMs,
) -> CommandResult<Reminder> {
    from_core(scheduler.create_reminder(message, fire_at).await)
}

async fn reminder_list_impl(scheduler: &SchedulerHandle) -> CommandResult<Vec<Reminder>> {
    from_core(scheduler.list_reminders().await)
}

async fn reminder_cancel_impl(scheduler: &SchedulerHandle, id: ReminderId) -> CommandResult<bool> {
    from_core(scheduler.cancel_reminder(id).await)
}

async fn reminder_delete_impl(scheduler: &SchedulerHandle, id: ReminderId) -> CommandResult<bool> {
    from_core(scheduler.delete_reminder(id).await)
}

fn notes_list_impl(storage: &Storage) -> CommandResult<Vec<Note>> {
    match storage.list_notes() {
        Ok(notes) => ok(notes),
        Err(error) => err(&format!("storage error: {error}")),
    }
}

fn notes_create_impl(
    ctx: &impl CommandCtx,
    storage: &Storage,
    draft: NoteDraft,
) -> CommandResult<Note> {
    match storage.create_note(draft, ctx.now_ms()) {
        Ok(note) => ok(note),
        Err(error) => err(&format!("storage error: {error}")),
    }
}

/// `None` when the note no longer exists.
fn notes_update_impl(
    ctx: &impl CommandCtx,
    storage: &Storage,
    note: Note,
) -> CommandResult<Option<Note>> {
    match storage.update_note(note, ctx.now_ms()) {
        Ok(updated) => ok(updated),
        Err(error) => err(&format!("storage error: {error}")),
    }
}

fn notes_delete_impl(storage: &Storage, id: NoteId) -> CommandResult<bool> {
    match storage.remove_note(id) {
        Ok(removed) => ok(removed),
        Err(error) => err(&format!("storage error: {error}")),
    }
}

fn settings_get_impl(storage: &Storage) -> CommandResult<Settings> {
    match storage.load_settings() {
        Ok(settings) => ok(settings),
        Err(error) => {
            log::warn!("settings unreadable, using defaults err={error}");
            ok(Settings::default())
        }
    }
}

fn validate_settings(mut settings: Settings) -> Result<Settings, String> {
    settings.shortcut = settings.shortcut.trim().to_string();
    if settings.shortcut.is_empty() {
        return Err("shortcut must not be empty".to_string());
    }
    if settings.overlay_auto_timeout_s == 0 {
        return Err("overlay auto timeout must be greater than zero".to_string());
    }
    if !sweep_interval_in_range(settings.reminder_sweep_ms) {
        return Err("reminder sweep interval must be between 100 and 60000 ms".to_string());
    }
    if settings.wake_check_interval_s == 0 {
        return Err("wake check interval must be greater than zero".to_string());
    }
    Ok(settings)
}

/// Swaps the global shortcut, putting the previous one back if the new one
/// cannot be registered.
fn swap_shortcut(ctx: &impl CommandCtx, previous: &str, next: &str) -> Result<(), String> {
    ctx.shortcut_validate(next)
        .map_err(|e| format!("invalid shortcut: {e}"))?;
    ctx.shortcut_unregister_all();
    if let Err(register_err) = ctx.shortcut_register(next) {
        let _ = ctx.shortcut_register(previous);
        return Err(format!("failed to register shortcut: {register_err}"));
    }
    Ok(())
}

fn settings_update_impl(
    ctx: &impl CommandCtx,
    storage: &Storage,
    settings: Settings,
) -> CommandResult<Settings> {
    let settings = match validate_settings(settings) {
        Ok(settings) => settings,
        Err(message) => return err(&format!("invalid settings: {message}")),
    };
    let previous = storage.load_settings().unwrap_or_default();
    let shortcut_changed = previous.shortcut.trim() != settings.shortcut;
    if shortcut_changed {
        if let Err(message) = swap_shortcut(ctx, &previous.shortcut, &settings.shortcut) {
            return err(&message);
        }
    }
    if let Err(error) = storage.save_settings(&settings) {
        if shortcut_changed {
            ctx.shortcut_unregister_all();
            let _ = ctx.shortcut_register(&previous.shortcut);
        }
        return err(&format!("storage error: {error}"));
    }
    // Sweep and wake intervals are read when the scheduler starts.
    log::info!(
        "settings saved sweep_ms={} wake_check_s={} notifications={}",
        settings.reminder_sweep_ms,
        settings.wake_check_interval_s,
        settings.notifications_enabled
    );
    ctx.settings_applied(&settings);
    ok(settings)
}

fn overlay_get_state_impl<S: OverlaySurface>(
    overlay: &OverlayController<S>,
) -> CommandResult<OverlayStatus> {
    ok(overlay.status())
}

fn overlay_toggle_interact_impl<S: OverlaySurface>(
    overlay: &OverlayController<S>,
) -> CommandResult<OverlayStatus> {
    ok(overlay.toggle_interact())
}

fn overlay_user_activity_impl<S: OverlaySurface>(
    overlay: &OverlayController<S>,
) -> CommandResult<OverlayStatus> {
    ok(overlay.user_activity())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn timer_create(
    scheduler: State<'_, SchedulerHandle>,
    name: String,
    total_seconds: f64,
) -> Result<CommandResult<TimerView>, String> {
    Ok(timer_create_impl(scheduler.inner(), name, total_seconds).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn timer_list(
    scheduler: State<'_, SchedulerHandle>,
) -> Result<CommandResult<Vec<TimerView>>, String> {
    Ok(timer_list_impl(scheduler.inner()).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn timer_pause(
    scheduler: State<'_, SchedulerHandle>,
    id: TimerId,
) -> Result<CommandResult<Option<TimerView>>, String> {
    Ok(timer_pause_impl(scheduler.inner(), id).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn timer_resume(
    scheduler: State<'_, SchedulerHandle>,
    id: TimerId,
) -> Result<CommandResult<Option<TimerView>>, String> {
    Ok(timer_resume_impl(scheduler.inner(), id).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn timer_cancel(
    scheduler: State<'_, SchedulerHandle>,
    id: TimerId,
) -> Result<CommandResult<Option<TimerView>>, String> {
    Ok(timer_cancel_impl(scheduler.inner(), id).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn timer_delete(
    scheduler: State<'_, SchedulerHandle>,
    id: TimerId,
) -> Result<CommandResult<bool>, String> {
    Ok(timer_delete_impl(scheduler.inner(), id).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn reminder_create(
    scheduler: State<'_, SchedulerHandle>,
    message: String,
    fire_at: TimestampMs,
) -> Result<CommandResult<Reminder>, String> {
    Ok(reminder_create_impl(scheduler.inner(), message, fire_at).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn reminder_list(
    scheduler: State<'_, SchedulerHandle>,
) -> Result<CommandResult<Vec<Reminder>>, String> {
    Ok(reminder_list_impl(scheduler.inner()).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn reminder_cancel(
    scheduler: State<'_, SchedulerHandle>,
    id: ReminderId,
) -> Result<CommandResult<bool>, String> {
    Ok(reminder_cancel_impl(scheduler.inner(), id).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn reminder_delete(
    scheduler: State<'_, SchedulerHandle>,
    id: ReminderId,
) -> Result<CommandResult<bool>, String> {
    Ok(reminder_delete_impl(scheduler.inner(), id).await)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn notes_list(storage: State<Storage>) -> CommandResult<Vec<Note>> {
    notes_list_impl(storage.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn notes_create(app: AppHandle, storage: State<Storage>, draft: NoteDraft) -> CommandResult<Note> {
    let ctx = TauriCommandCtx { app: &app };
    notes_create_impl(&ctx, storage.inner(), draft)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn notes_update(
    app: AppHandle,
    storage: State<Storage>,
    note: Note,
) -> CommandResult<Option<Note>> {
    let ctx = TauriCommandCtx { app: &app };
    notes_update_impl(&ctx, storage.inner(), note)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn notes_delete(storage: State<Storage>, id: NoteId) -> CommandResult<bool> {
    notes_delete_impl(storage.inner(), id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn settings_get(storage: State<Storage>) -> CommandResult<Settings> {
    settings_get_impl(storage.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn settings_update(
    app: AppHandle,
    storage: State<Storage>,
    settings: Settings,
) -> CommandResult<Settings> {
    let ctx = TauriCommandCtx { app: &app };
    settings_update_impl(&ctx, storage.inner(), settings)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn overlay_get_state(overlay: State<AppOverlay>) -> CommandResult<OverlayStatus> {
    overlay_get_state_impl(overlay.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn overlay_toggle_interact(overlay: State<AppOverlay>) -> CommandResult<OverlayStatus> {
    overlay_toggle_interact_impl(overlay.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn overlay_user_activity(overlay: State<AppOverlay>) -> CommandResult<OverlayStatus> {
    overlay_user_activity_impl(overlay.inner())
}
