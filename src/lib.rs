pub mod clock;
pub mod commands;
pub mod ctx;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod overlay;
pub mod power;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod store;
pub mod timers;

#[cfg(test)]
mod test_support;

pub use error::CoreError;
pub use events::{ChannelSink, CoreEvent, EventSink};
pub use power::PowerEvent;
pub use service::{scheduler_service, spawn_scheduler, SchedulerHandle, ServiceConfig};
pub use store::ScheduleStore;

#[cfg(all(feature = "app", not(test)))]
use tauri::{Manager, Runtime, WebviewUrl, WebviewWindowBuilder, Window, WindowEvent};
#[cfg(all(feature = "app", not(test)))]
use tauri_plugin_global_shortcut::{GlobalShortcutExt, Shortcut, ShortcutState};

#[cfg(all(feature = "app", not(test)))]
use crate::commands::*;
#[cfg(all(feature = "app", not(test)))]
use crate::models::WindowState;
#[cfg(all(feature = "app", not(test)))]
use crate::overlay::{AppOverlay, TauriOverlaySurface, OVERLAY_LABEL};
#[cfg(all(feature = "app", not(test)))]
use crate::storage::Storage;

#[cfg(all(feature = "app", not(test)))]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;

    use crate::clock::{Clock, SystemClock};
    use crate::events::{NotificationSwitch, TauriEventSink};
    use crate::logging::init_logging;
    use crate::power::{wake_detector_task, WakeDetectorConfig};

    tauri::Builder::default()
        .plugin(tauri_plugin_notification::init())
        .plugin(
            tauri_plugin_global_shortcut::Builder::new()
                .with_handler(|app, _shortcut, event| {
                    if event.state() == ShortcutState::Pressed {
                        app.state::<AppOverlay>().toggle_interact();
                    }
                })
                .build(),
        )
        .setup(|app| {
            let storage = Storage::new(app.path().app_data_dir()?);
            storage.ensure_dirs()?;
            if let Err(err) = init_logging(storage.root()) {
                eprintln!("logger init failed: {err}");
            }

            let settings = storage.load_settings().unwrap_or_else(|err| {
                log::warn!("settings unreadable, using defaults err={err}");
                Default::default()
            });
            let store = ScheduleStore::open(Storage::new(storage.root().to_path_buf()))?;

            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let notifications = NotificationSwitch::new(settings.notifications_enabled);
            let sink = TauriEventSink::new(app.handle().clone(), notifications.clone());
            let (scheduler, service) = scheduler_service(
                store,
                clock.clone(),
                Box::new(sink),
                ServiceConfig::from(&settings),
            );
            tauri::async_runtime::spawn(service);
            tauri::async_runtime::spawn(wake_detector_task(
                scheduler.clone(),
                clock,
                WakeDetectorConfig::from(&settings),
            ));

            let saved_window = storage.load_window_state().unwrap_or_else(|err| {
                log::warn!("window state unreadable err={err}");
                None
            });
            build_overlay(app, saved_window.as_ref())?;
            let runtime = tauri::async_runtime::block_on(async { tokio::runtime::Handle::current() });
            let overlay: AppOverlay = AppOverlay::new(
                TauriOverlaySurface::new(app.handle().clone()),
                Storage::new(storage.root().to_path_buf()),
                saved_window.unwrap_or_default(),
                settings.overlay_auto_timeout_s,
                runtime,
            );

            app.manage(scheduler);
            app.manage(notifications);
            app.manage(overlay);
            app.manage(storage);

            match settings.shortcut.parse::<Shortcut>() {
                Ok(shortcut) => {
                    if let Err(err) = app.handle().global_shortcut().register(shortcut) {
                        log::warn!("shortcut registration failed shortcut={} err={err}", settings.shortcut);
                    }
                }
                Err(err) => log::warn!("shortcut invalid shortcut={} err={err}", settings.shortcut),
            }
            Ok(())
        })
        .on_window_event(|window, event| {
            if window.label() != OVERLAY_LABEL {
                return;
            }
            if matches!(event, WindowEvent::Moved(_) | WindowEvent::Resized(_)) {
                save_overlay_bounds(window);
            }
        })
        .invoke_handler(tauri::generate_handler![
            timer_create,
            timer_list,
            timer_pause,
            timer_resume,
            timer_cancel,
            timer_delete,
            reminder_create,
            reminder_list,
            reminder_cancel,
            reminder_delete,
            notes_list,
            notes_create,
            notes_update,
            notes_delete,
            settings_get,
            settings_update,
            overlay_get_state,
            overlay_toggle_interact,
            overlay_user_activity,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

#[cfg(all(feature = "app", not(test)))]
fn build_overlay(app: &tauri::App, saved: Option<&WindowState>) -> tauri::Result<()> {
    let size = saved.cloned().unwrap_or_default();
    let builder = WebviewWindowBuilder::new(app, OVERLAY_LABEL, WebviewUrl::App("index.html".into()))
        .title("FocusRing")
        .inner_size(f64::from(size.width), f64::from(size.height))
        .decorations(false)
        .transparent(true)
        .resizable(false)
        .always_on_top(true);
    let builder = match saved {
        Some(saved) => builder.position(f64::from(saved.x), f64::from(saved.y)),
        None => builder.center(),
    };
    builder.build()?;
    Ok(())
}

#[cfg(all(feature = "app", not(test)))]
fn save_overlay_bounds<R: Runtime>(window: &Window<R>) {
    let (Ok(position), Ok(size), Ok(scale)) = (
        window.outer_position(),
        window.outer_size(),
        window.scale_factor(),
    ) else {
        return;
    };
    let position = position.to_logical::<i32>(scale);
    let size = size.to_logical::<u32>(scale);
    if let Some(overlay) = window.try_state::<AppOverlay>() {
        overlay.save_bounds(position.x, position.y, size.width, size.height);
    }
}
