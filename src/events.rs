use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::{Reminder, Timer};

pub const EVENT_TIMER_FIRED: &str = "timer_fired";
pub const EVENT_REMINDER_FIRED: &str = "reminder_fired";
pub const EVENT_SYSTEM_RESUMED: &str = "system_resumed";
pub const EVENT_SETTINGS_UPDATED: &str = "settings_updated";
pub const EVENT_OVERLAY_STATE: &str = "overlay_state";

/// Pushed to the UI whenever the scheduler commits a terminal transition or recovers
/// from sleep.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CoreEvent {
    TimerFired(Timer),
    ReminderFired(Reminder),
    SystemResumed,
}

impl CoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::TimerFired(_) => EVENT_TIMER_FIRED,
            CoreEvent::ReminderFired(_) => EVENT_REMINDER_FIRED,
            CoreEvent::SystemResumed => EVENT_SYSTEM_RESUMED,
        }
    }

    /// Title and body of the system notification for this event, if it shows one.
    pub fn notification(&self) -> Option<(String, String)> {
        match self {
            CoreEvent::TimerFired(timer) => {
                let name = timer.name.trim();
                if name.is_empty() {
                    Some(("Timer finished".to_string(), "Your timer is done.".to_string()))
                } else {
                    Some((format!("Timer: {name}"), format!("Your timer \"{name}\" is up.")))
                }
            }
            CoreEvent::ReminderFired(reminder) => {
                Some(("Reminder".to_string(), reminder.message.clone()))
            }
            CoreEvent::SystemResumed => None,
        }
    }
}

/// Receives fired timers/reminders. Implementations must not call back into the
/// scheduler synchronously.
pub trait EventSink: Send {
    fn publish(&self, event: &CoreEvent);
}

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    tx: UnboundedSender<CoreEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<CoreEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &CoreEvent) {
        if self.tx.send(event.clone()).is_err() {
            log::debug!("event dropped, no listener event={}", event.name());
        }
    }
}

/// On/off switch for system notifications, shared between the sink and the
/// settings commands.
#[derive(Debug, Clone, Default)]
pub struct NotificationSwitch(Arc<AtomicBool>);

impl NotificationSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(all(feature = "app", not(test)))]
pub use tauri_sink::TauriEventSink;

#[cfg(all(feature = "app", not(test)))]
mod tauri_sink {
    use tauri::{AppHandle, Emitter, Runtime};
    use tauri_plugin_notification::NotificationExt;

    use super::{CoreEvent, EventSink, NotificationSwitch};

    /// Emits events to every webview and mirrors fired items as system notifications.
    pub struct TauriEventSink<R: Runtime> {
        app: AppHandle<R>,
        notifications: NotificationSwitch,
    }

    impl<R: Runtime> TauriEventSink<R> {
        pub fn new(app: AppHandle<R>, notifications: NotificationSwitch) -> Self {
            Self { app, notifications }
        }
    }

    impl<R: Runtime> EventSink for TauriEventSink<R> {
        fn publish(&self, event: &CoreEvent) {
            let emitted = match event {
                CoreEvent::TimerFired(timer) => self.app.emit(event.name(), timer),
                CoreEvent::ReminderFired(reminder) => self.app.emit(event.name(), reminder),
                CoreEvent::SystemResumed => self.app.emit(event.name(), ()),
            };
            if let Err(err) = emitted {
                log::warn!("emit failed event={} err={err}", event.name());
            }
            if !self.notifications.enabled() {
                return;
            }
            if let Some((title, body)) = event.notification() {
                if let Err(err) = self
                    .app
                    .notification()
                    .builder()
                    .title(title)
                    .body(body)
                    .show()
                {
                    log::warn!("notification failed event={} err={err}", event.name());
                }
            }
        }
    }
}
