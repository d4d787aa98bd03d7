//! Click-through and interactive modes of the overlay window.
//!
//! The overlay starts click-through. Toggling it interactive arms an
//! auto-revert; user activity inside the overlay pushes the revert back.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::models::{OverlayMode, WindowState};
use crate::storage::Storage;

pub const OVERLAY_LABEL: &str = "overlay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverlayStatus {
    pub interactive: bool,
}

/// The window side of the overlay.
pub trait OverlaySurface: Send + Sync + 'static {
    /// `true` lets mouse input fall through to the windows below.
    fn set_click_through(&self, click_through: bool);
    fn state_changed(&self, status: OverlayStatus);
}

struct OverlayInner {
    window: WindowState,
    auto_revert: Duration,
    generation: u64,
    revert_task: Option<AbortHandle>,
}

struct Shared<S> {
    surface: S,
    storage: Storage,
    runtime: Handle,
    inner: Mutex<OverlayInner>,
}

/// Single writer of `window_state.json`: bounds and mode go through here.
pub struct OverlayController<S: OverlaySurface> {
    shared: Arc<Shared<S>>,
}

impl<S: OverlaySurface> Clone for OverlayController<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: OverlaySurface> OverlayController<S> {
    /// Applies click-through immediately, whatever mode was saved last time.
    pub fn new(
        surface: S,
        storage: Storage,
        mut window: WindowState,
        auto_revert_s: u32,
        runtime: Handle,
    ) -> Self {
        window.overlay_mode = OverlayMode::Clickthrough;
        let controller = Self {
            shared: Arc::new(Shared {
                surface,
                storage,
                runtime,
                inner: Mutex::new(OverlayInner {
                    window,
                    auto_revert: auto_revert_duration(auto_revert_s),
                    generation: 0,
                    revert_task: None,
                }),
            }),
        };
        let status = {
            let inner = controller.lock();
            controller.persist(&inner.window);
            status_of(&inner.window)
        };
        controller.apply(status);
        controller
    }

    pub fn status(&self) -> OverlayStatus {
        status_of(&self.lock().window)
    }

    pub fn window_state(&self) -> WindowState {
        self.lock().window.clone()
    }

    pub fn toggle_interact(&self) -> OverlayStatus {
        let status = {
            let mut inner = self.lock();
            let next = match inner.window.overlay_mode {
                OverlayMode::Clickthrough => OverlayMode::Interactive,
                OverlayMode::Interactive => OverlayMode::Clickthrough,
            };
            inner.window.overlay_mode = next;
            if next == OverlayMode::Interactive {
                self.arm_revert(&mut inner);
            } else {
                disarm_revert(&mut inner);
            }
            self.persist(&inner.window);
            status_of(&inner.window)
        };
        log::info!("overlay mode toggled interactive={}", status.interactive);
        self.apply(status);
        status
    }

    /// Restarts the auto-revert countdown while interactive. No-op otherwise.
    pub fn user_activity(&self) -> OverlayStatus {
        let mut inner = self.lock();
        if inner.window.overlay_mode == OverlayMode::Interactive {
            self.arm_revert(&mut inner);
        }
        status_of(&inner.window)
    }

    pub fn set_auto_revert(&self, auto_revert_s: u32) {
        let mut inner = self.lock();
        inner.auto_revert = auto_revert_duration(auto_revert_s);
        if inner.window.overlay_mode == OverlayMode::Interactive {
            self.arm_revert(&mut inner);
        }
    }

    /// Records new logical bounds, keeping the current mode.
    pub fn save_bounds(&self, x: i32, y: i32, width: u32, height: u32) {
        let mut inner = self.lock();
        inner.window.x = x;
        inner.window.y = y;
        inner.window.width = width;
        inner.window.height = height;
        self.persist(&inner.window);
    }

    fn revert(&self, generation: u64) {
        let status = {
            let mut inner = self.lock();
            if inner.generation != generation
                || inner.window.overlay_mode != OverlayMode::Interactive
            {
                return;
            }
            inner.window.overlay_mode = OverlayMode::Clickthrough;
            inner.revert_task = None;
            self.persist(&inner.window);
            status_of(&inner.window)
        };
        log::info!("overlay reverted to click-through");
        self.apply(status);
    }

    fn arm_revert(&self, inner: &mut OverlayInner) {
        disarm_revert(inner);
        let generation = inner.generation;
        let delay = inner.auto_revert;
        let controller = self.clone();
        let task = self.shared.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            controller.revert(generation);
        });
        inner.revert_task = Some(task.abort_handle());
    }

    fn apply(&self, status: OverlayStatus) {
        self.shared.surface.set_click_through(!status.interactive);
        self.shared.surface.state_changed(status);
    }

    fn persist(&self, window: &WindowState) {
        if let Err(err) = self.shared.storage.save_window_state(window) {
            log::warn!("window state save failed err={err}");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OverlayInner> {
        self.shared.inner.lock().expect("overlay state poisoned")
    }
}

fn disarm_revert(inner: &mut OverlayInner) {
    inner.generation += 1;
    if let Some(task) = inner.revert_task.take() {
        task.abort();
    }
}

fn status_of(window: &WindowState) -> OverlayStatus {
    OverlayStatus {
        interactive: window.overlay_mode == OverlayMode::Interactive,
    }
}

fn auto_revert_duration(seconds: u32) -> Duration {
    Duration::from_secs(u64::from(seconds.max(1)))
}

#[cfg(all(feature = "app", not(test)))]
pub use tauri_surface::{AppOverlay, TauriOverlaySurface};

#[cfg(all(feature = "app", not(test)))]
mod tauri_surface {
    use tauri::{AppHandle, Emitter, Manager, Runtime};

    use super::{OverlayController, OverlayStatus, OverlaySurface, OVERLAY_LABEL};
    use crate::events::EVENT_OVERLAY_STATE;

    pub type AppOverlay = OverlayController<TauriOverlaySurface<tauri::Wry>>;

    pub struct TauriOverlaySurface<R: Runtime> {
        app: AppHandle<R>,
    }

    impl<R: Runtime> TauriOverlaySurface<R> {
        pub fn new(app: AppHandle<R>) -> Self {
            Self { app }
        }
    }

    impl<R: Runtime> OverlaySurface for TauriOverlaySurface<R> {
        fn set_click_through(&self, click_through: bool) {
            let Some(window) = self.app.get_webview_window(OVERLAY_LABEL) else {
                return;
            };
            if let Err(err) = window.set_ignore_cursor_events(click_through) {
                log::warn!("set_ignore_cursor_events failed err={err}");
            }
        }

        fn state_changed(&self, status: OverlayStatus) {
            let _ = self.app.emit(EVENT_OVERLAY_STATE, status);
        }
    }
}
