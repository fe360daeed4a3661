//! Wiring of the desktop runtime services and browser environment queries.
//!
//! [`DesktopHost`] assembles the registry, bus, window manager, gesture controller, app runtime,
//! and shell models over one shared [`EventBus`]. Browser specifics (viewport size, document
//! listeners) are the only target-dependent parts.

use std::rc::Rc;

use desktop_app_contract::{EventBus, Principal};

use crate::{
    app_runtime::AppRuntime,
    config::DesktopConfig,
    context_source::ContextSource,
    error::DesktopError,
    gesture::{InteractionController, PointerListenerHost},
    model::{WindowRect, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH},
    registry::AppRegistry,
    shell::{DesktopSelection, TaskbarModel},
    window_manager::WindowManager,
};

/// Service bundle for one desktop session.
pub struct DesktopHost {
    pub manager: Rc<WindowManager>,
    pub runtime: Rc<AppRuntime>,
    pub gestures: Rc<InteractionController>,
    pub taskbar: TaskbarModel,
    pub selection: DesktopSelection,
}

impl DesktopHost {
    /// Builds a session over the built-in app catalog.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError::InvalidConfig`] or [`DesktopError::InvalidManifest`].
    pub fn new(
        config: DesktopConfig,
        source: Rc<dyn ContextSource>,
        principal: Principal,
        pointer_host: Rc<dyn PointerListenerHost>,
        viewport: WindowRect,
    ) -> Result<Self, DesktopError> {
        Self::with_registry(
            AppRegistry::builtin()?,
            config,
            source,
            principal,
            pointer_host,
            viewport,
        )
    }

    /// Builds a session over a caller-provided registry.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError::InvalidConfig`] when `config` is out of range.
    pub fn with_registry(
        registry: AppRegistry,
        config: DesktopConfig,
        source: Rc<dyn ContextSource>,
        principal: Principal,
        pointer_host: Rc<dyn PointerListenerHost>,
        viewport: WindowRect,
    ) -> Result<Self, DesktopError> {
        config.validate()?;
        let bus = EventBus::new();
        let manager = Rc::new(WindowManager::new(
            Rc::new(registry),
            bus.clone(),
            config,
            viewport,
        ));
        Ok(Self {
            runtime: AppRuntime::new(manager.clone(), source, principal),
            gestures: InteractionController::new(manager.clone(), pointer_host),
            taskbar: TaskbarModel::new(&manager),
            selection: DesktopSelection::new(bus),
            manager,
        })
    }

    /// Builds a browser session sized to the current window, with document pointer listeners.
    ///
    /// # Errors
    ///
    /// See [`DesktopHost::new`].
    #[cfg(target_arch = "wasm32")]
    pub fn browser(
        config: DesktopConfig,
        source: Rc<dyn ContextSource>,
        principal: Principal,
    ) -> Result<Self, DesktopError> {
        let viewport = desktop_viewport_rect(config.taskbar_height_px);
        Self::new(
            config,
            source,
            principal,
            Rc::new(crate::gesture::DocumentPointerListeners),
            viewport,
        )
    }

    /// Re-measures the browser viewport and refits windows to it.
    pub fn refresh_viewport(&self) {
        let viewport = desktop_viewport_rect(self.manager.config().taskbar_height_px);
        if viewport != self.manager.viewport() {
            self.manager.set_viewport(viewport);
        }
    }
}

/// Desktop area above the taskbar. Natively this is the default 1024×768 screen.
pub fn desktop_viewport_rect(taskbar_height_px: i32) -> WindowRect {
    #[cfg(target_arch = "wasm32")]
    {
        if let Some(window) = web_sys::window() {
            let width = window
                .inner_width()
                .ok()
                .and_then(|value| value.as_f64())
                .map(|value| value as i32)
                .unwrap_or(DEFAULT_VIEWPORT_WIDTH);
            let height = window
                .inner_height()
                .ok()
                .and_then(|value| value.as_f64())
                .map(|value| value as i32)
                .unwrap_or(DEFAULT_VIEWPORT_HEIGHT);

            return WindowRect::new(0, 0, width.max(320), (height - taskbar_height_px).max(220));
        }
    }

    WindowRect::new(
        0,
        0,
        DEFAULT_VIEWPORT_WIDTH,
        DEFAULT_VIEWPORT_HEIGHT - taskbar_height_px,
    )
}
