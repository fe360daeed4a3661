//! Optional-hook lifecycle contract implemented by every app instance.

use std::{
    cell::{Cell, RefCell},
    panic::{catch_unwind, AssertUnwindSafe},
};

use futures::{future::LocalBoxFuture, FutureExt};
use thiserror::Error;

use crate::{context::AppContext, events::panic_message, TeamId, WindowId};

/// Failure reported by an app hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Creates a hook error with a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Boxed future returned by asynchronous hooks.
pub type HookFuture<'a, T = ()> = LocalBoxFuture<'a, Result<T, HookError>>;

/// Content area of a window that an app renders into.
///
/// The shell renderer reads the latest markup by [`ContentRegion::dom_id`]; apps only ever see
/// their own region.
#[derive(Debug)]
pub struct ContentRegion {
    window_id: WindowId,
    dom_id: String,
    markup: RefCell<Option<String>>,
    generation: Cell<u64>,
}

impl ContentRegion {
    /// Creates the region for `window_id`.
    pub fn new(window_id: WindowId) -> Self {
        Self {
            window_id,
            dom_id: format!("window-body-{}", window_id.0),
            markup: RefCell::new(None),
            generation: Cell::new(0),
        }
    }

    /// Window hosting the region.
    pub fn window_id(&self) -> WindowId {
        self.window_id
    }

    /// DOM id of the region element.
    pub fn dom_id(&self) -> &str {
        &self.dom_id
    }

    /// Replaces the rendered content.
    pub fn replace(&self, markup: impl Into<String>) {
        *self.markup.borrow_mut() = Some(markup.into());
        self.generation.set(self.generation.get() + 1);
    }

    /// Returns the latest rendered content.
    pub fn markup(&self) -> Option<String> {
        self.markup.borrow().clone()
    }

    /// Number of times content has been replaced.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Removes rendered content.
    pub fn clear(&self) {
        self.markup.borrow_mut().take();
    }
}

/// Lifecycle hooks of an app instance. Every hook is optional.
///
/// Asynchronous hooks may suspend; the runtime awaits them in order. Synchronous hooks are
/// driven from window-manager events. A hook that fails or panics is logged by the runtime and
/// never aborts the surrounding transition.
pub trait BaseApp {
    /// Renders into the window content region. Called after launch and after team switches of
    /// team-scoped apps.
    fn render(&self, _context: &AppContext, _region: &ContentRegion) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after the first render.
    fn on_mount<'a>(&'a self, _context: &'a AppContext) -> HookFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// Runs before the window is removed.
    fn on_unmount<'a>(&'a self, _context: &'a AppContext) -> HookFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// The window gained focus.
    fn on_activate(&self, _context: &AppContext) -> Result<(), HookError> {
        Ok(())
    }

    /// The window lost focus.
    fn on_deactivate(&self, _context: &AppContext) -> Result<(), HookError> {
        Ok(())
    }

    /// The window size changed.
    fn on_resize(&self, _context: &AppContext, _width: i32, _height: i32) -> Result<(), HookError> {
        Ok(())
    }

    /// The team changed; `context` is already rebuilt for `new_team`.
    fn on_team_switch<'a>(
        &'a self,
        _context: &'a AppContext,
        _new_team: Option<TeamId>,
        _old_team: Option<TeamId>,
    ) -> HookFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// The user asked to close the window. Resolving `false` vetoes the close.
    fn on_close_requested<'a>(&'a self, _context: &'a AppContext) -> HookFuture<'a, bool> {
        Box::pin(async { Ok(true) })
    }
}

/// Runs an asynchronous hook, converting panics (while building or polling the future) into
/// [`HookError`]s.
pub async fn guard_hook<'a, T>(
    call: impl FnOnce() -> HookFuture<'a, T>,
) -> Result<T, HookError> {
    let future = catch_unwind(AssertUnwindSafe(call)).map_err(|panic| panicked(panic.as_ref()))?;
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(panicked(panic.as_ref())),
    }
}

/// Runs a synchronous hook, converting panics into [`HookError`]s.
pub fn guard_sync_hook<T>(call: impl FnOnce() -> Result<T, HookError>) -> Result<T, HookError> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|panic| Err(panicked(panic.as_ref())))
}

fn panicked(panic: &(dyn std::any::Any + Send)) -> HookError {
    HookError::new(format!("hook panicked: {}", panic_message(panic)))
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use serde_json::{Map, Value};

    use super::*;
    use crate::{
        context::{AppServices, WindowService},
        events::{EventBus, EventScope},
        ApplicationId, UserId,
    };

    struct Silent;

    impl BaseApp for Silent {}

    struct Grumpy;

    fn explode() -> Result<(), HookError> {
        panic!("mount blew up")
    }

    impl BaseApp for Grumpy {
        fn on_mount<'a>(&'a self, _context: &'a AppContext) -> HookFuture<'a> {
            Box::pin(async { explode() })
        }

        fn on_activate(&self, _context: &AppContext) -> Result<(), HookError> {
            Err(HookError::new("not today"))
        }
    }

    fn context() -> AppContext {
        AppContext::new(
            WindowId(1),
            ApplicationId::trusted("calculator"),
            None,
            UserId(1),
            Default::default(),
            Map::new(),
            Value::Null,
            AppServices {
                window: WindowService::disabled(),
                events: EventScope::new(EventBus::new(), Some(WindowId(1))),
            },
        )
    }

    #[test]
    fn default_hooks_are_noops_and_allow_close() {
        let app = Silent;
        let context = context();

        assert_eq!(block_on(guard_hook(|| app.on_mount(&context))), Ok(()));
        assert_eq!(
            block_on(guard_hook(|| app.on_close_requested(&context))),
            Ok(true)
        );
        assert_eq!(guard_sync_hook(|| app.on_resize(&context, 10, 10)), Ok(()));
    }

    #[test]
    fn hook_panics_and_errors_become_hook_errors() {
        let app = Grumpy;
        let context = context();

        let mounted = block_on(guard_hook(|| app.on_mount(&context)));
        assert!(mounted.unwrap_err().message().contains("mount blew up"));
        assert_eq!(
            guard_sync_hook(|| app.on_activate(&context)),
            Err(HookError::new("not today"))
        );
    }

    #[test]
    fn content_region_tracks_render_generations() {
        let region = ContentRegion::new(WindowId(12));
        assert_eq!(region.dom_id(), "window-body-12");
        region.replace("<p>1</p>");
        region.replace("<p>2</p>");
        assert_eq!(region.generation(), 2);
        assert_eq!(region.markup().as_deref(), Some("<p>2</p>"));
        region.clear();
        assert_eq!(region.markup(), None);
    }
}
