//! Pointer-driven drag and resize gestures.
//!
//! A gesture starts on a window frame pointer-down and then follows document-level pointer
//! events, which a [`PointerListenerHost`] installs for the lifetime of the gesture. The listeners
//! are owned by a [`ListenerGuard`] stored in the gesture session, so every way a session ends
//! (release, cancel, the window closing or changing mode, the controller being dropped) removes
//! them.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::{Rc, Weak},
};

use desktop_app_contract::{DesktopEvent, EventChannel, Subscription};
use leptos::logging;

use crate::{
    error::DesktopError,
    model::{
        HitTarget, PointerDown, PointerId, PointerKind, PointerPosition, ResizeEdge, WindowId,
        WindowMode, WindowRect,
    },
    window_manager::{resize_rect, WindowManager},
};

/// Document-level pointer signal forwarded to an active gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSignal {
    Move(PointerPosition),
    Up(PointerPosition),
    Cancel,
}

/// Installs global pointer listeners for one pointer.
pub trait PointerListenerHost {
    /// Starts forwarding signals for `pointer_id` to `sink` until the guard is dropped.
    fn acquire(&self, pointer_id: PointerId, sink: Rc<dyn Fn(PointerSignal)>) -> ListenerGuard;
}

/// Owns installed listeners; dropping it removes them.
#[must_use = "listeners are removed as soon as the guard is dropped"]
pub struct ListenerGuard {
    release: Option<Box<dyn FnOnce()>>,
}

impl ListenerGuard {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Guard for hosts that installed nothing.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Drag,
    Resize(ResizeEdge),
}

#[derive(Debug)]
struct GestureSession {
    window_id: WindowId,
    kind: GestureKind,
    origin: PointerPosition,
    start_rect: WindowRect,
    moved: bool,
    _listeners: ListenerGuard,
}

/// Owns every active drag/resize gesture, keyed by pointer.
pub struct InteractionController {
    manager: Rc<WindowManager>,
    host: Rc<dyn PointerListenerHost>,
    sessions: RefCell<BTreeMap<PointerId, GestureSession>>,
    this: Weak<InteractionController>,
    _subscriptions: Vec<Subscription>,
}

impl InteractionController {
    pub fn new(manager: Rc<WindowManager>, host: Rc<dyn PointerListenerHost>) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let aborting = [
                (EventChannel::WindowClosed, "window closed"),
                (EventChannel::WindowMinimized, "window minimized"),
                (EventChannel::WindowMaximizeToggled, "window maximized"),
            ];
            let subscriptions = aborting
                .into_iter()
                .map(|(channel, reason)| {
                    let this = this.clone();
                    manager.bus().on(channel, move |event: &DesktopEvent| {
                        let (Some(controller), Some(window_id)) = (this.upgrade(), event.window_id())
                        else {
                            return;
                        };
                        controller.abort_window(window_id, reason);
                    })
                })
                .collect();

            Self {
                manager,
                host,
                sessions: RefCell::new(BTreeMap::new()),
                this: this.clone(),
                _subscriptions: subscriptions,
            }
        })
    }

    /// Handles a pointer-down on a window frame. Returns `true` when a gesture started.
    ///
    /// Body hits only activate the window; the content keeps the event.
    pub fn pointer_down(&self, down: PointerDown) -> bool {
        let Some(window) = self.manager.get_window(down.window_id) else {
            return false;
        };
        if window.is_minimized() {
            return false;
        }
        let busy = {
            let sessions = self.sessions.borrow();
            sessions.contains_key(&down.pointer_id)
                || sessions
                    .values()
                    .any(|session| session.window_id == down.window_id)
        };
        if busy {
            return false;
        }

        let normal = window.mode == WindowMode::Normal;
        let kind = match down.target {
            HitTarget::Header if normal && window.constraints.draggable => Some(GestureKind::Drag),
            HitTarget::Edge(edge)
                if normal
                    && window.constraints.resizable
                    && !self.manager.config().touch_input
                    && down.kind != PointerKind::Touch =>
            {
                Some(GestureKind::Resize(edge))
            }
            _ => None,
        };

        self.manager.activate(down.window_id);
        let Some(kind) = kind else {
            return false;
        };
        // Activation handlers may have closed or changed the window.
        let Some(window) = self
            .manager
            .get_window(down.window_id)
            .filter(|window| window.mode == WindowMode::Normal)
        else {
            return false;
        };

        let listeners = self
            .host
            .acquire(down.pointer_id, self.signal_sink(down.pointer_id));
        self.sessions.borrow_mut().insert(
            down.pointer_id,
            GestureSession {
                window_id: down.window_id,
                kind,
                origin: down.position,
                start_rect: window.rect,
                moved: false,
                _listeners: listeners,
            },
        );
        true
    }

    /// Applies a pointer move. Returns `true` when the window geometry changed.
    pub fn pointer_move(&self, pointer_id: PointerId, position: PointerPosition) -> bool {
        let session = {
            let mut sessions = self.sessions.borrow_mut();
            let Some(session) = sessions.get_mut(&pointer_id) else {
                return false;
            };
            session.moved = true;
            (session.window_id, session.kind, session.origin, session.start_rect)
        };
        let (window_id, kind, origin, start_rect) = session;
        let dx = position.x - origin.x;
        let dy = position.y - origin.y;

        match kind {
            GestureKind::Drag => {
                self.manager
                    .move_window(window_id, start_rect.x + dx, start_rect.y + dy)
            }
            GestureKind::Resize(edge) => {
                self.manager
                    .resize_from_edge(window_id, edge, resize_rect(start_rect, edge, dx, dy))
            }
        }
    }

    /// Ends the gesture at `position`. Returns `false` when the pointer had no gesture.
    pub fn pointer_up(&self, pointer_id: PointerId, position: PointerPosition) -> bool {
        if !self.sessions.borrow().contains_key(&pointer_id) {
            return false;
        }
        self.pointer_move(pointer_id, position);

        let Some(session) = self.sessions.borrow_mut().remove(&pointer_id) else {
            return false;
        };
        let snap = self.manager.config().snap_to_edges
            && session.moved
            && session.kind == GestureKind::Drag;
        let window_id = session.window_id;
        drop(session);

        if snap {
            self.manager.snap_to_edge(window_id);
        }
        true
    }

    /// Aborts the gesture of `pointer_id`, leaving geometry at its last clamped value.
    pub fn cancel(&self, pointer_id: PointerId) -> Option<DesktopError> {
        let session = self.sessions.borrow_mut().remove(&pointer_id)?;
        Some(aborted(session, "pointer cancelled"))
    }

    /// Aborts every gesture, e.g. when the browser window loses focus.
    pub fn cancel_all(&self) -> Vec<DesktopError> {
        let sessions = std::mem::take(&mut *self.sessions.borrow_mut());
        sessions
            .into_values()
            .map(|session| aborted(session, "focus lost"))
            .collect()
    }

    pub fn active_gesture_count(&self) -> usize {
        self.sessions.borrow().len()
    }

    pub fn gesture_for_window(&self, window_id: WindowId) -> Option<(PointerId, GestureKind)> {
        self.sessions
            .borrow()
            .iter()
            .find(|(_, session)| session.window_id == window_id)
            .map(|(pointer_id, session)| (*pointer_id, session.kind))
    }

    fn abort_window(&self, window_id: WindowId, reason: &'static str) {
        let removed: Vec<GestureSession> = {
            let mut sessions = self.sessions.borrow_mut();
            let pointers: Vec<PointerId> = sessions
                .iter()
                .filter(|(_, session)| session.window_id == window_id)
                .map(|(pointer_id, _)| *pointer_id)
                .collect();
            pointers
                .into_iter()
                .filter_map(|pointer_id| sessions.remove(&pointer_id))
                .collect()
        };
        for session in removed {
            aborted(session, reason);
        }
    }

    fn signal_sink(&self, pointer_id: PointerId) -> Rc<dyn Fn(PointerSignal)> {
        let this = self.this.clone();
        Rc::new(move |signal: PointerSignal| {
            let Some(controller) = this.upgrade() else {
                return;
            };
            match signal {
                PointerSignal::Move(position) => {
                    controller.pointer_move(pointer_id, position);
                }
                PointerSignal::Up(position) => {
                    controller.pointer_up(pointer_id, position);
                }
                PointerSignal::Cancel => {
                    controller.cancel(pointer_id);
                }
            }
        })
    }
}

impl std::fmt::Debug for InteractionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionController")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

fn aborted(session: GestureSession, reason: &'static str) -> DesktopError {
    let err = DesktopError::GestureAborted {
        window_id: session.window_id,
        reason,
    };
    logging::warn!("{err}");
    err
}

/// Listener host that records acquisitions and lets callers inject document signals.
#[derive(Default)]
pub struct RecordingPointerHost {
    active: Rc<RefCell<BTreeMap<PointerId, Rc<dyn Fn(PointerSignal)>>>>,
    acquired: Cell<usize>,
}

impl RecordingPointerHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `signal` as if the document fired it. Returns `false` when nobody listens.
    pub fn dispatch(&self, pointer_id: PointerId, signal: PointerSignal) -> bool {
        let sink = self.active.borrow().get(&pointer_id).cloned();
        match sink {
            Some(sink) => {
                sink(signal);
                true
            }
            None => false,
        }
    }

    pub fn active_listeners(&self) -> usize {
        self.active.borrow().len()
    }

    pub fn total_acquired(&self) -> usize {
        self.acquired.get()
    }
}

impl PointerListenerHost for RecordingPointerHost {
    fn acquire(&self, pointer_id: PointerId, sink: Rc<dyn Fn(PointerSignal)>) -> ListenerGuard {
        self.acquired.set(self.acquired.get() + 1);
        self.active.borrow_mut().insert(pointer_id, sink);
        let active = Rc::downgrade(&self.active);
        ListenerGuard::new(move || {
            if let Some(active) = active.upgrade() {
                let removed = active.borrow_mut().remove(&pointer_id);
                drop(removed);
            }
        })
    }
}

#[cfg(target_arch = "wasm32")]
pub use document::DocumentPointerListeners;

#[cfg(target_arch = "wasm32")]
mod document {
    use std::{cell::RefCell, rc::Rc};

    use leptos::logging;
    use wasm_bindgen::{closure::Closure, JsCast};

    use super::{ListenerGuard, PointerListenerHost, PointerSignal};
    use crate::model::{PointerId, PointerPosition};

    type PointerClosure = Closure<dyn FnMut(web_sys::PointerEvent)>;

    thread_local! {
        // Closures removed from the document while one of them may still be running.
        static RETIRED: RefCell<Vec<PointerClosure>> = const { RefCell::new(Vec::new()) };
    }

    fn position_of(event: &web_sys::PointerEvent) -> PointerPosition {
        PointerPosition::new(event.client_x(), event.client_y())
    }

    /// Document `pointermove`/`pointerup`/`pointercancel` listeners.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct DocumentPointerListeners;

    impl PointerListenerHost for DocumentPointerListeners {
        fn acquire(
            &self,
            pointer_id: PointerId,
            sink: Rc<dyn Fn(PointerSignal)>,
        ) -> ListenerGuard {
            RETIRED.with(|retired| retired.borrow_mut().clear());

            let Some(document) = web_sys::window().and_then(|window| window.document()) else {
                logging::warn!("document unavailable; gesture listeners not installed");
                return ListenerGuard::noop();
            };

            let listener = |signal_of: fn(&web_sys::PointerEvent) -> PointerSignal| {
                let sink = sink.clone();
                PointerClosure::wrap(Box::new(move |event: web_sys::PointerEvent| {
                    if event.pointer_id() == pointer_id.0 {
                        sink(signal_of(&event));
                    }
                }))
            };
            let listeners = vec![
                ("pointermove", listener(|event| PointerSignal::Move(position_of(event)))),
                ("pointerup", listener(|event| PointerSignal::Up(position_of(event)))),
                ("pointercancel", listener(|_| PointerSignal::Cancel)),
            ];

            for (name, closure) in &listeners {
                if let Err(err) = document.add_event_listener_with_callback(
                    name,
                    closure.as_ref().unchecked_ref::<js_sys::Function>(),
                ) {
                    logging::warn!("failed to add document `{name}` listener: {err:?}");
                }
            }

            ListenerGuard::new(move || {
                for (name, closure) in &listeners {
                    if let Err(err) = document.remove_event_listener_with_callback(
                        name,
                        closure.as_ref().unchecked_ref::<js_sys::Function>(),
                    ) {
                        logging::warn!("failed to remove document `{name}` listener: {err:?}");
                    }
                }
                RETIRED.with(|retired| {
                    retired
                        .borrow_mut()
                        .extend(listeners.into_iter().map(|(_, closure)| closure))
                });
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use desktop_app_contract::{ApplicationId, Principal, UserId, EventBus};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{config::DesktopConfig, model::OpenWindowRequest, registry::AppRegistry};

    struct Rig {
        manager: Rc<WindowManager>,
        host: Rc<RecordingPointerHost>,
        controller: Rc<InteractionController>,
    }

    fn rig_with(config: DesktopConfig) -> Rig {
        let manager = Rc::new(WindowManager::new(
            Rc::new(AppRegistry::builtin().expect("catalog")),
            EventBus::new(),
            config,
            WindowRect::new(0, 0, 1280, 800),
        ));
        let host = Rc::new(RecordingPointerHost::new());
        let controller = InteractionController::new(manager.clone(), host.clone());
        Rig {
            manager,
            host,
            controller,
        }
    }

    fn rig() -> Rig {
        rig_with(DesktopConfig::default())
    }

    fn open(rig: &Rig, app_id: &str) -> WindowId {
        rig.manager
            .create_window(
                &Principal::new(UserId(1)).with_permissions(["files.view"]),
                OpenWindowRequest::new(ApplicationId::trusted(app_id)),
            )
            .expect("open")
    }

    fn down(pointer: i32, window_id: WindowId, target: HitTarget, x: i32, y: i32) -> PointerDown {
        PointerDown {
            pointer_id: PointerId(pointer),
            window_id,
            target,
            position: PointerPosition::new(x, y),
            kind: PointerKind::Mouse,
        }
    }

    fn rect(rig: &Rig, window_id: WindowId) -> WindowRect {
        rig.manager.get_window(window_id).expect("window").rect
    }

    #[test]
    fn drag_follows_the_grab_offset_and_clamps() {
        let rig = rig();
        let calculator = open(&rig, "calculator");

        assert!(rig
            .controller
            .pointer_down(down(1, calculator, HitTarget::Header, 500, 170)));
        assert_eq!(rig.host.active_listeners(), 1);

        assert!(rig.host.dispatch(
            PointerId(1),
            PointerSignal::Move(PointerPosition::new(530, 200))
        ));
        assert_eq!(rect(&rig, calculator), WindowRect::new(510, 190, 320, 480));

        rig.host.dispatch(
            PointerId(1),
            PointerSignal::Up(PointerPosition::new(2500, 170)),
        );
        assert_eq!(rect(&rig, calculator), WindowRect::new(960, 160, 320, 480));
        assert_eq!(rig.host.active_listeners(), 0);
        assert_eq!(rig.controller.active_gesture_count(), 0);
    }

    #[test]
    fn resize_keeps_the_opposite_corner_fixed_and_respects_minimums() {
        let rig = rig();
        let window = open(&rig, "file-explorer");
        let start = rect(&rig, window);

        assert!(rig.controller.pointer_down(down(
            3,
            window,
            HitTarget::Edge(ResizeEdge::NorthWest),
            start.x,
            start.y
        )));
        rig.controller
            .pointer_move(PointerId(3), PointerPosition::new(start.x + 600, start.y + 600));
        let now = rect(&rig, window);
        assert_eq!((now.right(), now.bottom()), (start.right(), start.bottom()));
        assert_eq!((now.w, now.h), (480, 320));

        rig.controller
            .pointer_up(PointerId(3), PointerPosition::new(start.x - 10, start.y - 10));
        let now = rect(&rig, window);
        assert_eq!((now.right(), now.bottom()), (start.right(), start.bottom()));
        assert_eq!((now.x, now.y), (30, 38));
    }

    #[test]
    fn touch_form_factor_offers_no_resize_and_body_only_activates() {
        let rig = rig_with(DesktopConfig {
            touch_input: true,
            ..DesktopConfig::default()
        });
        let first = open(&rig, "file-explorer");
        let second = open(&rig, "file-explorer");

        assert!(!rig
            .controller
            .pointer_down(down(1, first, HitTarget::Edge(ResizeEdge::East), 0, 0)));
        assert_eq!(rig.manager.active_window_id(), Some(first));

        assert!(!rig
            .controller
            .pointer_down(down(2, second, HitTarget::Body, 0, 0)));
        assert_eq!(rig.manager.active_window_id(), Some(second));
        assert_eq!(rig.host.total_acquired(), 0);
    }

    #[test]
    fn one_gesture_per_window_and_pointer() {
        let rig = rig();
        let a = open(&rig, "file-explorer");
        let b = open(&rig, "file-explorer");

        assert!(rig.controller.pointer_down(down(1, a, HitTarget::Header, 50, 50)));
        assert!(!rig.controller.pointer_down(down(2, a, HitTarget::Header, 50, 50)));
        assert!(!rig.controller.pointer_down(down(1, b, HitTarget::Header, 70, 70)));
        assert!(rig
            .controller
            .pointer_down(down(2, b, HitTarget::Edge(ResizeEdge::South), 70, 588)));

        assert_eq!(
            rig.controller.gesture_for_window(b),
            Some((PointerId(2), GestureKind::Resize(ResizeEdge::South)))
        );
        assert_eq!(rig.host.active_listeners(), 2);
    }

    #[test]
    fn maximized_windows_do_not_drag() {
        let rig = rig();
        let window = open(&rig, "file-explorer");
        assert!(rig.manager.toggle_maximize(window));
        assert!(!rig
            .controller
            .pointer_down(down(1, window, HitTarget::Header, 10, 10)));
    }

    #[test]
    fn cancel_keeps_last_geometry_and_releases_listeners() {
        let rig = rig();
        let window = open(&rig, "file-explorer");
        rig.controller
            .pointer_down(down(1, window, HitTarget::Header, 50, 50));
        rig.controller
            .pointer_move(PointerId(1), PointerPosition::new(150, 80));
        let moved = rect(&rig, window);

        rig.host.dispatch(PointerId(1), PointerSignal::Cancel);

        assert_eq!(rect(&rig, window), moved);
        assert_eq!(rig.host.active_listeners(), 0);
        assert_eq!(rig.controller.cancel(PointerId(1)), None);
    }

    #[test]
    fn cancel_all_reports_every_aborted_gesture() {
        let rig = rig();
        let a = open(&rig, "file-explorer");
        let b = open(&rig, "file-explorer");
        rig.controller.pointer_down(down(1, a, HitTarget::Header, 50, 50));
        rig.controller.pointer_down(down(2, b, HitTarget::Header, 70, 70));

        let errors = rig.controller.cancel_all();

        assert_eq!(
            errors,
            vec![
                DesktopError::GestureAborted {
                    window_id: a,
                    reason: "focus lost"
                },
                DesktopError::GestureAborted {
                    window_id: b,
                    reason: "focus lost"
                },
            ]
        );
        assert_eq!(rig.host.active_listeners(), 0);
    }

    #[test]
    fn closing_or_minimizing_mid_gesture_drops_listeners() {
        let rig = rig();
        let a = open(&rig, "file-explorer");
        let b = open(&rig, "file-explorer");
        rig.controller.pointer_down(down(1, a, HitTarget::Header, 50, 50));
        rig.controller.pointer_down(down(2, b, HitTarget::Header, 70, 70));

        assert!(rig.manager.close_window(a));
        assert_eq!(rig.controller.gesture_for_window(a), None);
        assert!(rig.manager.minimize(b));

        assert_eq!(rig.controller.active_gesture_count(), 0);
        assert_eq!(rig.host.active_listeners(), 0);
        assert!(!rig.host.dispatch(
            PointerId(1),
            PointerSignal::Move(PointerPosition::new(0, 0))
        ));
    }

    #[test]
    fn dropping_the_controller_releases_listeners() {
        let rig = rig();
        let window = open(&rig, "file-explorer");
        rig.controller
            .pointer_down(down(1, window, HitTarget::Header, 50, 50));
        let Rig {
            manager,
            host,
            controller,
        } = rig;

        drop(controller);

        assert_eq!(host.active_listeners(), 0);
        assert!(manager.close_window(window));
    }

    #[test]
    fn release_near_the_top_edge_maximizes_when_snapping() {
        let rig = rig_with(DesktopConfig {
            snap_to_edges: true,
            ..DesktopConfig::default()
        });
        let window = open(&rig, "file-explorer");
        rig.controller
            .pointer_down(down(1, window, HitTarget::Header, 100, 60));
        rig.controller
            .pointer_up(PointerId(1), PointerPosition::new(400, 0));

        assert!(rig.manager.get_window(window).expect("window").is_maximized());
        assert_eq!(rig.host.active_listeners(), 0);
    }
}
