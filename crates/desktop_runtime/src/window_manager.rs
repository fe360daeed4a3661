//! Window registry, focus/stacking, and the per-window state machine.
//!
//! Every mutation runs inside a short `RefCell` borrow that collects the resulting
//! [`DesktopEvent`]s; the borrow is released before the events are emitted so handlers may call
//! straight back into the manager.

use std::{cell::RefCell, rc::Rc};

use desktop_app_contract::{ApplicationId, DesktopEvent, EventBus, Principal, WindowConstraints};

use crate::{
    config::{DesktopConfig, ViewportPolicy},
    error::DesktopError,
    model::{OpenWindowRequest, ResizeEdge, WindowId, WindowMode, WindowRecord, WindowRect},
    registry::AppRegistry,
};

/// Number of cascade slots before placement wraps back to the origin.
const CASCADE_SLOTS: u64 = 8;

#[derive(Debug)]
struct ManagerState {
    windows: Vec<WindowRecord>,
    next_window_id: u64,
    next_z_index: u64,
    active: Option<WindowId>,
    viewport: WindowRect,
}

impl ManagerState {
    fn window_mut(&mut self, window_id: WindowId) -> Option<&mut WindowRecord> {
        self.windows.iter_mut().find(|window| window.id == window_id)
    }

    fn bump_z(&mut self) -> u64 {
        self.next_z_index += 1;
        self.next_z_index
    }

    /// Gives focus to the highest non-minimized window, if any.
    fn promote_next(&mut self, events: &mut Vec<DesktopEvent>) {
        let next = self
            .windows
            .iter_mut()
            .filter(|window| !window.is_minimized())
            .max_by_key(|window| window.z_index);
        match next {
            Some(window) => {
                window.is_focused = true;
                self.active = Some(window.id);
                events.push(DesktopEvent::WindowActivated {
                    window_id: window.id,
                });
            }
            None => self.active = None,
        }
    }
}

pub struct WindowManager {
    catalog: Rc<AppRegistry>,
    bus: EventBus,
    config: DesktopConfig,
    state: RefCell<ManagerState>,
}

impl WindowManager {
    pub fn new(
        catalog: Rc<AppRegistry>,
        bus: EventBus,
        config: DesktopConfig,
        viewport: WindowRect,
    ) -> Self {
        Self {
            catalog,
            bus,
            config,
            state: RefCell::new(ManagerState {
                windows: Vec::new(),
                next_window_id: 1,
                next_z_index: 0,
                active: None,
                viewport,
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn catalog(&self) -> &Rc<AppRegistry> {
        &self.catalog
    }

    pub fn config(&self) -> &DesktopConfig {
        &self.config
    }

    pub fn viewport(&self) -> WindowRect {
        self.state.borrow().viewport
    }

    pub fn get_window(&self, window_id: WindowId) -> Option<WindowRecord> {
        self.state
            .borrow()
            .windows
            .iter()
            .find(|window| window.id == window_id)
            .cloned()
    }

    pub fn contains(&self, window_id: WindowId) -> bool {
        self.state
            .borrow()
            .windows
            .iter()
            .any(|window| window.id == window_id)
    }

    /// Snapshot of every window, bottom of the stack first.
    pub fn windows(&self) -> Vec<WindowRecord> {
        let mut windows = self.state.borrow().windows.clone();
        windows.sort_by_key(|window| window.z_index);
        windows
    }

    pub fn active_window_id(&self) -> Option<WindowId> {
        self.state.borrow().active
    }

    /// Top-most window hosting `app_id`.
    pub fn find_app_window(&self, app_id: &ApplicationId) -> Option<WindowId> {
        self.state
            .borrow()
            .windows
            .iter()
            .filter(|window| &window.app_id == app_id)
            .max_by_key(|window| window.z_index)
            .map(|window| window.id)
    }

    /// Registers a new window for a registered app the principal may launch.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError::AppNotRegistered`] or [`DesktopError::PermissionDenied`]; no window
    /// is created in either case.
    pub fn create_window(
        &self,
        principal: &Principal,
        request: OpenWindowRequest,
    ) -> Result<WindowId, DesktopError> {
        let registration = self
            .catalog
            .registration(&request.app_id)
            .ok_or_else(|| DesktopError::AppNotRegistered(request.app_id.clone()))?;
        let missing = registration.missing_permissions(principal);
        if !missing.is_empty() {
            return Err(DesktopError::PermissionDenied {
                app_id: request.app_id,
                missing,
            });
        }

        let constraints = registration.window;
        let title = request
            .title
            .unwrap_or_else(|| registration.display_name.clone());

        let window_id = self.mutate(|state, events| {
            let window_id = WindowId(state.next_window_id);
            state.next_window_id += 1;

            let viewport = state.viewport;
            let (w, h) = clamp_size(
                request
                    .rect
                    .map(|rect| (rect.w, rect.h))
                    .unwrap_or((constraints.default_width, constraints.default_height)),
                &constraints,
                viewport,
            );
            let proposed = if constraints.centered {
                viewport.centered(w, h)
            } else if let Some(rect) = request.rect {
                WindowRect::new(rect.x, rect.y, w, h)
            } else {
                let slot = ((window_id.0 - 1) % CASCADE_SLOTS) as i32;
                let step = slot * self.config.cascade_step_px;
                WindowRect::new(
                    viewport.x + self.config.cascade_origin_x + step,
                    viewport.y + self.config.cascade_origin_y + step,
                    w,
                    h,
                )
            };

            let z_index = state.bump_z();
            state.windows.push(WindowRecord {
                id: window_id,
                app_id: request.app_id.clone(),
                title,
                rect: clamp_origin(proposed, viewport, self.config.viewport),
                restore_rect: None,
                z_index,
                is_focused: false,
                mode: WindowMode::Normal,
                constraints,
                launch_params: request.launch_params,
            });
            events.push(DesktopEvent::WindowCreated { window_id });
            window_id
        });

        if request.activate {
            self.activate(window_id);
        }
        Ok(window_id)
    }

    /// Removes a window. Returns `false` when it is already gone.
    pub fn close_window(&self, window_id: WindowId) -> bool {
        self.mutate(|state, events| {
            let Some(index) = state.windows.iter().position(|w| w.id == window_id) else {
                return false;
            };
            state.windows.remove(index);
            events.push(DesktopEvent::WindowClosed { window_id });
            if state.active == Some(window_id) {
                state.active = None;
                state.promote_next(events);
            }
            true
        })
    }

    /// Focuses and raises a window.
    ///
    /// Returns `false` without emitting when the window is unknown, minimized, or already active.
    pub fn activate(&self, window_id: WindowId) -> bool {
        self.mutate(|state, events| {
            let is_candidate = state
                .windows
                .iter()
                .any(|window| window.id == window_id && !window.is_minimized());
            if !is_candidate {
                return false;
            }

            if state.active == Some(window_id) {
                // Keep the active window on top after an inactive open.
                let top = state.next_z_index;
                let buried = state
                    .windows
                    .iter()
                    .any(|window| window.id == window_id && window.z_index != top);
                if buried {
                    let z_index = state.bump_z();
                    if let Some(window) = state.window_mut(window_id) {
                        window.z_index = z_index;
                    }
                }
                return false;
            }

            if let Some(previous) = state.active.take() {
                if let Some(window) = state.window_mut(previous) {
                    window.is_focused = false;
                }
                events.push(DesktopEvent::WindowDeactivated {
                    window_id: previous,
                });
            }

            let z_index = state.bump_z();
            if let Some(window) = state.window_mut(window_id) {
                window.z_index = z_index;
                window.is_focused = true;
            }
            state.active = Some(window_id);
            events.push(DesktopEvent::WindowActivated { window_id });
            true
        })
    }

    /// Moves focus to the desktop so no window is active.
    pub fn focus_desktop(&self) -> bool {
        self.mutate(|state, events| {
            let Some(previous) = state.active.take() else {
                return false;
            };
            if let Some(window) = state.window_mut(previous) {
                window.is_focused = false;
            }
            events.push(DesktopEvent::WindowDeactivated {
                window_id: previous,
            });
            true
        })
    }

    /// Minimizes a window, remembering whether it was maximized.
    pub fn minimize(&self, window_id: WindowId) -> bool {
        self.mutate(|state, events| {
            let Some(window) = state.window_mut(window_id) else {
                return false;
            };
            if window.is_minimized() {
                return false;
            }
            window.mode = WindowMode::Minimized {
                was_maximized: window.is_maximized(),
            };
            window.is_focused = false;
            events.push(DesktopEvent::WindowMinimized { window_id });

            if state.active == Some(window_id) {
                state.active = None;
                events.push(DesktopEvent::WindowDeactivated { window_id });
                state.promote_next(events);
            }
            true
        })
    }

    /// Brings a minimized window back without focusing it.
    pub fn restore(&self, window_id: WindowId) -> bool {
        self.mutate(|state, events| {
            let viewport = state.viewport;
            let policy = self.config.viewport;
            let Some(window) = state.window_mut(window_id) else {
                return false;
            };
            let WindowMode::Minimized { was_maximized } = window.mode else {
                return false;
            };

            let before = window.rect;
            if was_maximized {
                window.mode = WindowMode::Maximized;
                window.rect = maximized_rect(&window.constraints, viewport);
            } else {
                window.mode = WindowMode::Normal;
                window.rect = fit_rect(window.rect, &window.constraints, viewport, policy);
            }
            events.push(DesktopEvent::WindowRestored { window_id });
            push_geometry_events(events, window_id, before, window.rect);
            true
        })
    }

    /// Maximizes a normal window or restores a maximized one to its pre-maximize geometry.
    ///
    /// Minimized and non-maximizable windows are left alone.
    pub fn toggle_maximize(&self, window_id: WindowId) -> bool {
        self.mutate(|state, events| {
            let viewport = state.viewport;
            let policy = self.config.viewport;
            let Some(window) = state.window_mut(window_id) else {
                return false;
            };
            if !window.constraints.maximizable || window.is_minimized() {
                return false;
            }

            let before = window.rect;
            let maximized = match window.mode {
                WindowMode::Normal => {
                    window.restore_rect = Some(window.rect);
                    window.rect = maximized_rect(&window.constraints, viewport);
                    window.mode = WindowMode::Maximized;
                    true
                }
                _ => {
                    let restored = window.restore_rect.take().unwrap_or(window.rect);
                    window.rect = fit_rect(restored, &window.constraints, viewport, policy);
                    window.mode = WindowMode::Normal;
                    false
                }
            };
            events.push(DesktopEvent::WindowMaximizeToggled {
                window_id,
                maximized,
            });
            push_geometry_events(events, window_id, before, window.rect);
            true
        })
    }

    /// Moves a normal window, clamping the origin to the viewport policy.
    ///
    /// Returns `true` when the stored origin changed.
    pub fn move_window(&self, window_id: WindowId, x: i32, y: i32) -> bool {
        self.update_normal_rect(window_id, |rect, _, viewport, policy| {
            clamp_origin(WindowRect { x, y, ..rect }, viewport, policy)
        })
    }

    /// Resizes a normal window from its top-left corner.
    pub fn resize(&self, window_id: WindowId, w: i32, h: i32) -> bool {
        self.update_normal_rect(window_id, |rect, constraints, viewport, policy| {
            fit_rect(WindowRect { w, h, ..rect }, constraints, viewport, policy)
        })
    }

    /// Resizes from `edge` toward `proposed`, keeping the opposite edge fixed.
    pub fn resize_from_edge(&self, window_id: WindowId, edge: ResizeEdge, proposed: WindowRect) -> bool {
        self.update_normal_rect(window_id, |rect, constraints, viewport, policy| {
            anchored_resize(rect, edge, proposed, constraints, viewport, policy)
        })
    }

    /// Snaps a normal window released near a viewport edge: the top edge maximizes, the side
    /// edges tile to a half.
    pub fn snap_to_edge(&self, window_id: WindowId) -> bool {
        let Some(window) = self.get_window(window_id) else {
            return false;
        };
        if window.mode != WindowMode::Normal {
            return false;
        }

        let viewport = self.viewport();
        let threshold = self.config.snap_threshold_px;
        let near_left = window.rect.x <= viewport.x + threshold;
        let near_right = window.rect.right() >= viewport.right() - threshold;
        let near_top = window.rect.y <= viewport.y + threshold;

        if near_top && window.constraints.maximizable {
            return self.toggle_maximize(window_id);
        }
        if !(near_left || near_right) || !window.constraints.resizable {
            return false;
        }

        self.update_normal_rect(window_id, |_, constraints, viewport, policy| {
            let (w, h) = clamp_size((viewport.w / 2, viewport.h), constraints, viewport);
            let x = if near_right { viewport.right() - w } else { viewport.x };
            clamp_origin(WindowRect::new(x, viewport.y, w, h), viewport, policy)
        })
    }

    pub fn set_title(&self, window_id: WindowId, title: impl Into<String>) -> bool {
        let title = title.into();
        self.mutate(|state, events| {
            let Some(window) = state.window_mut(window_id) else {
                return false;
            };
            if window.title == title {
                return false;
            }
            window.title = title.clone();
            events.push(DesktopEvent::WindowTitleChanged { window_id, title });
            true
        })
    }

    /// Replaces the desktop viewport and refits every window to it.
    pub fn set_viewport(&self, viewport: WindowRect) {
        self.mutate(|state, events| {
            state.viewport = viewport;
            let policy = self.config.viewport;
            for window in &mut state.windows {
                let before = window.rect;
                match window.mode {
                    WindowMode::Maximized => {
                        window.rect = maximized_rect(&window.constraints, viewport);
                    }
                    WindowMode::Minimized { was_maximized: true } => continue,
                    WindowMode::Normal | WindowMode::Minimized { .. } => {
                        window.rect = fit_rect(window.rect, &window.constraints, viewport, policy);
                    }
                }
                if !window.is_minimized() {
                    push_geometry_events(events, window.id, before, window.rect);
                }
            }
        });
    }

    fn update_normal_rect(
        &self,
        window_id: WindowId,
        next: impl FnOnce(WindowRect, &WindowConstraints, WindowRect, ViewportPolicy) -> WindowRect,
    ) -> bool {
        self.mutate(|state, events| {
            let viewport = state.viewport;
            let Some(window) = state.window_mut(window_id) else {
                return false;
            };
            if window.mode != WindowMode::Normal {
                return false;
            }
            let before = window.rect;
            window.rect = next(before, &window.constraints, viewport, self.config.viewport);
            push_geometry_events(events, window_id, before, window.rect);
            before != window.rect
        })
    }

    fn mutate<R>(&self, apply: impl FnOnce(&mut ManagerState, &mut Vec<DesktopEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.borrow_mut();
            apply(&mut state, &mut events)
        };
        for event in &events {
            self.bus.emit(event);
        }
        result
    }
}

impl std::fmt::Debug for WindowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowManager")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn push_geometry_events(
    events: &mut Vec<DesktopEvent>,
    window_id: WindowId,
    before: WindowRect,
    after: WindowRect,
) {
    if (before.x, before.y) != (after.x, after.y) {
        events.push(DesktopEvent::WindowMoved {
            window_id,
            x: after.x,
            y: after.y,
        });
    }
    if (before.w, before.h) != (after.w, after.h) {
        events.push(DesktopEvent::WindowResized {
            window_id,
            width: after.w,
            height: after.h,
        });
    }
}

/// Applies resize deltas for a given edge/corner drag.
pub fn resize_rect(start: WindowRect, edge: ResizeEdge, dx: i32, dy: i32) -> WindowRect {
    let mut rect = start;
    if edge.moves_west() {
        rect.x += dx;
        rect.w -= dx;
    } else if edge.moves_east() {
        rect.w += dx;
    }
    if edge.moves_north() {
        rect.y += dy;
        rect.h -= dy;
    } else if edge.moves_south() {
        rect.h += dy;
    }
    rect
}

fn max_size(constraints: &WindowConstraints, viewport: WindowRect) -> (i32, i32) {
    (
        constraints
            .max_width
            .map_or(viewport.w, |max| max.min(viewport.w)),
        constraints
            .max_height
            .map_or(viewport.h, |max| max.min(viewport.h)),
    )
}

/// Clamps a size to the constraints and the viewport. Minimums win over everything else.
pub fn clamp_size(
    (w, h): (i32, i32),
    constraints: &WindowConstraints,
    viewport: WindowRect,
) -> (i32, i32) {
    let (max_w, max_h) = max_size(constraints, viewport);
    (
        w.min(max_w).max(constraints.min_width),
        h.min(max_h).max(constraints.min_height),
    )
}

fn clamp_axis(value: i32, lo: i32, hi: i32) -> i32 {
    if hi < lo {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

/// Clamps an origin so the window stays inside the region allowed by `policy`.
///
/// The title bar never leaves the top of the viewport.
pub fn clamp_origin(rect: WindowRect, viewport: WindowRect, policy: ViewportPolicy) -> WindowRect {
    let (x, y) = if policy.allow_partial_offscreen {
        let keep_w = policy.min_visible_px.min(rect.w);
        let keep_h = policy.min_visible_px.min(rect.h);
        (
            clamp_axis(rect.x, viewport.x - rect.w + keep_w, viewport.right() - keep_w),
            clamp_axis(rect.y, viewport.y, viewport.bottom() - keep_h),
        )
    } else {
        (
            clamp_axis(rect.x, viewport.x, viewport.right() - rect.w),
            clamp_axis(rect.y, viewport.y, viewport.bottom() - rect.h),
        )
    };
    WindowRect { x, y, ..rect }
}

/// Clamps size then origin.
pub fn fit_rect(
    rect: WindowRect,
    constraints: &WindowConstraints,
    viewport: WindowRect,
    policy: ViewportPolicy,
) -> WindowRect {
    let (w, h) = clamp_size((rect.w, rect.h), constraints, viewport);
    clamp_origin(WindowRect { w, h, ..rect }, viewport, policy)
}

fn maximized_rect(constraints: &WindowConstraints, viewport: WindowRect) -> WindowRect {
    viewport.clamped_min(constraints.min_width, constraints.min_height)
}

fn anchored_resize(
    current: WindowRect,
    edge: ResizeEdge,
    proposed: WindowRect,
    constraints: &WindowConstraints,
    viewport: WindowRect,
    policy: ViewportPolicy,
) -> WindowRect {
    let (max_w, max_h) = max_size(constraints, viewport);
    let strict = !policy.allow_partial_offscreen;
    let mut next = current;

    if edge.moves_west() {
        let right = current.right();
        let limit = if strict { max_w.min(right - viewport.x) } else { max_w };
        next.w = proposed.w.min(limit).max(constraints.min_width);
        next.x = right - next.w;
    } else if edge.moves_east() {
        let limit = if strict {
            max_w.min(viewport.right() - current.x)
        } else {
            max_w
        };
        next.w = proposed.w.min(limit).max(constraints.min_width);
    }

    if edge.moves_north() {
        let bottom = current.bottom();
        next.h = proposed
            .h
            .min(max_h.min(bottom - viewport.y))
            .max(constraints.min_height);
        next.y = bottom - next.h;
    } else if edge.moves_south() {
        let limit = if strict {
            max_h.min(viewport.bottom() - current.y)
        } else {
            max_h
        };
        next.h = proposed.h.min(limit).max(constraints.min_height);
    }
    next
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use desktop_app_contract::{EventChannel, UserId};
    use pretty_assertions::assert_eq;

    use super::*;

    const WINDOW_CHANNELS: [EventChannel; 10] = [
        EventChannel::WindowCreated,
        EventChannel::WindowActivated,
        EventChannel::WindowDeactivated,
        EventChannel::WindowMoved,
        EventChannel::WindowResized,
        EventChannel::WindowMinimized,
        EventChannel::WindowRestored,
        EventChannel::WindowMaximizeToggled,
        EventChannel::WindowTitleChanged,
        EventChannel::WindowClosed,
    ];

    fn everyone() -> Principal {
        Principal::new(UserId(1)).with_permissions([
            "email.read",
            "files.view",
            "messages.read",
            "sites.edit",
        ])
    }

    fn manager_with(config: DesktopConfig) -> (Rc<WindowManager>, Rc<RefCell<Vec<DesktopEvent>>>) {
        let catalog = Rc::new(AppRegistry::builtin().expect("catalog"));
        let manager = Rc::new(WindowManager::new(
            catalog,
            EventBus::new(),
            config,
            WindowRect::new(0, 0, 1280, 800),
        ));
        let log = Rc::new(RefCell::new(Vec::new()));
        for channel in WINDOW_CHANNELS {
            let sink = log.clone();
            manager
                .bus()
                .on(channel, move |event| sink.borrow_mut().push(event.clone()))
                .detach();
        }
        (manager, log)
    }

    fn manager() -> (Rc<WindowManager>, Rc<RefCell<Vec<DesktopEvent>>>) {
        manager_with(DesktopConfig::default())
    }

    fn open(manager: &WindowManager, app_id: &str) -> WindowId {
        manager
            .create_window(
                &everyone(),
                OpenWindowRequest::new(ApplicationId::trusted(app_id)),
            )
            .expect("open window")
    }

    fn rect(manager: &WindowManager, window_id: WindowId) -> WindowRect {
        manager.get_window(window_id).expect("window").rect
    }

    #[test]
    fn calculator_opens_centered_and_drag_clamps_to_the_right_edge() {
        let (manager, log) = manager();
        let calculator = open(&manager, "calculator");

        assert_eq!(rect(&manager, calculator), WindowRect::new(480, 160, 320, 480));
        assert_eq!(
            *log.borrow(),
            vec![
                DesktopEvent::WindowCreated {
                    window_id: calculator
                },
                DesktopEvent::WindowActivated {
                    window_id: calculator
                },
            ]
        );

        log.borrow_mut().clear();
        assert!(manager.move_window(calculator, 480 + 2000, 160));
        assert_eq!(rect(&manager, calculator), WindowRect::new(960, 160, 320, 480));
        assert_eq!(
            *log.borrow(),
            vec![DesktopEvent::WindowMoved {
                window_id: calculator,
                x: 960,
                y: 160
            }]
        );

        assert!(manager.move_window(calculator, -5000, -5000));
        assert_eq!(rect(&manager, calculator), WindowRect::new(0, 0, 320, 480));
        assert!(!manager.move_window(calculator, -1, -1));
    }

    #[test]
    fn non_centered_windows_cascade() {
        let (manager, _log) = manager();
        let first = open(&manager, "file-explorer");
        let second = open(&manager, "file-explorer");

        assert_eq!(rect(&manager, first), WindowRect::new(40, 48, 760, 520));
        assert_eq!(rect(&manager, second), WindowRect::new(60, 68, 760, 520));
        assert_ne!(first, second);
    }

    #[test]
    fn window_ids_are_never_reused_after_close() {
        use std::collections::BTreeSet;

        let (manager, _log) = manager();
        let mut seen = BTreeSet::new();
        for round in 0..40 {
            let window_id = open(&manager, "file-explorer");
            assert!(seen.insert(window_id), "id {window_id} handed out twice");
            if round % 3 != 0 {
                assert!(manager.close_window(window_id));
            }
        }

        assert_eq!(seen.len(), 40);
        let open_ids: BTreeSet<_> = manager.windows().into_iter().map(|window| window.id).collect();
        assert_eq!(open_ids.len(), 14);
        assert!(open_ids.is_subset(&seen));
    }

    #[test]
    fn activation_raises_and_moves_focus_once() {
        let (manager, log) = manager();
        let a = open(&manager, "file-explorer");
        let b = open(&manager, "file-explorer");
        log.borrow_mut().clear();

        assert!(manager.activate(a));
        assert!(!manager.activate(a));

        let windows = manager.windows();
        assert_eq!(windows.last().map(|window| window.id), Some(a));
        assert!(rect(&manager, a) != rect(&manager, b));
        assert_eq!(
            windows.iter().filter(|window| window.is_focused).count(),
            1
        );
        assert_eq!(manager.active_window_id(), Some(a));
        assert_eq!(
            *log.borrow(),
            vec![
                DesktopEvent::WindowDeactivated { window_id: b },
                DesktopEvent::WindowActivated { window_id: a },
            ]
        );
    }

    #[test]
    fn inactive_open_keeps_focus_and_reactivation_restores_top() {
        let (manager, _log) = manager();
        let a = open(&manager, "file-explorer");
        let b = manager
            .create_window(
                &everyone(),
                OpenWindowRequest::new(ApplicationId::trusted("file-explorer")).inactive(),
            )
            .expect("open");

        assert_eq!(manager.active_window_id(), Some(a));
        assert!(!manager.get_window(b).expect("b").is_focused);

        assert!(!manager.activate(a));
        let top = manager.windows().last().map(|window| window.id);
        assert_eq!(top, Some(a));
    }

    #[test]
    fn unknown_apps_and_missing_permissions_leave_no_window() {
        let (manager, log) = manager();

        let unknown = manager.create_window(
            &everyone(),
            OpenWindowRequest::new(ApplicationId::trusted("crm.contacts")),
        );
        assert_eq!(
            unknown,
            Err(DesktopError::AppNotRegistered(ApplicationId::trusted(
                "crm.contacts"
            )))
        );

        let denied = manager.create_window(
            &Principal::new(UserId(9)),
            OpenWindowRequest::new(ApplicationId::trusted("email")),
        );
        assert_eq!(
            denied,
            Err(DesktopError::PermissionDenied {
                app_id: ApplicationId::trusted("email"),
                missing: vec!["email.read".to_string()],
            })
        );
        assert!(manager.windows().is_empty());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn close_is_idempotent_and_promotes_the_next_window() {
        let (manager, log) = manager();
        let a = open(&manager, "file-explorer");
        let b = open(&manager, "file-explorer");
        log.borrow_mut().clear();

        assert!(manager.close_window(b));
        assert!(!manager.close_window(b));
        assert_eq!(manager.active_window_id(), Some(a));
        assert_eq!(
            *log.borrow(),
            vec![
                DesktopEvent::WindowClosed { window_id: b },
                DesktopEvent::WindowActivated { window_id: a },
            ]
        );

        assert!(manager.close_window(a));
        assert_eq!(manager.active_window_id(), None);
        assert!(manager.get_window(a).is_none());
    }

    #[test]
    fn minimize_skips_to_next_window_and_restore_does_not_focus() {
        let (manager, log) = manager();
        let a = open(&manager, "file-explorer");
        let b = open(&manager, "file-explorer");
        let before = rect(&manager, b);
        log.borrow_mut().clear();

        assert!(manager.minimize(b));
        assert!(!manager.minimize(b));
        assert!(!manager.activate(b));
        assert!(!manager.move_window(b, 0, 0));
        assert_eq!(manager.active_window_id(), Some(a));
        assert_eq!(
            *log.borrow(),
            vec![
                DesktopEvent::WindowMinimized { window_id: b },
                DesktopEvent::WindowDeactivated { window_id: b },
                DesktopEvent::WindowActivated { window_id: a },
            ]
        );

        log.borrow_mut().clear();
        assert!(manager.restore(b));
        assert!(!manager.restore(b));
        assert_eq!(rect(&manager, b), before);
        assert_eq!(manager.active_window_id(), Some(a));
        assert_eq!(
            *log.borrow(),
            vec![DesktopEvent::WindowRestored { window_id: b }]
        );
    }

    #[test]
    fn minimizing_the_only_window_leaves_the_desktop_focused() {
        let (manager, _log) = manager();
        let a = open(&manager, "file-explorer");
        assert!(manager.minimize(a));
        assert_eq!(manager.active_window_id(), None);
        assert!(manager.windows().iter().all(|window| !window.is_focused));
    }

    #[test]
    fn double_toggle_maximize_restores_exact_geometry() {
        let (manager, log) = manager();
        let window = open(&manager, "file-explorer");
        assert!(manager.move_window(window, 123, 77));
        let before = rect(&manager, window);
        log.borrow_mut().clear();

        assert!(manager.toggle_maximize(window));
        assert_eq!(rect(&manager, window), WindowRect::new(0, 0, 1280, 800));
        assert!(!manager.move_window(window, 10, 10));
        assert!(manager.toggle_maximize(window));
        assert_eq!(rect(&manager, window), before);

        let toggles: Vec<bool> = log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                DesktopEvent::WindowMaximizeToggled { maximized, .. } => Some(*maximized),
                _ => None,
            })
            .collect();
        assert_eq!(toggles, vec![true, false]);
    }

    #[test]
    fn non_maximizable_and_minimized_windows_ignore_toggle() {
        let (manager, _log) = manager();
        let calculator = open(&manager, "calculator");
        assert!(!manager.toggle_maximize(calculator));

        let explorer = open(&manager, "file-explorer");
        assert!(manager.minimize(explorer));
        assert!(!manager.toggle_maximize(explorer));
    }

    #[test]
    fn minimized_maximized_window_restores_maximized() {
        let (manager, _log) = manager();
        let window = open(&manager, "file-explorer");
        let normal = rect(&manager, window);
        assert!(manager.toggle_maximize(window));
        assert!(manager.minimize(window));
        assert_eq!(
            manager.get_window(window).expect("window").mode,
            WindowMode::Minimized {
                was_maximized: true
            }
        );

        manager.set_viewport(WindowRect::new(0, 0, 1000, 700));
        assert!(manager.restore(window));
        let record = manager.get_window(window).expect("window");
        assert!(record.is_maximized());
        assert!(!record.is_minimized());
        assert_eq!(record.rect, WindowRect::new(0, 0, 1000, 700));

        assert!(manager.toggle_maximize(window));
        assert_eq!(rect(&manager, window), normal);
    }

    #[test]
    fn resize_clamps_to_min_and_max() {
        let (manager, _log) = manager();
        let calculator = open(&manager, "calculator");

        // Already at its minimum size.
        assert!(!manager.resize(calculator, 10, 10));

        assert!(manager.resize(calculator, 5000, 5000));
        let large = rect(&manager, calculator);
        assert_eq!((large.w, large.h), (480, 640));
        assert!(large.right() <= 1280 && large.bottom() <= 800);

        assert!(manager.resize(calculator, 10, 10));
        let small = rect(&manager, calculator);
        assert_eq!((small.w, small.h), (320, 480));
    }

    #[test]
    fn edge_resize_keeps_the_opposite_edge_fixed() {
        for edge in ResizeEdge::ALL {
            let (manager, _log) = manager();
            let window = open(&manager, "file-explorer");
            assert!(manager.move_window(window, 300, 200));
            let start = rect(&manager, window);

            for (dx, dy) in [(-40, -30), (55, 25), (-900, -900), (900, 900)] {
                let proposed = resize_rect(rect(&manager, window), edge, dx, dy);
                manager.resize_from_edge(window, edge, proposed);
                let now = rect(&manager, window);

                if edge.moves_west() {
                    assert_eq!(now.right(), start.right(), "{edge:?}");
                } else {
                    assert_eq!(now.x, start.x, "{edge:?}");
                }
                if edge.moves_north() {
                    assert_eq!(now.bottom(), start.bottom(), "{edge:?}");
                } else {
                    assert_eq!(now.y, start.y, "{edge:?}");
                }
                assert!(now.w >= 480 && now.h >= 320, "{edge:?}");
                assert!(now.x >= 0 && now.y >= 0, "{edge:?}");
                assert!(now.right() <= 1280 && now.bottom() <= 800, "{edge:?}");
            }
        }
    }

    #[test]
    fn partial_offscreen_policy_keeps_a_visible_strip() {
        let mut config = DesktopConfig::default();
        config.viewport.allow_partial_offscreen = true;
        let (manager, _log) = manager_with(config);
        let window = open(&manager, "file-explorer");

        manager.move_window(window, 5000, 5000);
        assert_eq!(rect(&manager, window), WindowRect::new(1280 - 48, 800 - 48, 760, 520));

        manager.move_window(window, -5000, -5000);
        assert_eq!(rect(&manager, window), WindowRect::new(48 - 760, 0, 760, 520));
    }

    #[test]
    fn snapping_tiles_and_maximizes() {
        let (manager, _log) = manager();
        let window = open(&manager, "file-explorer");

        assert!(manager.move_window(window, 1280, 300));
        assert!(manager.snap_to_edge(window));
        assert_eq!(rect(&manager, window), WindowRect::new(640, 0, 640, 800));

        assert!(manager.move_window(window, 300, 0));
        assert!(manager.snap_to_edge(window));
        assert!(manager.get_window(window).expect("window").is_maximized());
    }

    #[test]
    fn viewport_shrink_refits_windows() {
        let (manager, log) = manager();
        let calculator = open(&manager, "calculator");
        log.borrow_mut().clear();

        manager.set_viewport(WindowRect::new(0, 0, 600, 500));

        assert_eq!(rect(&manager, calculator), WindowRect::new(280, 20, 320, 480));
        assert_eq!(
            *log.borrow(),
            vec![DesktopEvent::WindowMoved {
                window_id: calculator,
                x: 280,
                y: 20
            }]
        );
    }

    #[test]
    fn handlers_can_call_back_into_the_manager() {
        let (manager, _log) = manager();
        let retitled = Rc::new(Cell::new(0));
        let weak = Rc::downgrade(&manager);
        let counter = retitled.clone();
        manager
            .bus()
            .on(EventChannel::WindowCreated, move |event| {
                if let (Some(manager), Some(window_id)) = (weak.upgrade(), event.window_id()) {
                    if manager.set_title(window_id, "Renamed") {
                        counter.set(counter.get() + 1);
                    }
                }
            })
            .detach();

        let window = open(&manager, "file-explorer");

        assert_eq!(retitled.get(), 1);
        assert_eq!(manager.get_window(window).expect("window").title, "Renamed");
    }
}
