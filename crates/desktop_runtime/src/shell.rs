//! Headless models behind the shell chrome: taskbar buttons and desktop icon selection.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use desktop_app_contract::{ApplicationId, DesktopEvent, EventBus, EventChannel, Subscription};

use crate::{model::WindowId, window_manager::WindowManager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskbarEntry {
    pub window_id: WindowId,
    pub app_id: ApplicationId,
    pub title: String,
    pub is_active: bool,
    pub is_minimized: bool,
}

/// Taskbar buttons in window-open order, kept current from window events.
pub struct TaskbarModel {
    manager: Weak<WindowManager>,
    entries: Rc<RefCell<Vec<TaskbarEntry>>>,
    _subscriptions: Vec<Subscription>,
}

impl TaskbarModel {
    pub fn new(manager: &Rc<WindowManager>) -> Self {
        let mut seed: Vec<TaskbarEntry> = manager
            .windows()
            .into_iter()
            .map(|window| TaskbarEntry {
                window_id: window.id,
                app_id: window.app_id.clone(),
                title: window.title.clone(),
                is_active: window.is_focused,
                is_minimized: window.is_minimized(),
            })
            .collect();
        seed.sort_by_key(|entry| entry.window_id);
        let entries = Rc::new(RefCell::new(seed));

        let channels = [
            EventChannel::WindowCreated,
            EventChannel::WindowClosed,
            EventChannel::WindowActivated,
            EventChannel::WindowDeactivated,
            EventChannel::WindowMinimized,
            EventChannel::WindowRestored,
            EventChannel::WindowTitleChanged,
        ];
        let subscriptions = channels
            .into_iter()
            .map(|channel| {
                let entries = Rc::downgrade(&entries);
                let weak_manager = Rc::downgrade(manager);
                manager.bus().on(channel, move |event: &DesktopEvent| {
                    if let Some(entries) = entries.upgrade() {
                        apply_event(&entries, &weak_manager, event);
                    }
                })
            })
            .collect();

        Self {
            manager: Rc::downgrade(manager),
            entries,
            _subscriptions: subscriptions,
        }
    }

    pub fn entries(&self) -> Vec<TaskbarEntry> {
        self.entries.borrow().clone()
    }

    /// Taskbar button click: restores a minimized window, minimizes the active one, and focuses
    /// anything else.
    pub fn toggle_window(&self, window_id: WindowId) -> bool {
        let Some(manager) = self.manager.upgrade() else {
            return false;
        };
        let Some(window) = manager.get_window(window_id) else {
            return false;
        };

        if window.is_minimized() {
            manager.restore(window_id);
            manager.activate(window_id)
        } else if manager.active_window_id() == Some(window_id) {
            manager.minimize(window_id)
        } else {
            manager.activate(window_id)
        }
    }
}

fn apply_event(
    entries: &RefCell<Vec<TaskbarEntry>>,
    manager: &Weak<WindowManager>,
    event: &DesktopEvent,
) {
    let Some(window_id) = event.window_id() else {
        return;
    };

    if let DesktopEvent::WindowCreated { .. } = event {
        let Some(window) = manager
            .upgrade()
            .and_then(|manager| manager.get_window(window_id))
        else {
            return;
        };
        let is_minimized = window.is_minimized();
        entries.borrow_mut().push(TaskbarEntry {
            window_id,
            app_id: window.app_id,
            title: window.title,
            is_active: window.is_focused,
            is_minimized,
        });
        return;
    }

    let mut entries = entries.borrow_mut();
    if let DesktopEvent::WindowClosed { .. } = event {
        entries.retain(|entry| entry.window_id != window_id);
        return;
    }
    let Some(entry) = entries.iter_mut().find(|entry| entry.window_id == window_id) else {
        return;
    };
    match event {
        DesktopEvent::WindowActivated { .. } => entry.is_active = true,
        DesktopEvent::WindowDeactivated { .. } => entry.is_active = false,
        DesktopEvent::WindowMinimized { .. } => entry.is_minimized = true,
        DesktopEvent::WindowRestored { .. } => entry.is_minimized = false,
        DesktopEvent::WindowTitleChanged { title, .. } => entry.title = title.clone(),
        _ => {}
    }
}

/// Desktop icon multi-selection.
pub struct DesktopSelection {
    bus: EventBus,
    selected: RefCell<Vec<String>>,
}

impl DesktopSelection {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            selected: RefCell::new(Vec::new()),
        }
    }

    pub fn selected(&self) -> Vec<String> {
        self.selected.borrow().clone()
    }

    /// Icon click. `additive` (ctrl/cmd held) toggles the icon in the current selection; a plain
    /// click selects only that icon.
    pub fn select(&self, icon_id: &str, additive: bool) -> bool {
        let mut next = self.selected();
        if additive {
            match next.iter().position(|selected| selected == icon_id) {
                Some(index) => {
                    next.remove(index);
                }
                None => next.push(icon_id.to_string()),
            }
        } else {
            next = vec![icon_id.to_string()];
        }
        self.replace(next)
    }

    /// Replaces the whole selection, e.g. after a rubber-band drag.
    pub fn set_selection(&self, icon_ids: impl IntoIterator<Item = String>) -> bool {
        let mut next: Vec<String> = Vec::new();
        for icon_id in icon_ids {
            if !next.contains(&icon_id) {
                next.push(icon_id);
            }
        }
        self.replace(next)
    }

    pub fn clear(&self) -> bool {
        self.replace(Vec::new())
    }

    fn replace(&self, next: Vec<String>) -> bool {
        if *self.selected.borrow() == next {
            return false;
        }
        *self.selected.borrow_mut() = next.clone();
        self.bus.emit(&DesktopEvent::SelectionChanged {
            selected_icons: next,
        });
        true
    }
}
