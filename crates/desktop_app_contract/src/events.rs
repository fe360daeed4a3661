//! Process-wide publish/subscribe bus shared by the window manager, shell chrome, and apps.
//!
//! Dispatch is synchronous: [`EventBus::emit`] runs every handler registered for the event's
//! channel, in subscription order, before it returns. A panicking handler is contained and logged
//! so the remaining handlers still run.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    rc::{Rc, Weak},
};

use leptos::logging;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ApplicationId, TeamId, WindowId};

/// Channel identity used for subscription lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventChannel {
    /// `window:created`
    WindowCreated,
    /// `window:activated`
    WindowActivated,
    /// `window:deactivated`
    WindowDeactivated,
    /// `window:moved`
    WindowMoved,
    /// `window:resized`
    WindowResized,
    /// `window:minimized`
    WindowMinimized,
    /// `window:restored`
    WindowRestored,
    /// `window:maximize-toggled`
    WindowMaximizeToggled,
    /// `window:title-changed`
    WindowTitleChanged,
    /// `window:closed`
    WindowClosed,
    /// `app:launched`
    AppLaunched,
    /// `team:switched`
    TeamSwitched,
    /// `desktop:selection-changed`
    SelectionChanged,
    /// App-defined topic.
    Topic(String),
}

impl EventChannel {
    /// Returns the wire name of the channel.
    pub fn as_str(&self) -> &str {
        match self {
            Self::WindowCreated => "window:created",
            Self::WindowActivated => "window:activated",
            Self::WindowDeactivated => "window:deactivated",
            Self::WindowMoved => "window:moved",
            Self::WindowResized => "window:resized",
            Self::WindowMinimized => "window:minimized",
            Self::WindowRestored => "window:restored",
            Self::WindowMaximizeToggled => "window:maximize-toggled",
            Self::WindowTitleChanged => "window:title-changed",
            Self::WindowClosed => "window:closed",
            Self::AppLaunched => "app:launched",
            Self::TeamSwitched => "team:switched",
            Self::SelectionChanged => "desktop:selection-changed",
            Self::Topic(topic) => topic,
        }
    }

    /// Maps a wire name to a channel; unknown names become [`EventChannel::Topic`].
    pub fn parse(raw: &str) -> Self {
        match raw {
            "window:created" => Self::WindowCreated,
            "window:activated" => Self::WindowActivated,
            "window:deactivated" => Self::WindowDeactivated,
            "window:moved" => Self::WindowMoved,
            "window:resized" => Self::WindowResized,
            "window:minimized" => Self::WindowMinimized,
            "window:restored" => Self::WindowRestored,
            "window:maximize-toggled" => Self::WindowMaximizeToggled,
            "window:title-changed" => Self::WindowTitleChanged,
            "window:closed" => Self::WindowClosed,
            "app:launched" => Self::AppLaunched,
            "team:switched" => Self::TeamSwitched,
            "desktop:selection-changed" => Self::SelectionChanged,
            other => Self::Topic(other.to_string()),
        }
    }

    /// Returns whether the channel is owned by the runtime rather than an app.
    pub fn is_reserved(&self) -> bool {
        !matches!(self, Self::Topic(_))
    }
}

impl std::fmt::Display for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// App-defined event envelope delivered on a [`EventChannel::Topic`] channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppEvent {
    /// Topic name.
    pub topic: String,
    /// JSON payload for the event.
    pub payload: Value,
    /// Publishing window when known.
    pub source_window_id: Option<WindowId>,
}

impl AppEvent {
    /// Creates an app event from topic/payload/source window id.
    pub fn new(topic: impl Into<String>, payload: Value, source_window_id: Option<WindowId>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            source_window_id,
        }
    }
}

/// Events carried by the desktop bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum DesktopEvent {
    /// A window was registered.
    #[serde(rename = "window:created")]
    WindowCreated {
        /// New window.
        window_id: WindowId,
    },
    /// A window gained focus.
    #[serde(rename = "window:activated")]
    WindowActivated {
        /// Focused window.
        window_id: WindowId,
    },
    /// A window lost focus.
    #[serde(rename = "window:deactivated")]
    WindowDeactivated {
        /// Window that lost focus.
        window_id: WindowId,
    },
    /// A window origin changed (post-clamp values).
    #[serde(rename = "window:moved")]
    WindowMoved {
        /// Moved window.
        window_id: WindowId,
        /// New left edge.
        x: i32,
        /// New top edge.
        y: i32,
    },
    /// A window size changed (post-clamp values).
    #[serde(rename = "window:resized")]
    WindowResized {
        /// Resized window.
        window_id: WindowId,
        /// New width.
        width: i32,
        /// New height.
        height: i32,
    },
    /// A window was minimized.
    #[serde(rename = "window:minimized")]
    WindowMinimized {
        /// Minimized window.
        window_id: WindowId,
    },
    /// A minimized window was restored.
    #[serde(rename = "window:restored")]
    WindowRestored {
        /// Restored window.
        window_id: WindowId,
    },
    /// A window entered or left the maximized state.
    #[serde(rename = "window:maximize-toggled")]
    WindowMaximizeToggled {
        /// Affected window.
        window_id: WindowId,
        /// Whether the window is now maximized.
        maximized: bool,
    },
    /// A window title changed.
    #[serde(rename = "window:title-changed")]
    WindowTitleChanged {
        /// Affected window.
        window_id: WindowId,
        /// New title.
        title: String,
    },
    /// A window was removed from the registry.
    #[serde(rename = "window:closed")]
    WindowClosed {
        /// Removed window.
        window_id: WindowId,
    },
    /// An app finished mounting into its window.
    #[serde(rename = "app:launched")]
    AppLaunched {
        /// Hosting window.
        window_id: WindowId,
        /// Launched app.
        app_id: ApplicationId,
    },
    /// The tenant context changed.
    #[serde(rename = "team:switched")]
    TeamSwitched {
        /// New team.
        team_id: Option<TeamId>,
        /// Team before the switch.
        previous_team_id: Option<TeamId>,
    },
    /// Desktop icon multi-selection changed.
    #[serde(rename = "desktop:selection-changed")]
    SelectionChanged {
        /// Selected icon ids in selection order.
        selected_icons: Vec<String>,
    },
    /// App-defined topic event.
    #[serde(rename = "app:event")]
    App(AppEvent),
}

impl DesktopEvent {
    /// Returns the channel this event is dispatched on.
    pub fn channel(&self) -> EventChannel {
        match self {
            Self::WindowCreated { .. } => EventChannel::WindowCreated,
            Self::WindowActivated { .. } => EventChannel::WindowActivated,
            Self::WindowDeactivated { .. } => EventChannel::WindowDeactivated,
            Self::WindowMoved { .. } => EventChannel::WindowMoved,
            Self::WindowResized { .. } => EventChannel::WindowResized,
            Self::WindowMinimized { .. } => EventChannel::WindowMinimized,
            Self::WindowRestored { .. } => EventChannel::WindowRestored,
            Self::WindowMaximizeToggled { .. } => EventChannel::WindowMaximizeToggled,
            Self::WindowTitleChanged { .. } => EventChannel::WindowTitleChanged,
            Self::WindowClosed { .. } => EventChannel::WindowClosed,
            Self::AppLaunched { .. } => EventChannel::AppLaunched,
            Self::TeamSwitched { .. } => EventChannel::TeamSwitched,
            Self::SelectionChanged { .. } => EventChannel::SelectionChanged,
            Self::App(event) => EventChannel::Topic(event.topic.clone()),
        }
    }

    /// Returns the window the event refers to, when it refers to one.
    pub fn window_id(&self) -> Option<WindowId> {
        match self {
            Self::WindowCreated { window_id }
            | Self::WindowActivated { window_id }
            | Self::WindowDeactivated { window_id }
            | Self::WindowMoved { window_id, .. }
            | Self::WindowResized { window_id, .. }
            | Self::WindowMinimized { window_id }
            | Self::WindowRestored { window_id }
            | Self::WindowMaximizeToggled { window_id, .. }
            | Self::WindowTitleChanged { window_id, .. }
            | Self::WindowClosed { window_id }
            | Self::AppLaunched { window_id, .. } => Some(*window_id),
            Self::App(event) => event.source_window_id,
            Self::TeamSwitched { .. } | Self::SelectionChanged { .. } => None,
        }
    }
}

/// Handle identifying one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Result of one [`EventBus::emit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// Handlers that returned normally.
    pub delivered: usize,
    /// Handlers that panicked.
    pub failed: usize,
}

type Handler = Rc<dyn Fn(&DesktopEvent)>;

#[derive(Default)]
struct BusState {
    next_id: u64,
    channels: HashMap<EventChannel, Vec<(SubscriptionId, Handler)>>,
}

impl BusState {
    fn contains(&self, channel: &EventChannel, id: SubscriptionId) -> bool {
        self.channels
            .get(channel)
            .map(|handlers| handlers.iter().any(|(entry, _)| *entry == id))
            .unwrap_or(false)
    }

    fn take(&mut self, channel: &EventChannel, id: SubscriptionId) -> Option<Handler> {
        let handlers = self.channels.get_mut(channel)?;
        let index = handlers.iter().position(|(entry, _)| *entry == id)?;
        let (_, handler) = handlers.remove(index);
        if handlers.is_empty() {
            self.channels.remove(channel);
        }
        Some(handler)
    }
}

/// Single-threaded publish/subscribe bus. Clones share the same subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Rc<RefCell<BusState>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `channel`. The handler stays registered until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    pub fn on(
        &self,
        channel: EventChannel,
        handler: impl Fn(&DesktopEvent) + 'static,
    ) -> Subscription {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state
            .channels
            .entry(channel.clone())
            .or_default()
            .push((id, Rc::new(handler)));

        Subscription {
            bus: Rc::downgrade(&self.state),
            channel,
            id,
            active: Cell::new(true),
        }
    }

    /// Delivers `event` to every handler of its channel, in subscription order.
    ///
    /// Handlers unsubscribed by an earlier handler of the same dispatch are skipped. Handlers
    /// subscribed during the dispatch first run on the next emit.
    pub fn emit(&self, event: &DesktopEvent) -> DispatchOutcome {
        let channel = event.channel();
        let handlers = self
            .state
            .borrow()
            .channels
            .get(&channel)
            .cloned()
            .unwrap_or_default();

        let mut outcome = DispatchOutcome::default();
        for (id, handler) in handlers {
            if !self.state.borrow().contains(&channel, id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => outcome.delivered += 1,
                Err(panic) => {
                    outcome.failed += 1;
                    logging::warn!(
                        "event handler for `{channel}` failed: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        outcome
    }

    /// Returns the number of handlers registered for `channel`.
    pub fn subscriber_count(&self, channel: &EventChannel) -> usize {
        self.state
            .borrow()
            .channels
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Registration handle returned by [`EventBus::on`]; unsubscribes on drop.
pub struct Subscription {
    bus: Weak<RefCell<BusState>>,
    channel: EventChannel,
    id: SubscriptionId,
    active: Cell<bool>,
}

impl Subscription {
    /// Returns the subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the subscribed channel.
    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    /// Returns whether the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Removes the handler. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        let Some(state) = self.bus.upgrade() else {
            return;
        };
        // Drop the handler after the borrow ends; its captures may own subscriptions too.
        let removed = state.borrow_mut().take(&self.channel, self.id);
        drop(removed);
    }

    /// Keeps the handler registered for the lifetime of the bus.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.active.get())
            .finish()
    }
}

/// Per-app view of the bus that remembers every subscription the app makes.
///
/// The runtime calls [`EventScope::release_all`] when the app's window closes; later
/// subscriptions through a released scope are dropped immediately.
#[derive(Clone)]
pub struct EventScope {
    bus: EventBus,
    source_window_id: Option<WindowId>,
    subscriptions: Rc<RefCell<Vec<Subscription>>>,
    released: Rc<Cell<bool>>,
}

impl EventScope {
    /// Creates a scope publishing on behalf of `source_window_id`.
    pub fn new(bus: EventBus, source_window_id: Option<WindowId>) -> Self {
        Self {
            bus,
            source_window_id,
            subscriptions: Rc::new(RefCell::new(Vec::new())),
            released: Rc::new(Cell::new(false)),
        }
    }

    /// Subscribes `handler` to `channel` for the lifetime of the scope.
    pub fn on(
        &self,
        channel: EventChannel,
        handler: impl Fn(&DesktopEvent) + 'static,
    ) -> SubscriptionId {
        let subscription = self.bus.on(channel, handler);
        let id = subscription.id();
        if self.released.get() {
            logging::warn!(
                "subscription to `{}` from a released scope was dropped",
                subscription.channel()
            );
            return id;
        }
        self.subscriptions.borrow_mut().push(subscription);
        id
    }

    /// Removes one subscription made through this scope.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            subscriptions
                .iter()
                .position(|subscription| subscription.id() == id)
                .map(|index| subscriptions.remove(index))
        };
        drop(removed);
    }

    /// Publishes an app-defined topic event.
    ///
    /// # Errors
    ///
    /// Returns an error when `topic` names a runtime-owned channel.
    pub fn publish(
        &self,
        topic: impl Into<String>,
        payload: Value,
    ) -> Result<DispatchOutcome, String> {
        let topic = topic.into();
        if EventChannel::parse(&topic).is_reserved() {
            return Err(format!("topic `{topic}` is reserved for the desktop runtime"));
        }
        Ok(self.bus.emit(&DesktopEvent::App(AppEvent::new(
            topic,
            payload,
            self.source_window_id,
        ))))
    }

    /// Returns the number of live subscriptions owned by this scope.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Unsubscribes everything and refuses later subscriptions. Returns how many were released.
    pub fn release_all(&self) -> usize {
        self.released.set(true);
        let drained = std::mem::take(&mut *self.subscriptions.borrow_mut());
        let count = drained.len();
        drop(drained);
        count
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn recorder(
        bus: &EventBus,
        channel: EventChannel,
        log: &Rc<RefCell<Vec<String>>>,
        tag: &str,
    ) -> Subscription {
        let log = log.clone();
        let tag = tag.to_string();
        bus.on(channel, move |event| {
            log.borrow_mut().push(format!("{tag}:{}", event.channel()));
        })
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _a = recorder(&bus, EventChannel::WindowCreated, &log, "a");
        let _b = recorder(&bus, EventChannel::WindowCreated, &log, "b");
        let _other = recorder(&bus, EventChannel::WindowClosed, &log, "other");

        let outcome = bus.emit(&DesktopEvent::WindowCreated {
            window_id: WindowId(1),
        });

        assert_eq!(outcome, DispatchOutcome { delivered: 2, failed: 0 });
        assert_eq!(
            *log.borrow(),
            vec!["a:window:created".to_string(), "b:window:created".to_string()]
        );
    }

    #[test]
    fn panicking_handler_does_not_stop_later_handlers() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _bad = bus.on(EventChannel::WindowClosed, |_| panic!("handler exploded"));
        let _good = recorder(&bus, EventChannel::WindowClosed, &log, "good");

        let outcome = bus.emit(&DesktopEvent::WindowClosed {
            window_id: WindowId(4),
        });

        assert_eq!(outcome, DispatchOutcome { delivered: 1, failed: 1 });
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_drop_unsubscribes() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = recorder(&bus, EventChannel::WindowMoved, &log, "first");
        {
            let _scoped = recorder(&bus, EventChannel::WindowMoved, &log, "scoped");
            assert_eq!(bus.subscriber_count(&EventChannel::WindowMoved), 2);
        }
        assert_eq!(bus.subscriber_count(&EventChannel::WindowMoved), 1);

        first.unsubscribe();
        first.unsubscribe();
        assert!(!first.is_active());
        assert_eq!(bus.subscriber_count(&EventChannel::WindowMoved), 0);
    }

    #[test]
    fn emitting_on_an_unknown_channel_is_a_noop() {
        let bus = EventBus::new();
        let outcome = bus.emit(&DesktopEvent::App(AppEvent::new(
            "crm.contact-saved",
            json!({ "id": 9 }),
            None,
        )));
        assert_eq!(outcome, DispatchOutcome::default());
    }

    #[test]
    fn handler_unsubscribed_mid_dispatch_is_skipped() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let victim_for_first = victim.clone();
        let _first = bus.on(EventChannel::WindowActivated, move |_| {
            if let Some(subscription) = victim_for_first.borrow().as_ref() {
                subscription.unsubscribe();
            }
        });
        *victim.borrow_mut() = Some(recorder(
            &bus,
            EventChannel::WindowActivated,
            &log,
            "victim",
        ));

        bus.emit(&DesktopEvent::WindowActivated {
            window_id: WindowId(2),
        });

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn handlers_may_emit_reentrantly() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_bus = bus.clone();
        let _relay = bus.on(EventChannel::WindowCreated, move |event| {
            if let Some(window_id) = event.window_id() {
                inner_bus.emit(&DesktopEvent::WindowActivated { window_id });
            }
        });
        let _sink = recorder(&bus, EventChannel::WindowActivated, &log, "sink");

        bus.emit(&DesktopEvent::WindowCreated {
            window_id: WindowId(3),
        });

        assert_eq!(*log.borrow(), vec!["sink:window:activated".to_string()]);
    }

    #[test]
    fn scope_releases_every_subscription_and_rejects_reserved_topics() {
        let bus = EventBus::new();
        let scope = EventScope::new(bus.clone(), Some(WindowId(7)));
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        scope.on(EventChannel::Topic("mail.sync".to_string()), move |event| {
            if let DesktopEvent::App(app_event) = event {
                sink.borrow_mut().push(app_event.clone());
            }
        });
        scope.on(EventChannel::WindowClosed, |_| {});

        let outcome = scope.publish("mail.sync", json!({ "unread": 3 })).unwrap();
        assert_eq!(outcome.delivered, 1);
        assert_eq!(received.borrow()[0].source_window_id, Some(WindowId(7)));
        assert!(scope.publish("window:closed", Value::Null).is_err());

        assert_eq!(scope.release_all(), 2);
        assert_eq!(bus.subscriber_count(&EventChannel::WindowClosed), 0);

        scope.on(EventChannel::WindowClosed, |_| {});
        assert_eq!(scope.active_subscriptions(), 0);
        assert_eq!(bus.subscriber_count(&EventChannel::WindowClosed), 0);
    }

    #[test]
    fn events_serialize_with_channel_and_payload() {
        let event = DesktopEvent::WindowMoved {
            window_id: WindowId(5),
            x: 960,
            y: 160,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({ "channel": "window:moved", "payload": { "window_id": 5, "x": 960, "y": 160 } })
        );
        let decoded: DesktopEvent = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(EventChannel::parse("team:switched"), EventChannel::TeamSwitched);
    }
}
