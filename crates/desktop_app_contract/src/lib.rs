//! Shared contract types between the desktop window manager runtime and managed apps.
//!
//! Apps depend only on this crate: they describe themselves with an [`AppRegistration`], hand the
//! runtime an [`AppModule`] factory, and implement the optional hooks of [`BaseApp`]. Everything
//! the runtime exposes back to an app instance travels through [`AppContext`] and its
//! [`AppServices`].

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod context;
pub mod events;
pub mod lifecycle;

use serde::{Deserialize, Serialize};

pub use context::{AppCommand, AppContext, AppServices, Principal, WindowService};
pub use events::{
    AppEvent, DesktopEvent, DispatchOutcome, EventBus, EventChannel, EventScope, Subscription,
    SubscriptionId,
};
pub use lifecycle::{guard_hook, guard_sync_hook, BaseApp, ContentRegion, HookError, HookFuture};

/// Stable identifier for a runtime-managed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant (team) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u64);

/// Signed-in user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Stable identifier for an app package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationId(String);

impl ApplicationId {
    /// Returns an app identifier when `raw` is one or more lowercase dotted segments.
    pub fn new(raw: impl Into<String>) -> Result<Self, String> {
        let raw = raw.into();
        if is_valid_application_id(&raw) {
            Ok(Self(raw))
        } else {
            Err(format!(
                "invalid application id `{raw}`; expected lowercase segments such as `calculator` or `crm.contacts`"
            ))
        }
    }

    /// Returns the string form of the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creates an id without validation for compile-time trusted constants.
    pub fn trusted(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ApplicationId {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<ApplicationId> for String {
    fn from(id: ApplicationId) -> Self {
        id.0
    }
}

fn is_valid_application_id(raw: &str) -> bool {
    if raw.is_empty() || raw.len() > 120 {
        return false;
    }

    raw.split('.').all(|part| {
        let bytes = part.as_bytes();
        !part.is_empty()
            && part.len() <= 32
            && bytes[0].is_ascii_lowercase()
            && bytes
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
            && !part.ends_with('-')
    })
}

/// Geometry and chrome constraints declared by an app for each of its windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConstraints {
    /// Smallest allowed window width.
    pub min_width: i32,
    /// Smallest allowed window height.
    pub min_height: i32,
    /// Largest allowed window width, bounded by the viewport when absent.
    pub max_width: Option<i32>,
    /// Largest allowed window height, bounded by the viewport when absent.
    pub max_height: Option<i32>,
    /// Initial width when the launch request does not specify one.
    pub default_width: i32,
    /// Initial height when the launch request does not specify one.
    pub default_height: i32,
    /// Whether resize handles are offered.
    pub resizable: bool,
    /// Whether the header can be dragged.
    pub draggable: bool,
    /// Whether the window may be maximized.
    pub maximizable: bool,
    /// Whether new windows open centered in the viewport.
    pub centered: bool,
}

impl Default for WindowConstraints {
    fn default() -> Self {
        Self {
            min_width: 220,
            min_height: 140,
            max_width: None,
            max_height: None,
            default_width: 420,
            default_height: 300,
            resizable: true,
            draggable: true,
            maximizable: true,
            centered: false,
        }
    }
}

/// Manifest-backed registration metadata for a runtime app entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRegistration {
    /// Canonical app id.
    pub app_id: ApplicationId,
    /// Human-readable display name.
    pub display_name: String,
    /// Icon descriptor understood by the shell renderer.
    pub icon: String,
    /// Capabilities a principal must hold to launch the app.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Whether app context carries the current team.
    #[serde(default)]
    pub team_scoped: bool,
    /// Window geometry constraints.
    #[serde(default)]
    pub window: WindowConstraints,
    /// Whether a second launch focuses the existing window instead of opening another.
    #[serde(default)]
    pub single_instance: bool,
    /// Launcher visibility flag.
    #[serde(default = "default_true")]
    pub show_in_launcher: bool,
    /// Desktop icon visibility flag.
    #[serde(default)]
    pub show_on_desktop: bool,
}

fn default_true() -> bool {
    true
}

impl AppRegistration {
    /// Creates a registration with default window constraints and launcher visibility.
    pub fn new(app_id: ApplicationId, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        Self {
            icon: app_id.as_str().to_string(),
            app_id,
            display_name,
            permissions: Vec::new(),
            team_scoped: false,
            window: WindowConstraints::default(),
            single_instance: false,
            show_in_launcher: true,
            show_on_desktop: false,
        }
    }

    /// Returns the required capabilities that `principal` does not hold.
    pub fn missing_permissions(&self, principal: &Principal) -> Vec<String> {
        self.permissions
            .iter()
            .filter(|permission| !principal.permissions.contains(permission.as_str()))
            .cloned()
            .collect()
    }
}

/// Static app factory used by the runtime registry.
pub type AppFactory = fn() -> Box<dyn BaseApp>;

#[derive(Debug, Clone, Copy)]
/// App module descriptor used by the runtime app registry.
pub struct AppModule {
    factory: AppFactory,
}

impl AppModule {
    /// Creates a module from a factory function.
    pub const fn new(factory: AppFactory) -> Self {
        Self { factory }
    }

    /// Creates a fresh per-window app instance.
    pub fn instantiate(self) -> Box<dyn BaseApp> {
        (self.factory)()
    }
}
