//! Capability-scoped context and service handles injected into app instances.

use std::{collections::BTreeSet, fmt, rc::Rc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{events::EventScope, ApplicationId, TeamId, UserId, WindowId};

/// Identity and capability set of the signed-in user for the current team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Signed-in user.
    pub user_id: UserId,
    /// Current team, when the user has selected one.
    pub team_id: Option<TeamId>,
    /// Capabilities granted to the user in the current team.
    pub permissions: BTreeSet<String>,
}

impl Principal {
    /// Creates a principal without a team or permissions.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            team_id: None,
            permissions: BTreeSet::new(),
        }
    }

    /// Sets the current team.
    pub fn with_team(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    /// Adds capabilities to the principal.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }
}

/// Commands an app may send about its own window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppCommand {
    /// Request a title update for the current window.
    SetWindowTitle {
        /// New title text.
        title: String,
    },
    /// Request focus for the current window.
    FocusWindow,
    /// Request that the current window be minimized.
    MinimizeWindow,
}

/// Window-scoped service that forwards [`AppCommand`]s to the window manager.
#[derive(Clone)]
pub struct WindowService {
    sender: Rc<dyn Fn(AppCommand)>,
}

impl WindowService {
    /// Creates a service from the runtime command callback.
    pub fn new(sender: Rc<dyn Fn(AppCommand)>) -> Self {
        Self { sender }
    }

    /// Creates a service that drops every command.
    pub fn disabled() -> Self {
        Self::new(Rc::new(|_| {}))
    }

    /// Requests a title change for the current window.
    pub fn set_title(&self, title: impl Into<String>) {
        (self.sender)(AppCommand::SetWindowTitle {
            title: title.into(),
        });
    }

    /// Requests focus for the current window.
    pub fn focus(&self) {
        (self.sender)(AppCommand::FocusWindow);
    }

    /// Requests minimizing the current window.
    pub fn minimize(&self) {
        (self.sender)(AppCommand::MinimizeWindow);
    }
}

/// Service handles shared by every context built for one app instance.
#[derive(Clone)]
pub struct AppServices {
    /// Window integration service.
    pub window: WindowService,
    /// Event bus access scoped to the app instance.
    pub events: EventScope,
}

/// Context injected by the desktop runtime per window instance.
///
/// A context is immutable once built; the runtime replaces it with a freshly fetched one when the
/// team changes.
#[derive(Clone)]
pub struct AppContext {
    /// Hosting window.
    pub window_id: WindowId,
    /// App running in the window.
    pub app_id: ApplicationId,
    /// Current team; always `None` for apps that are not team scoped.
    pub team_id: Option<TeamId>,
    /// Signed-in user.
    pub user_id: UserId,
    /// Capabilities granted to the user for this app and team.
    pub permissions: BTreeSet<String>,
    /// App settings scoped to this app and team.
    pub config: Map<String, Value>,
    /// Launch params supplied at window-open time.
    pub launch_params: Value,
    services: AppServices,
}

impl AppContext {
    /// Builds a context for one window.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        window_id: WindowId,
        app_id: ApplicationId,
        team_id: Option<TeamId>,
        user_id: UserId,
        permissions: BTreeSet<String>,
        config: Map<String, Value>,
        launch_params: Value,
        services: AppServices,
    ) -> Self {
        Self {
            window_id,
            app_id,
            team_id,
            user_id,
            permissions,
            config,
            launch_params,
            services,
        }
    }

    /// Returns whether the context grants `capability`.
    pub fn can(&self, capability: &str) -> bool {
        self.permissions.contains(capability)
    }

    /// Returns a config value by key.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Returns the injected service handles.
    pub fn services(&self) -> &AppServices {
        &self.services
    }

    /// Shorthand for the window service.
    pub fn window(&self) -> &WindowService {
        &self.services.window
    }

    /// Shorthand for the scoped event service.
    pub fn events(&self) -> &EventScope {
        &self.services.events
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("window_id", &self.window_id)
            .field("app_id", &self.app_id)
            .field("team_id", &self.team_id)
            .field("user_id", &self.user_id)
            .field("permissions", &self.permissions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
