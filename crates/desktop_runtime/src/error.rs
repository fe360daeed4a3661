//! Error taxonomy for window-manager and lifecycle operations.

use desktop_app_contract::{ApplicationId, WindowId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DesktopError {
    /// Launch of an app id missing from the registry.
    #[error("app `{0}` is not registered")]
    AppNotRegistered(ApplicationId),
    /// The principal lacks capabilities the app requires.
    #[error("permission denied for app `{app_id}`; missing {}", .missing.join(", "))]
    PermissionDenied {
        app_id: ApplicationId,
        missing: Vec<String>,
    },
    #[error("app `{0}` is already registered")]
    AppAlreadyRegistered(ApplicationId),
    /// A lifecycle hook failed or panicked. Logged; the transition continues.
    #[error("{hook} hook failed for window {window_id}: {message}")]
    HookFailure {
        window_id: WindowId,
        hook: &'static str,
        message: String,
    },
    /// A drag or resize gesture ended without a pointer-up.
    #[error("gesture on window {window_id} aborted: {reason}")]
    GestureAborted {
        window_id: WindowId,
        reason: &'static str,
    },
    #[error("invalid desktop config: {0}")]
    InvalidConfig(String),
    #[error("invalid app manifest catalog: {0}")]
    InvalidManifest(String),
}
