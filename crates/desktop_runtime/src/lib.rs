//! Headless desktop environment runtime: window management, pointer gestures, app lifecycle, and
//! shell models for a browser-hosted multi-window desktop.
//!
//! All services are single-threaded and share one [`desktop_app_contract::EventBus`]. Start from
//! [`DesktopHost`] for a wired session, or compose [`WindowManager`], [`InteractionController`],
//! and [`AppRuntime`] directly.

pub mod app_runtime;
pub mod apps;
pub mod config;
pub mod context_source;
pub mod error;
pub mod gesture;
pub mod host;
pub mod model;
pub mod registry;
pub mod shell;
pub mod window_manager;

pub use app_runtime::AppRuntime;
pub use apps::BuiltinApp;
pub use config::{DesktopConfig, ViewportPolicy};
pub use context_source::{ContextSource, MemoryContextSource, NoopContextSource};
pub use error::DesktopError;
pub use gesture::{
    GestureKind, InteractionController, ListenerGuard, PointerListenerHost, PointerSignal,
    RecordingPointerHost,
};
pub use host::{desktop_viewport_rect, DesktopHost};
pub use model::*;
pub use registry::AppRegistry;
pub use shell::{DesktopSelection, TaskbarEntry, TaskbarModel};
pub use window_manager::WindowManager;
