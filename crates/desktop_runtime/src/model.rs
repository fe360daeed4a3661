use desktop_app_contract::{ApplicationId, WindowConstraints};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use desktop_app_contract::WindowId;

pub const DEFAULT_VIEWPORT_WIDTH: i32 = 1024;
pub const DEFAULT_VIEWPORT_HEIGHT: i32 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl WindowRect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    pub fn clamped_min(self, min_w: i32, min_h: i32) -> Self {
        Self {
            w: self.w.max(min_w),
            h: self.h.max(min_h),
            ..self
        }
    }

    pub fn right(self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(self) -> i32 {
        self.y + self.h
    }

    /// Returns a `w`×`h` rect centered inside `self`.
    pub fn centered(self, w: i32, h: i32) -> Self {
        Self {
            x: self.x + (self.w - w) / 2,
            y: self.y + (self.h - h) / 2,
            w,
            h,
        }
    }
}

impl Default for WindowRect {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            w: DEFAULT_VIEWPORT_WIDTH,
            h: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

/// Display mode of a window. Minimized and maximized are exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WindowMode {
    #[default]
    Normal,
    Maximized,
    /// Minimized; `was_maximized` is restored along with the window.
    Minimized { was_maximized: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub id: WindowId,
    pub app_id: ApplicationId,
    pub title: String,
    pub rect: WindowRect,
    pub restore_rect: Option<WindowRect>,
    pub z_index: u64,
    pub is_focused: bool,
    pub mode: WindowMode,
    pub constraints: WindowConstraints,
    pub launch_params: Value,
}

impl WindowRecord {
    pub fn is_minimized(&self) -> bool {
        matches!(self.mode, WindowMode::Minimized { .. })
    }

    pub fn is_maximized(&self) -> bool {
        matches!(self.mode, WindowMode::Maximized)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenWindowRequest {
    pub app_id: ApplicationId,
    pub title: Option<String>,
    pub rect: Option<WindowRect>,
    pub launch_params: Value,
    /// Focus the new window once it is registered.
    pub activate: bool,
}

impl OpenWindowRequest {
    pub fn new(app_id: ApplicationId) -> Self {
        Self {
            app_id,
            title: None,
            rect: None,
            launch_params: Value::Null,
            activate: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_rect(mut self, rect: WindowRect) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn with_launch_params(mut self, launch_params: Value) -> Self {
        self.launch_params = launch_params;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.activate = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerPosition {
    pub x: i32,
    pub y: i32,
}

impl PointerPosition {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Platform pointer id (`PointerEvent.pointerId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointerId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

impl PointerKind {
    /// Maps `PointerEvent.pointerType`.
    pub fn from_pointer_type(raw: &str) -> Self {
        match raw {
            "touch" => Self::Touch,
            "pen" => Self::Pen,
            _ => Self::Mouse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeEdge {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl ResizeEdge {
    pub const ALL: [ResizeEdge; 8] = [
        Self::North,
        Self::South,
        Self::East,
        Self::West,
        Self::NorthEast,
        Self::NorthWest,
        Self::SouthEast,
        Self::SouthWest,
    ];

    pub fn moves_west(self) -> bool {
        matches!(self, Self::West | Self::NorthWest | Self::SouthWest)
    }

    pub fn moves_east(self) -> bool {
        matches!(self, Self::East | Self::NorthEast | Self::SouthEast)
    }

    pub fn moves_north(self) -> bool {
        matches!(self, Self::North | Self::NorthEast | Self::NorthWest)
    }

    pub fn moves_south(self) -> bool {
        matches!(self, Self::South | Self::SouthEast | Self::SouthWest)
    }
}

/// Part of a window frame hit by a pointer-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitTarget {
    Header,
    Body,
    Edge(ResizeEdge),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerDown {
    pub pointer_id: PointerId,
    pub window_id: WindowId,
    pub target: HitTarget,
    pub position: PointerPosition,
    pub kind: PointerKind,
}
