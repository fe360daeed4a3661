//! Runtime configuration for window placement, gestures, and form factor.

use serde::{Deserialize, Serialize};

use crate::error::DesktopError;

/// Height reserved for the taskbar below the desktop viewport.
pub const TASKBAR_HEIGHT_PX: i32 = 38;
/// Pointer threshold (in px) for snap-edge behavior.
pub const SNAP_EDGE_THRESHOLD: i32 = 24;

/// How far windows may leave the visible viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportPolicy {
    /// Allow windows to be dragged partially off-screen.
    pub allow_partial_offscreen: bool,
    /// Pixels of a partially off-screen window that must stay visible.
    pub min_visible_px: i32,
}

impl Default for ViewportPolicy {
    fn default() -> Self {
        Self {
            allow_partial_offscreen: false,
            min_visible_px: 48,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub viewport: ViewportPolicy,
    pub taskbar_height_px: i32,
    /// Origin of the first cascaded window.
    pub cascade_origin_x: i32,
    pub cascade_origin_y: i32,
    /// Offset between consecutive cascaded windows.
    pub cascade_step_px: i32,
    /// Snap dragged windows to halves/maximize when released near an edge.
    pub snap_to_edges: bool,
    pub snap_threshold_px: i32,
    /// Touch form factor: resize handles are not offered.
    pub touch_input: bool,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            viewport: ViewportPolicy::default(),
            taskbar_height_px: TASKBAR_HEIGHT_PX,
            cascade_origin_x: 40,
            cascade_origin_y: 48,
            cascade_step_px: 20,
            snap_to_edges: false,
            snap_threshold_px: SNAP_EDGE_THRESHOLD,
            touch_input: false,
        }
    }
}

impl DesktopConfig {
    /// Parses and validates a JSON config document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError::InvalidConfig`] for malformed JSON or out-of-range values.
    pub fn from_json_str(raw: &str) -> Result<Self, DesktopError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| DesktopError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`DesktopError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DesktopError> {
        if self.viewport.min_visible_px < 0 {
            return Err(DesktopError::InvalidConfig(
                "viewport.min_visible_px must not be negative".to_string(),
            ));
        }
        if self.taskbar_height_px < 0 {
            return Err(DesktopError::InvalidConfig(
                "taskbar_height_px must not be negative".to_string(),
            ));
        }
        if self.cascade_step_px < 0 || self.snap_threshold_px < 0 {
            return Err(DesktopError::InvalidConfig(
                "cascade_step_px and snap_threshold_px must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
