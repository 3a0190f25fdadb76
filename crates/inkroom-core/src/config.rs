//! Engine configuration and per-session parameters.

use crate::error::ConfigError;
use crate::operation::Rgba;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Default history capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;
/// Default pointer-move flush cadence.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 16;
/// Minimum zoom factor.
pub const MIN_SCALE: f64 = 0.02;
/// Maximum zoom factor.
pub const MAX_SCALE: f64 = 10.0;
/// Soft world extent, used only to center the initial view.
pub const WORLD_SIZE: f64 = 8192.0;

/// Which field identifies "my own" messages for echo suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EchoKey {
    /// Unique per-session id.
    #[default]
    SessionId,
    /// Display name. Two sessions sharing a name suppress each other.
    DisplayName,
}

/// Tunables for a whiteboard session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history_capacity: usize,
    pub flush_interval_ms: u64,
    pub min_scale: f64,
    pub max_scale: f64,
    pub world_size: f64,
    /// Selection box padding in screen pixels.
    pub selection_padding_px: f64,
    /// Added to the stroke width when painting eraser segments.
    pub eraser_extra_width: f64,
    /// Zoom factor applied per wheel notch.
    pub wheel_zoom_step: f64,
    pub background: Rgba,
    pub default_color: Rgba,
    pub default_width: f64,
    pub echo_key: EchoKey,
    /// Whether a host session replies to `request-snapshot` itself. The relay
    /// server answers from its own mirror too, so behind it a requester
    /// replaces its log twice unless this is turned off.
    pub host_answers_snapshot_requests: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
            world_size: WORLD_SIZE,
            selection_padding_px: 5.0,
            eraser_extra_width: 10.0,
            wheel_zoom_step: 1.1,
            background: Rgba::white(),
            default_color: Rgba::black(),
            default_width: 3.0,
            echo_key: EchoKey::SessionId,
            host_answers_snapshot_requests: true,
        }
    }
}

impl EngineConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be at least 1".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid("flush_interval_ms must be positive".into()));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            return Err(ConfigError::Invalid(format!(
                "scale bounds must satisfy 0 < min <= max (got {} .. {})",
                self.min_scale, self.max_scale
            )));
        }
        if self.wheel_zoom_step <= 0.0 {
            return Err(ConfigError::Invalid("wheel_zoom_step must be positive".into()));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Participant role within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Viewer,
}

/// Who this session is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub session_id: Uuid,
    pub display_name: String,
}

impl Identity {
    /// Fresh identity with a random session id.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            display_name: display_name.into(),
        }
    }
}

/// Values supplied by the membership service when a session starts.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub room: String,
    pub identity: Identity,
    pub role: Role,
    pub can_draw: bool,
    pub is_globally_visible: bool,
    pub is_active: bool,
}

impl SessionParams {
    pub fn host(room: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            identity: Identity::new(display_name),
            role: Role::Host,
            can_draw: true,
            is_globally_visible: true,
            is_active: true,
        }
    }

    pub fn viewer(room: impl Into<String>, display_name: impl Into<String>, can_draw: bool) -> Self {
        Self {
            room: room.into(),
            identity: Identity::new(display_name),
            role: Role::Viewer,
            can_draw,
            is_globally_visible: true,
            is_active: true,
        }
    }
}
