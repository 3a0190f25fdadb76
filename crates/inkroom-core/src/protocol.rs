//! Synchronization protocol: message taxonomy and how messages change a log.
//!
//! Messages are fire-and-forget. There is no acknowledgement, retry, or
//! cross-sender ordering; a message authored by the receiver itself is
//! dropped (origin-echo suppression).
//!
//! Wire format (JSON, adjacently tagged):
//! ```json
//! { "room": "r1", "sender": "<uuid>", "senderName": "ada", "senderRole": "host",
//!   "message": { "type": "draw-stroke", "payload": { "type": "stroke", ... } } }
//! ```

use crate::config::{EchoKey, Identity, Role};
use crate::history::HistoryLog;
use crate::operation::{Geometry, Operation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// New geometry for one log index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementMove {
    pub index: usize,
    pub geometry: Geometry,
}

/// Every message a session can send or receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Message {
    DrawStroke(Operation),
    DrawShape(Operation),
    /// Host only. Receivers reset to a single `Clear` sentinel.
    Clear(Operation),
    RequestSnapshot,
    /// Full ordered log. Kept as raw JSON so a malformed payload degrades to
    /// an empty history instead of failing the whole envelope.
    #[serde(rename_all = "camelCase")]
    Snapshot {
        operations: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Uuid>,
    },
    MoveElements(Vec<ElementMove>),
    DeleteElements(Vec<usize>),
    /// Host only.
    #[serde(rename_all = "camelCase")]
    PermissionUpdate { viewer_id: Uuid, can_draw: bool },
    /// Host only.
    #[serde(rename_all = "camelCase")]
    VisibilityToggle { is_visible: bool },
}

impl Message {
    /// Snapshot message carrying a deep copy of `ops`.
    pub fn snapshot(ops: &[Operation], target: Option<Uuid>) -> Self {
        let operations = serde_json::to_value(ops).unwrap_or_else(|e| {
            log::error!("Failed to encode snapshot: {}", e);
            Value::Array(Vec::new())
        });
        Message::Snapshot { operations, target }
    }

    /// Messages only the host may issue.
    pub fn requires_host(&self) -> bool {
        matches!(
            self,
            Message::Clear(_) | Message::PermissionUpdate { .. } | Message::VisibilityToggle { .. }
        )
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::DrawStroke(_) => "draw-stroke",
            Message::DrawShape(_) => "draw-shape",
            Message::Clear(_) => "clear",
            Message::RequestSnapshot => "request-snapshot",
            Message::Snapshot { .. } => "snapshot",
            Message::MoveElements(_) => "move-elements",
            Message::DeleteElements(_) => "delete-elements",
            Message::PermissionUpdate { .. } => "permission-update",
            Message::VisibilityToggle { .. } => "visibility-toggle",
        }
    }
}

/// A message scoped to a room, stamped with its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub room: String,
    pub sender: Uuid,
    pub sender_name: String,
    pub sender_role: Role,
    pub message: Message,
}

impl Envelope {
    pub fn new(room: impl Into<String>, identity: &Identity, role: Role, message: Message) -> Self {
        Self {
            room: room.into(),
            sender: identity.session_id,
            sender_name: identity.display_name.clone(),
            sender_role: role,
            message,
        }
    }

    /// Whether this envelope originated from `local` under the given key.
    pub fn is_echo(&self, local: &Identity, key: EchoKey) -> bool {
        match key {
            EchoKey::SessionId => self.sender == local.session_id,
            EchoKey::DisplayName => self.sender_name == local.display_name,
        }
    }

    /// Host-only messages from non-hosts are not authorized.
    pub fn is_authorized(&self) -> bool {
        !self.message.requires_host() || self.sender_role == Role::Host
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Decode a snapshot payload. Anything but a list yields an empty history;
/// list entries that do not parse are skipped.
pub fn decode_snapshot(payload: &Value) -> Vec<Operation> {
    let Some(items) = payload.as_array() else {
        log::warn!("Malformed snapshot payload (not a list), treating as empty");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match Operation::deserialize(item) {
            Ok(op) => Some(op),
            Err(e) => {
                log::warn!("Skipping malformed snapshot entry: {}", e);
                None
            }
        })
        .collect()
}

/// How applying a message changed a log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEffect {
    /// Nothing to do for the log.
    Unchanged,
    /// One entry appended; `evicted` entries left the front.
    Appended { evicted: usize },
    /// Whole log replaced.
    Replaced,
    /// Reset to a single `Clear` sentinel.
    Cleared,
    /// Geometry overwritten at these indices (absent ones skipped).
    Moved { applied: Vec<usize> },
    /// These indices were removed (descending, absent ones skipped).
    Removed { removed: Vec<usize> },
}

/// Apply the log-affecting part of a message. Authorization, echo
/// suppression and snapshot targeting are the caller's concern.
pub fn apply_to_log(history: &mut HistoryLog, message: &Message) -> LogEffect {
    match message {
        Message::DrawStroke(op) | Message::DrawShape(op) => LogEffect::Appended {
            evicted: history.push(op.clone()),
        },
        Message::Clear(sentinel) => {
            history.reset_to_clear(sentinel.clone());
            LogEffect::Cleared
        }
        Message::Snapshot { operations, .. } => {
            history.replace_all(decode_snapshot(operations));
            LogEffect::Replaced
        }
        Message::MoveElements(moves) => {
            let applied = moves
                .iter()
                .filter(|m| {
                    let ok = history.apply_geometry(m.index, m.geometry);
                    if !ok {
                        log::debug!("move-elements: index {} absent, skipped", m.index);
                    }
                    ok
                })
                .map(|m| m.index)
                .collect();
            LogEffect::Moved { applied }
        }
        Message::DeleteElements(indices) => LogEffect::Removed {
            removed: history.remove_indices(indices),
        },
        Message::RequestSnapshot
        | Message::PermissionUpdate { .. }
        | Message::VisibilityToggle { .. } => LogEffect::Unchanged,
    }
}
