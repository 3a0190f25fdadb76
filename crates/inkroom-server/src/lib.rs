//! Inkroom WebSocket Relay Server
//!
//! Relays whiteboard envelopes between the sessions of a room and keeps a
//! mirrored history log per room so late joiners can be brought up to date.
//!
//! ## Protocol
//!
//! Frames are JSON with the following format:
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "publish", "envelope": { "room": "room-id", "sender": "<uuid>", ... } }
//! { "type": "leave" }
//! ```

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use inkroom_core::config::DEFAULT_HISTORY_CAPACITY;
use inkroom_core::protocol::{Envelope, Message as WhiteboardMessage, apply_to_log};
use inkroom_core::sync::{ClientFrame, ServerFrame, relay_envelope};
use inkroom_core::{HistoryLog, Operation};
use std::{collections::HashSet, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub history_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3030)),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Read `INKROOM_ADDR` and `INKROOM_HISTORY_CAPACITY`, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();
        if let Some(addr) = lookup("INKROOM_ADDR") {
            config.addr = addr
                .parse()
                .map_err(|e| ServerError::Config(format!("INKROOM_ADDR {:?}: {}", addr, e)))?;
        }
        if let Some(capacity) = lookup("INKROOM_HISTORY_CAPACITY") {
            config.history_capacity = match capacity.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ServerError::Config(format!(
                        "INKROOM_HISTORY_CAPACITY must be a positive integer, got {:?}",
                        capacity
                    )));
                }
            };
        }
        Ok(config)
    }
}

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<(String, ServerFrame)>,
    /// Connected peer IDs
    peers: HashSet<String>,
    /// Mirror of the room's log (for new joiners and snapshot requests)
    history: HistoryLog,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashSet::new(),
            history: HistoryLog::new(capacity),
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Active rooms
    rooms: DashMap<String, Room>,
    history_capacity: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl AppState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            history_capacity: history_capacity.max(1),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Copy of a room's mirrored log.
    pub fn room_history(&self, room_id: &str) -> Option<Vec<Operation>> {
        self.rooms.get(room_id).map(|room| room.history.snapshot())
    }

    /// Add peer to room
    fn join_room(
        &self,
        room_id: &str,
        peer_id: &str,
    ) -> (broadcast::Receiver<(String, ServerFrame)>, Option<Vec<Operation>>, usize) {
        let capacity = self.history_capacity;
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(capacity));
        room.peers.insert(peer_id.to_string());
        let rx = room.tx.subscribe();
        let snapshot = (!room.history.is_empty()).then(|| room.history.snapshot());
        (rx, snapshot, room.peers.len())
    }

    /// Remove peer from room
    fn leave_room(&self, room_id: &str, peer_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.peers.remove(peer_id);
            // Clean up empty rooms
            if room.peers.is_empty() {
                drop(room);
                self.rooms.remove(room_id);
                debug!("Room {} closed", room_id);
            }
        }
    }

    /// Broadcast frame to room
    fn broadcast(&self, room_id: &str, from: &str, frame: ServerFrame) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((from.to_string(), frame));
        }
    }

    /// Handle an envelope published into `room_id`. Returns a frame to send
    /// back to the publisher only.
    fn publish(&self, room_id: &str, peer_id: &str, envelope: Envelope) -> Option<ServerFrame> {
        if envelope.room != room_id {
            return Some(ServerFrame::Error {
                message: format!("Envelope for room {} published in {}", envelope.room, room_id),
            });
        }
        if !envelope.is_authorized() {
            warn!(
                "Dropping {} from non-host {} in room {}",
                envelope.message.kind(),
                envelope.sender_name,
                room_id
            );
            return None;
        }

        let reply = {
            let mut room = self.rooms.get_mut(room_id)?;
            let effect = apply_to_log(&mut room.history, &envelope.message);
            debug!("Room {} mirrored {}: {:?}", room_id, envelope.message.kind(), effect);

            matches!(envelope.message, WhiteboardMessage::RequestSnapshot).then(|| {
                let snapshot =
                    WhiteboardMessage::snapshot(&room.history.snapshot(), Some(envelope.sender));
                ServerFrame::Deliver {
                    envelope: relay_envelope(room_id, snapshot),
                }
            })
        };

        self.broadcast(room_id, peer_id, ServerFrame::Deliver { envelope });
        reply
    }
}

/// Build the relay router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "Inkroom Relay Server - Connect via WebSocket at /ws"
}

/// Health check
pub async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(frame: &ServerFrame) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode frame: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current_room: Option<String> = None;
    let mut room_rx: Option<broadcast::Receiver<(String, ServerFrame)>> = None;

    loop {
        tokio::select! {
            // Handle incoming frames from client
            msg = receiver.next() => {
                let reply = match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(ClientFrame::Join { room }) => {
                            // Leave current room if any
                            if let Some(old_room) = current_room.take() {
                                state.leave_room(&old_room, &peer_id);
                                state.broadcast(&old_room, &peer_id, ServerFrame::PeerLeft {
                                    peer_id: peer_id.clone(),
                                });
                            }

                            let (rx, snapshot, peer_count) = state.join_room(&room, &peer_id);
                            room_rx = Some(rx);
                            current_room = Some(room.clone());

                            state.broadcast(&room, &peer_id, ServerFrame::PeerJoined {
                                peer_id: peer_id.clone(),
                            });
                            info!("Peer {} joined room {}", peer_id, room);

                            Some(ServerFrame::Joined { room, peer_count, snapshot })
                        }
                        Ok(ClientFrame::Leave) => {
                            if let Some(room) = current_room.take() {
                                state.leave_room(&room, &peer_id);
                                state.broadcast(&room, &peer_id, ServerFrame::PeerLeft {
                                    peer_id: peer_id.clone(),
                                });
                                info!("Peer {} left room {}", peer_id, room);
                            }
                            room_rx = None;
                            None
                        }
                        Ok(ClientFrame::Publish { envelope }) => match current_room {
                            Some(ref room) => state.publish(room, &peer_id, envelope),
                            None => Some(ServerFrame::Error {
                                message: "Join a room before publishing".to_string(),
                            }),
                        },
                        Err(e) => {
                            warn!("Invalid frame from {}: {}", peer_id, e);
                            Some(ServerFrame::Error {
                                message: format!("Invalid frame: {}", e),
                            })
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => None, // Ignore binary, ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                };

                if let Some(message) = reply.as_ref().and_then(encode) {
                    if sender.send(message).await.is_err() {
                        break;
                    }
                }
            }

            // Handle broadcast frames from room
            msg = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await.ok(),
                    None => {
                        // No room joined, just wait forever
                        std::future::pending::<Option<(String, ServerFrame)>>().await
                    }
                }
            } => {
                if let Some((from, frame)) = msg {
                    // Don't echo back to sender
                    if from != peer_id {
                        if let Some(message) = encode(&frame) {
                            if sender.send(message).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(ref room) = current_room {
        state.leave_room(room, &peer_id);
        state.broadcast(room, &peer_id, ServerFrame::PeerLeft {
            peer_id: peer_id.clone(),
        });
    }
    info!("Connection closed: {}", peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::{Identity, Role, Rgba};
    use kurbo::Point;

    fn stroke_envelope(room: &str, who: &Identity) -> Envelope {
        let op = Operation::stroke(
            who.display_name.clone(),
            Point::ZERO,
            Point::new(1.0, 1.0),
            Rgba::black(),
            2.0,
            false,
        );
        Envelope::new(room, who, Role::Viewer, WhiteboardMessage::DrawStroke(op))
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ServerConfig::default());

        let config = ServerConfig::from_lookup(|key| match key {
            "INKROOM_ADDR" => Some("127.0.0.1:9000".to_string()),
            "INKROOM_HISTORY_CAPACITY" => Some("10".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.history_capacity, 10);

        assert!(ServerConfig::from_lookup(|k| (k == "INKROOM_HISTORY_CAPACITY").then(|| "0".into())).is_err());
        assert!(ServerConfig::from_lookup(|k| (k == "INKROOM_ADDR").then(|| "nope".into())).is_err());
    }

    #[test]
    fn test_join_and_cleanup() {
        let state = AppState::default();
        let (_rx_a, snapshot, count) = state.join_room("r", "a");
        assert!(snapshot.is_none());
        assert_eq!(count, 1);
        let (_rx_b, _, count) = state.join_room("r", "b");
        assert_eq!(count, 2);

        state.leave_room("r", "a");
        assert_eq!(state.room_count(), 1);
        state.leave_room("r", "b");
        assert_eq!(state.room_count(), 0);
    }

    #[test]
    fn test_publish_mirrors_and_relays() {
        let state = AppState::new(2);
        let (_rx_a, _, _) = state.join_room("r", "a");
        let (mut rx_b, _, _) = state.join_room("r", "b");
        let alice = Identity::new("alice");

        for _ in 0..3 {
            assert!(state.publish("r", "a", stroke_envelope("r", &alice)).is_none());
        }
        assert_eq!(state.room_history("r").map(|h| h.len()), Some(2));

        let (from, frame) = rx_b.try_recv().unwrap();
        assert_eq!(from, "a");
        assert!(matches!(frame, ServerFrame::Deliver { .. }));

        let (_rx_c, snapshot, _) = state.join_room("r", "c");
        assert_eq!(snapshot.map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_forged_clear_not_relayed() {
        let state = AppState::default();
        let (mut rx, _, _) = state.join_room("r", "a");
        let viewer = Identity::new("v");
        state.publish("r", "a", stroke_envelope("r", &viewer));
        let _ = rx.try_recv();

        let forged = Envelope::new(
            "r",
            &viewer,
            Role::Viewer,
            WhiteboardMessage::Clear(Operation::clear("v")),
        );
        assert!(state.publish("r", "a", forged).is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(state.room_history("r").map(|h| h.len()), Some(1));
    }

    #[test]
    fn test_request_snapshot_answered_to_requester() {
        let state = AppState::default();
        let (_rx, _, _) = state.join_room("r", "a");
        let alice = Identity::new("alice");
        state.publish("r", "a", stroke_envelope("r", &alice));

        let bob = Identity::new("bob");
        let request = Envelope::new("r", &bob, Role::Viewer, WhiteboardMessage::RequestSnapshot);
        let Some(ServerFrame::Deliver { envelope }) = state.publish("r", "b", request) else {
            panic!("expected a snapshot reply");
        };
        let WhiteboardMessage::Snapshot { operations, target } = envelope.message else {
            panic!("expected snapshot");
        };
        assert_eq!(target, Some(bob.session_id));
        assert_eq!(operations.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_room_mismatch_rejected() {
        let state = AppState::default();
        let (_rx, _, _) = state.join_room("r", "a");
        let alice = Identity::new("alice");
        let reply = state.publish("r", "a", stroke_envelope("elsewhere", &alice));
        assert!(matches!(reply, Some(ServerFrame::Error { .. })));
        assert_eq!(state.room_history("r").map(|h| h.len()), Some(0));
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(health().await, "ok");
    }
}
