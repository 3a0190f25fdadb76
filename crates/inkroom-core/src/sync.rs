//! WebSocket client for the relay server.
//!
//! Provides a platform-agnostic WebSocket client that speaks the relay's
//! framing and implements [`Transport`] on top of it.

use crate::config::{Identity, Role};
use crate::error::TransportError;
use crate::operation::Operation;
use crate::protocol::{Envelope, Message};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name stamped on envelopes the relay originates.
pub const RELAY_NAME: &str = "relay";

/// Frames sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Broadcast an envelope to the room
    Publish { envelope: Envelope },
}

/// Frames received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Confirm room join with the room's current log
    Joined {
        room: String,
        peer_count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<Vec<Operation>>,
    },
    PeerJoined { peer_id: String },
    PeerLeft { peer_id: String },
    /// An envelope published by a room member (or the relay itself)
    Deliver { envelope: Envelope },
    Error { message: String },
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the WebSocket client
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    JoinedRoom { room: String, peer_count: usize },
    PeerJoined { peer_id: String },
    PeerLeft { peer_id: String },
    /// An envelope for the session
    Received(Envelope),
    Error { message: String },
}

/// The identity the relay uses for envelopes it originates.
pub fn relay_identity() -> Identity {
    Identity {
        session_id: Uuid::nil(),
        display_name: RELAY_NAME.to_string(),
    }
}

/// Wrap a relay-originated message for a room.
pub fn relay_envelope(room: &str, message: Message) -> Envelope {
    Envelope::new(room, &relay_identity(), Role::Host, message)
}

/// Translate a text frame into events. A join carrying history yields a
/// snapshot envelope after the join event.
pub fn events_from_text(text: &str) -> Vec<SyncEvent> {
    let frame = match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("Failed to parse server frame: {}", e);
            return Vec::new();
        }
    };
    match frame {
        ServerFrame::Joined {
            room,
            peer_count,
            snapshot,
        } => {
            let mut events = Vec::with_capacity(2);
            let snapshot = snapshot
                .filter(|ops| !ops.is_empty())
                .map(|ops| relay_envelope(&room, Message::snapshot(&ops, None)));
            events.push(SyncEvent::JoinedRoom { room, peer_count });
            if let Some(envelope) = snapshot {
                events.push(SyncEvent::Received(envelope));
            }
            events
        }
        ServerFrame::PeerJoined { peer_id } => vec![SyncEvent::PeerJoined { peer_id }],
        ServerFrame::PeerLeft { peer_id } => vec![SyncEvent::PeerLeft { peer_id }],
        ServerFrame::Deliver { envelope } => vec![SyncEvent::Received(envelope)],
        ServerFrame::Error { message } => vec![SyncEvent::Error { message }],
    }
}

fn state_after(state: ConnectionState, event: &SyncEvent) -> ConnectionState {
    match event {
        SyncEvent::Connected => ConnectionState::Connected,
        SyncEvent::Disconnected => ConnectionState::Disconnected,
        SyncEvent::Error { .. } => ConnectionState::Error,
        _ => state,
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_client {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;
    use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

    type Inbox = Rc<RefCell<VecDeque<SyncEvent>>>;

    /// Browser callbacks registered on the socket. Dropping them detaches
    /// the socket from the inbox.
    struct Handlers {
        _open: Closure<dyn Fn()>,
        _message: Closure<dyn Fn(MessageEvent)>,
        _close: Closure<dyn Fn(CloseEvent)>,
        _error: Closure<dyn Fn(ErrorEvent)>,
    }

    impl Handlers {
        fn attach(ws: &WebSocket, inbox: &Inbox) -> Self {
            let sink = inbox.clone();
            let open = Closure::<dyn Fn()>::new(move || {
                sink.borrow_mut().push_back(SyncEvent::Connected);
            });

            let sink = inbox.clone();
            let message = Closure::<dyn Fn(MessageEvent)>::new(move |e: MessageEvent| {
                match e.data().as_string() {
                    Some(text) => sink.borrow_mut().extend(events_from_text(&text)),
                    None => log::debug!("Ignoring non-text relay frame"),
                }
            });

            let sink = inbox.clone();
            let close = Closure::<dyn Fn(CloseEvent)>::new(move |e: CloseEvent| {
                log::info!("Relay socket closed ({})", e.code());
                sink.borrow_mut().push_back(SyncEvent::Disconnected);
            });

            let sink = inbox.clone();
            let error = Closure::<dyn Fn(ErrorEvent)>::new(move |e: ErrorEvent| {
                sink.borrow_mut().push_back(SyncEvent::Error {
                    message: format!("Relay socket error: {}", e.message()),
                });
            });

            ws.set_onopen(Some(open.as_ref().unchecked_ref()));
            ws.set_onmessage(Some(message.as_ref().unchecked_ref()));
            ws.set_onclose(Some(close.as_ref().unchecked_ref()));
            ws.set_onerror(Some(error.as_ref().unchecked_ref()));

            Self {
                _open: open,
                _message: message,
                _close: close,
                _error: error,
            }
        }
    }

    /// Relay client backed by the browser's `WebSocket`.
    ///
    /// Callbacks queue events; [`poll_events`](Self::poll_events) drains them
    /// and sends the room join once the socket reports open.
    pub struct WasmWebSocket {
        room: String,
        state: ConnectionState,
        inbox: Inbox,
        socket: Option<(WebSocket, Handlers)>,
    }

    impl WasmWebSocket {
        pub fn new(room: impl Into<String>) -> Self {
            Self {
                room: room.into(),
                state: ConnectionState::Disconnected,
                inbox: Rc::default(),
                socket: None,
            }
        }

        pub fn connect(&mut self, url: &str) -> Result<(), TransportError> {
            if self.socket.is_some() {
                return Err(TransportError::AlreadyConnected);
            }
            let ws = WebSocket::new(url)
                .map_err(|e| TransportError::InvalidUrl(format!("{:?}", e)))?;
            let handlers = Handlers::attach(&ws, &self.inbox);
            self.socket = Some((ws, handlers));
            self.state = ConnectionState::Connecting;
            Ok(())
        }

        /// Leave the room and close the socket.
        pub fn disconnect(&mut self) {
            if let Some((ws, _handlers)) = self.socket.take() {
                if let Err(e) = self.send_on(&ws, &ClientFrame::Leave) {
                    log::debug!("Leave not sent: {}", e);
                }
                ws.set_onclose(None);
                let _ = ws.close();
            }
            self.inbox.borrow_mut().clear();
            self.state = ConnectionState::Disconnected;
        }

        fn send_on(&self, ws: &WebSocket, frame: &ClientFrame) -> Result<(), TransportError> {
            ws.send_with_str(&frame.to_json()?)
                .map_err(|e| TransportError::Send(format!("{:?}", e)))
        }

        fn send_frame(&self, frame: &ClientFrame) -> Result<(), TransportError> {
            let (ws, _) = self.socket.as_ref().ok_or(TransportError::NotConnected)?;
            self.send_on(ws, frame)
        }

        pub fn poll_events(&mut self) -> Vec<SyncEvent> {
            let events: Vec<SyncEvent> = self.inbox.borrow_mut().drain(..).collect();
            for event in &events {
                self.state = state_after(self.state, event);
                if matches!(event, SyncEvent::Connected) {
                    let join = ClientFrame::Join {
                        room: self.room.clone(),
                    };
                    if let Err(e) = self.send_frame(&join) {
                        log::error!("Failed to join room {}: {}", self.room, e);
                    }
                }
            }
            events
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Transport for WasmWebSocket {
        fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
            if self.state != ConnectionState::Connected {
                return Err(TransportError::NotConnected);
            }
            self.send_frame(&ClientFrame::Publish {
                envelope: envelope.clone(),
            })
        }

        fn poll(&mut self) -> Vec<Envelope> {
            super::received(self.poll_events())
        }

        fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Drop for WasmWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_client::WasmWebSocket;

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::net::TcpStream;
    use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::stream::MaybeTlsStream;
    use tungstenite::{Message as WsMessage, WebSocket};
    use url::Url;

    /// How long a blocking read waits before the worker checks for outgoing frames.
    const READ_TIMEOUT: Duration = Duration::from_millis(50);
    const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

    type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

    enum Outgoing {
        Frame(String),
        Close,
    }

    /// Channels to a running socket worker.
    struct Link {
        outgoing: Sender<Outgoing>,
        incoming: Receiver<SyncEvent>,
        _worker: JoinHandle<()>,
    }

    /// Relay client for native targets. A worker thread owns the blocking
    /// `tungstenite` socket and talks to the session over channels.
    pub struct NativeWebSocket {
        room: String,
        state: ConnectionState,
        link: Option<Link>,
    }

    impl NativeWebSocket {
        pub fn new(room: impl Into<String>) -> Self {
            Self {
                room: room.into(),
                state: ConnectionState::Disconnected,
                link: None,
            }
        }

        /// Start the worker. Only `ws` and `wss` URLs are accepted.
        pub fn connect(&mut self, url: &str) -> Result<(), TransportError> {
            if self.link.is_some() {
                return Err(TransportError::AlreadyConnected);
            }
            let url = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    url.scheme()
                )));
            }
            let join = ClientFrame::Join {
                room: self.room.clone(),
            }
            .to_json()?;

            let (outgoing, outgoing_rx) = mpsc::channel();
            let (incoming_tx, incoming) = mpsc::channel();
            let worker = thread::Builder::new()
                .name(format!("inkroom-ws-{}", self.room))
                .spawn(move || run_socket(url, join, outgoing_rx, incoming_tx))
                .map_err(|e| TransportError::Send(e.to_string()))?;

            self.link = Some(Link {
                outgoing,
                incoming,
                _worker: worker,
            });
            self.state = ConnectionState::Connecting;
            Ok(())
        }

        /// Ask the worker to leave the room and close. Does not block.
        pub fn disconnect(&mut self) {
            if let Some(link) = self.link.take() {
                let _ = link.outgoing.send(Outgoing::Close);
            }
            self.state = ConnectionState::Disconnected;
        }

        pub fn poll_events(&mut self) -> Vec<SyncEvent> {
            let Some(link) = self.link.as_ref() else {
                return Vec::new();
            };
            let events: Vec<SyncEvent> = link.incoming.try_iter().collect();
            for event in &events {
                self.state = state_after(self.state, event);
            }
            events
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Transport for NativeWebSocket {
        fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
            // Nothing is queued while the handshake is pending
            let link = self
                .link
                .as_ref()
                .filter(|_| self.state == ConnectionState::Connected)
                .ok_or(TransportError::NotConnected)?;
            let frame = ClientFrame::Publish {
                envelope: envelope.clone(),
            }
            .to_json()?;
            link.outgoing
                .send(Outgoing::Frame(frame))
                .map_err(|_| TransportError::Send("socket worker stopped".to_string()))
        }

        fn poll(&mut self) -> Vec<Envelope> {
            super::received(self.poll_events())
        }

        fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

    fn is_timeout(err: &tungstenite::Error) -> bool {
        matches!(
            err,
            tungstenite::Error::Io(e)
                if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
        )
    }

    fn run_socket(url: Url, join: String, outgoing: Receiver<Outgoing>, incoming: Sender<SyncEvent>) {
        let mut socket = match tungstenite::connect(url.as_str()) {
            Ok((socket, response)) => {
                log::info!("Connected to relay {} ({})", url, response.status());
                socket
            }
            Err(e) => {
                log::error!("Relay connection to {} failed: {}", url, e);
                let _ = incoming.send(SyncEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
                return;
            }
        };
        if let MaybeTlsStream::Plain(tcp) = socket.get_mut() {
            let _ = tcp.set_read_timeout(Some(READ_TIMEOUT));
            let _ = tcp.set_write_timeout(Some(WRITE_TIMEOUT));
        }
        let _ = incoming.send(SyncEvent::Connected);

        if let Err(e) = socket.send(WsMessage::Text(join)) {
            log::error!("Relay join failed: {}", e);
        } else {
            pump(&mut socket, &outgoing, &incoming);
        }

        log::info!("Relay socket worker for {} exiting", url);
        let _ = incoming.send(SyncEvent::Disconnected);
    }

    /// Shuttle frames until either side closes.
    fn pump(socket: &mut Socket, outgoing: &Receiver<Outgoing>, incoming: &Sender<SyncEvent>) {
        loop {
            loop {
                match outgoing.try_recv() {
                    Ok(Outgoing::Frame(frame)) => {
                        if let Err(e) = socket.send(WsMessage::Text(frame)) {
                            log::error!("Relay send failed: {}", e);
                            return;
                        }
                    }
                    Ok(Outgoing::Close) | Err(TryRecvError::Disconnected) => {
                        if let Ok(leave) = ClientFrame::Leave.to_json() {
                            let _ = socket.send(WsMessage::Text(leave));
                        }
                        let _ = socket.close(None);
                        return;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }

            match socket.read() {
                Ok(WsMessage::Text(text)) => {
                    for event in events_from_text(&text) {
                        if incoming.send(event).is_err() {
                            return;
                        }
                    }
                }
                Ok(WsMessage::Close(frame)) => {
                    log::info!("Relay closed the connection: {:?}", frame);
                    return;
                }
                // tungstenite queues pong replies itself
                Ok(_) => {}
                Err(e) if is_timeout(&e) => {}
                Err(e) => {
                    log::error!("Relay read failed: {}", e);
                    return;
                }
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;

/// Keep the envelopes, logging the rest.
fn received(events: Vec<SyncEvent>) -> Vec<Envelope> {
    events
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::Received(envelope) => Some(envelope),
            SyncEvent::JoinedRoom { room, peer_count } => {
                log::info!("Joined room {} ({} peers)", room, peer_count);
                None
            }
            SyncEvent::Error { message } => {
                log::warn!("Relay error: {}", message);
                None
            }
            other => {
                log::debug!("Sync event: {:?}", other);
                None
            }
        })
        .collect()
}

/// Relay client for the current target.
#[cfg(target_arch = "wasm32")]
pub type PlatformWebSocket = WasmWebSocket;

#[cfg(not(target_arch = "wasm32"))]
pub type PlatformWebSocket = NativeWebSocket;
