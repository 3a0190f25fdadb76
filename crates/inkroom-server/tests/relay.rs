use futures_util::{SinkExt, StreamExt};
use inkroom_core::sync::{ClientFrame, ServerFrame};
use inkroom_core::{Envelope, Identity, Message, Operation, Rgba, Role};
use inkroom_server::{AppState, app};
use kurbo::Point;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::default());
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    format!("ws://{}/ws", addr)
}

async fn connect(url: &str) -> Client {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Client, frame: &ClientFrame) {
    let json = frame.to_json().unwrap();
    ws.send(tungstenite::Message::Text(json.into())).await.unwrap();
}

async fn next_frame(ws: &mut Client) -> Option<ServerFrame> {
    loop {
        let msg = tokio::time::timeout(Duration::from_millis(500), ws.next())
            .await
            .ok()??
            .ok()?;
        if let tungstenite::Message::Text(text) = msg {
            return Some(serde_json::from_str(text.as_str()).unwrap());
        }
    }
}

async fn join(ws: &mut Client, room: &str) -> ServerFrame {
    send(ws, &ClientFrame::Join { room: room.to_string() }).await;
    next_frame(ws).await.unwrap()
}

fn stroke(room: &str, who: &Identity) -> Envelope {
    let op = Operation::stroke(
        who.display_name.clone(),
        Point::new(1.0, 2.0),
        Point::new(3.0, 4.0),
        Rgba::black(),
        2.0,
        false,
    );
    Envelope::new(room, who, Role::Viewer, Message::DrawStroke(op))
}

#[tokio::test]
async fn test_join_reports_peers() {
    let url = start_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;

    match join(&mut a, "room").await {
        ServerFrame::Joined { room, peer_count, snapshot } => {
            assert_eq!(room, "room");
            assert_eq!(peer_count, 1);
            assert!(snapshot.is_none());
        }
        other => panic!("unexpected frame {:?}", other),
    }
    assert!(matches!(
        join(&mut b, "room").await,
        ServerFrame::Joined { peer_count: 2, .. }
    ));
    assert!(matches!(next_frame(&mut a).await, Some(ServerFrame::PeerJoined { .. })));
}

#[tokio::test]
async fn test_publish_relays_without_echo() {
    let url = start_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    join(&mut a, "room").await;
    join(&mut b, "room").await;
    next_frame(&mut a).await; // peer_joined

    let alice = Identity::new("alice");
    let envelope = stroke("room", &alice);
    send(&mut a, &ClientFrame::Publish { envelope: envelope.clone() }).await;

    match next_frame(&mut b).await {
        Some(ServerFrame::Deliver { envelope: got }) => assert_eq!(got, envelope),
        other => panic!("unexpected frame {:?}", other),
    }
    assert!(next_frame(&mut a).await.is_none());
}

#[tokio::test]
async fn test_late_joiner_receives_history() {
    let url = start_server().await;
    let mut a = connect(&url).await;
    join(&mut a, "room").await;

    let alice = Identity::new("alice");
    send(&mut a, &ClientFrame::Publish { envelope: stroke("room", &alice) }).await;
    send(&mut a, &ClientFrame::Publish { envelope: stroke("room", &alice) }).await;
    // Publishes produce no reply; give the relay a moment to mirror them
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut c = connect(&url).await;
    match join(&mut c, "room").await {
        ServerFrame::Joined { snapshot: Some(ops), peer_count, .. } => {
            assert_eq!(peer_count, 2);
            assert_eq!(ops.len(), 2);
            assert_eq!(ops[0].author_id, "alice");
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn test_request_snapshot_answered_by_relay() {
    let url = start_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    join(&mut a, "room").await;
    let alice = Identity::new("alice");
    send(&mut a, &ClientFrame::Publish { envelope: stroke("room", &alice) }).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    join(&mut b, "room").await;

    let bob = Identity::new("bob");
    let request = Envelope::new("room", &bob, Role::Viewer, Message::RequestSnapshot);
    send(&mut b, &ClientFrame::Publish { envelope: request }).await;

    match next_frame(&mut b).await {
        Some(ServerFrame::Deliver { envelope }) => {
            assert_eq!(envelope.sender_role, Role::Host);
            match envelope.message {
                Message::Snapshot { operations, target } => {
                    assert_eq!(target, Some(bob.session_id));
                    assert_eq!(operations.as_array().map(Vec::len), Some(1));
                }
                other => panic!("unexpected message {:?}", other),
            }
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_before_join_is_rejected() {
    let url = start_server().await;
    let mut a = connect(&url).await;
    let alice = Identity::new("alice");
    send(&mut a, &ClientFrame::Publish { envelope: stroke("room", &alice) }).await;
    assert!(matches!(next_frame(&mut a).await, Some(ServerFrame::Error { .. })));
}
