//! Transport abstraction and an in-process room hub.
//!
//! A [`Transport`] is a room-scoped publish/subscribe channel. Sending is
//! fire-and-forget; received envelopes are collected and polled.

use crate::error::TransportError;
use crate::protocol::Envelope;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A room-scoped channel carrying [`Envelope`]s.
pub trait Transport {
    /// Publish to the room. Errors mean the message was dropped; there is no
    /// retry or offline queue.
    fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Drain envelopes delivered since the last poll (non-blocking).
    fn poll(&mut self) -> Vec<Envelope>;

    fn is_connected(&self) -> bool {
        true
    }
}

type Inbox = Arc<Mutex<VecDeque<Envelope>>>;

#[derive(Default)]
struct HubState {
    rooms: HashMap<String, Vec<(usize, Inbox)>>,
    next_member: usize,
}

/// In-memory room bus for tests and single-process use.
///
/// Every member of a room receives every envelope published to it, including
/// the sender, so origin-echo suppression is exercised.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    /// Create a new empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room and get a transport bound to it.
    pub fn join(&self, room: &str) -> MemoryTransport {
        let inbox: Inbox = Arc::new(Mutex::new(VecDeque::new()));
        let member = match self.state.lock() {
            Ok(mut state) => {
                let member = state.next_member;
                state.next_member += 1;
                state
                    .rooms
                    .entry(room.to_string())
                    .or_default()
                    .push((member, inbox.clone()));
                member
            }
            Err(e) => {
                log::error!("MemoryHub lock poisoned on join: {}", e);
                usize::MAX
            }
        };
        MemoryTransport {
            hub: self.clone(),
            room: room.to_string(),
            member,
            inbox,
            connected: true,
        }
    }

    /// Number of members currently in a room.
    pub fn member_count(&self, room: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.rooms.get(room).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn publish(&self, room: &str, wire: &str) -> Result<(), TransportError> {
        let state = self
            .state
            .lock()
            .map_err(|e| TransportError::Send(format!("Lock error: {}", e)))?;
        let Some(members) = state.rooms.get(room) else {
            return Ok(());
        };
        for (_, inbox) in members {
            // Decode per recipient so no two members share a value.
            let envelope = Envelope::from_json(wire)?;
            if let Ok(mut queue) = inbox.lock() {
                queue.push_back(envelope);
            }
        }
        Ok(())
    }

    fn leave(&self, room: &str, member: usize) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(members) = state.rooms.get_mut(room) {
                members.retain(|(id, _)| *id != member);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
    }
}

/// A member's handle on a [`MemoryHub`] room.
pub struct MemoryTransport {
    hub: MemoryHub,
    room: String,
    member: usize,
    inbox: Inbox,
    connected: bool,
}

impl MemoryTransport {
    /// Leave the room. Later sends fail and nothing more is delivered.
    pub fn disconnect(&mut self) {
        if self.connected {
            self.hub.leave(&self.room, self.member);
            self.connected = false;
        }
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let wire = envelope.to_json()?;
        self.hub.publish(&self.room, &wire)
    }

    fn poll(&mut self) -> Vec<Envelope> {
        match self.inbox.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Identity, Role};
    use crate::protocol::Message;

    fn envelope(room: &str) -> Envelope {
        Envelope::new(room, &Identity::new("t"), Role::Host, Message::RequestSnapshot)
    }

    #[test]
    fn test_delivers_to_all_members_including_sender() {
        let hub = MemoryHub::new();
        let mut a = hub.join("r");
        let mut b = hub.join("r");
        let mut other = hub.join("elsewhere");

        a.send(&envelope("r")).unwrap();
        assert_eq!(a.poll().len(), 1);
        assert_eq!(b.poll().len(), 1);
        assert!(other.poll().is_empty());
        // Drained
        assert!(b.poll().is_empty());
    }

    #[test]
    fn test_disconnect_drops_sends() {
        let hub = MemoryHub::new();
        let mut a = hub.join("r");
        let mut b = hub.join("r");
        assert_eq!(hub.member_count("r"), 2);

        a.disconnect();
        assert!(!a.is_connected());
        assert!(matches!(a.send(&envelope("r")), Err(TransportError::NotConnected)));
        assert!(b.poll().is_empty());
        assert_eq!(hub.member_count("r"), 1);
    }

    #[test]
    fn test_drop_leaves_room() {
        let hub = MemoryHub::new();
        {
            let _a = hub.join("r");
            assert_eq!(hub.member_count("r"), 1);
        }
        assert_eq!(hub.member_count("r"), 0);
    }
}
