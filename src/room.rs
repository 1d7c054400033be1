//! Room and room registry
//!
//! A `Room` is a named set of member sessions that receive each other's
//! broadcasts. Rooms are created lazily on first join and never destroyed;
//! a room whose last member leaves stays registered with an empty member
//! set (accepted behavior, not cleaned up).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::message::ChatMessage;
use crate::session::Session;

/// Named chat room
///
/// Membership is keyed by username; a session belongs to at most one room
/// at a time (the handler moves it out of the previous room on join).
#[derive(Debug)]
pub struct Room {
    pub name: String,
    members: RwLock<HashMap<String, Arc<Session>>>,
}

impl Room {
    pub fn new(name: String) -> Self {
        Self {
            name,
            members: RwLock::new(HashMap::new()),
        }
    }

    /// Add a session to this room and point its current room here
    pub async fn join(&self, session: &Arc<Session>) {
        self.members
            .write()
            .await
            .insert(session.username.clone(), Arc::clone(session));
        session.set_current_room(Some(self.name.clone())).await;
    }

    /// Remove a session from this room
    ///
    /// Clears the session's current-room pointer only if it still points
    /// here, so a join-elsewhere-then-leave sequence cannot clobber it.
    pub async fn leave(&self, session: &Arc<Session>) {
        self.members.write().await.remove(&session.username);
        if session.current_room().await.as_deref() == Some(self.name.as_str()) {
            session.set_current_room(None).await;
        }
    }

    /// Send a message to every current member
    ///
    /// Membership is snapshotted under the lock and the lock released
    /// before any send, so a slow or broken member connection never holds
    /// up joins or leaves. Per-member failures are logged and skipped.
    pub async fn broadcast(&self, msg: &ChatMessage) {
        let members: Vec<Arc<Session>> = self.members.read().await.values().cloned().collect();
        for member in members {
            if let Err(e) = member.send(msg.clone()).await {
                warn!(
                    "failed to deliver to '{}' in room '{}': {}",
                    member.username, self.name, e
                );
            }
        }
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.members.read().await.contains_key(username)
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }
}

/// Registry of rooms: name → room
///
/// `get_or_create` hands out the single authoritative `Arc<Room>` per
/// name; concurrent calls for the same name never produce two rooms.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, name: &str) -> Arc<Room> {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(name) {
            return Arc::clone(room);
        }
        let room = Arc::new(Room::new(name.to_string()));
        rooms.insert(name.to_string(), Arc::clone(&room));
        debug!("created room '{}' ({} total)", name, rooms.len());
        room
    }

    pub async fn lookup(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use tokio::sync::mpsc;

    fn session(name: &str) -> (Arc<Session>, mpsc::Receiver<ChatMessage>) {
        let (tx, rx) = mpsc::channel(32);
        (Arc::new(Session::new(name.to_string(), tx)), rx)
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let room = Room::new("general".to_string());
        let (alice, _rx) = session("alice");

        room.join(&alice).await;
        assert!(room.contains("alice").await);
        assert_eq!(alice.current_room().await.as_deref(), Some("general"));

        room.leave(&alice).await;
        assert!(!room.contains("alice").await);
        assert!(alice.current_room().await.is_none());
    }

    #[tokio::test]
    async fn test_leave_does_not_clobber_new_room_pointer() {
        let old_room = Room::new("room1".to_string());
        let new_room = Room::new("room2".to_string());
        let (alice, _rx) = session("alice");

        old_room.join(&alice).await;
        new_room.join(&alice).await;
        old_room.leave(&alice).await;

        assert_eq!(alice.current_room().await.as_deref(), Some("room2"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members_once() {
        let room = Room::new("general".to_string());
        let (alice, mut alice_rx) = session("alice");
        let (bob, mut bob_rx) = session("bob");
        room.join(&alice).await;
        room.join(&bob).await;

        let msg = ChatMessage::restamped_text("alice", "general", Some("hi".to_string()));
        room.broadcast(&msg).await;

        assert_eq!(alice_rx.recv().await.unwrap().content.as_deref(), Some("hi"));
        assert_eq!(bob_rx.recv().await.unwrap().content.as_deref(), Some("hi"));
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_skips_broken_member() {
        let room = Room::new("general".to_string());
        let (alice, mut alice_rx) = session("alice");
        let (bob, bob_rx) = session("bob");
        room.join(&alice).await;
        room.join(&bob).await;
        drop(bob_rx); // bob's writer is gone

        let msg = ChatMessage::new(MessageKind::TextMessage, Some("server".to_string()));
        room.broadcast(&msg).await;

        // alice still gets the message despite bob's dead channel
        assert!(alice_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_empty_room_persists_after_last_leave() {
        let registry = RoomRegistry::new();
        let (alice, _rx) = session("alice");

        let room = registry.get_or_create("general").await;
        room.join(&alice).await;
        room.leave(&alice).await;

        assert_eq!(room.member_count().await, 0);
        assert!(registry.lookup("general").await.is_some());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_instance() {
        let registry = RoomRegistry::new();
        let a = registry.get_or_create("general").await;
        let b = registry.get_or_create("general").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_single_instance() {
        let registry = Arc::new(RoomRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(
                async move { registry.get_or_create("general").await },
            ));
        }
        let first = handles.remove(0).await.unwrap();
        for handle in handles {
            assert!(Arc::ptr_eq(&first, &handle.await.unwrap()));
        }
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_joins_and_broadcasts() {
        let registry = Arc::new(RoomRegistry::new());
        let room = registry.get_or_create("general").await;

        let mut receivers = Vec::new();
        let mut joins = Vec::new();
        for i in 0..8 {
            let (s, rx) = session(&format!("user{}", i));
            receivers.push(rx);
            let room = Arc::clone(&room);
            joins.push(tokio::spawn(async move { room.join(&s).await }));
        }
        for join in joins {
            join.await.unwrap();
        }
        assert_eq!(room.member_count().await, 8);

        let mut broadcasts = Vec::new();
        for _ in 0..4 {
            let room = Arc::clone(&room);
            broadcasts.push(tokio::spawn(async move {
                let msg = ChatMessage::restamped_text("server", "general", Some("tick".to_string()));
                room.broadcast(&msg).await;
            }));
        }
        for broadcast in broadcasts {
            broadcast.await.unwrap();
        }

        // Every member present at snapshot time got every broadcast
        for rx in receivers.iter_mut() {
            for _ in 0..4 {
                assert!(rx.recv().await.is_some());
            }
        }
    }
}
