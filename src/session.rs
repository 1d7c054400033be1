//! Session and session registry
//!
//! A `Session` is the server-side state for one authenticated connection:
//! the username, the outbound message channel (feeding the connection's
//! writer task) and the current room pointer. The `SessionRegistry` maps
//! usernames to sessions and enforces at most one active session per
//! username, which is the whole authentication rule.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::error::{AppError, SendError};
use crate::message::ChatMessage;

/// State for one authenticated connection
#[derive(Debug)]
pub struct Session {
    /// Unique key into the session registry
    pub username: String,
    /// Session → writer-task message channel
    sender: mpsc::Sender<ChatMessage>,
    /// Room joined most recently, if any
    current_room: RwLock<Option<String>>,
}

impl Session {
    pub fn new(username: String, sender: mpsc::Sender<ChatMessage>) -> Self {
        Self {
            username,
            sender,
            current_room: RwLock::new(None),
        }
    }

    /// Queue a message for this session's connection
    ///
    /// Returns an error if the writer task is gone (client disconnected).
    /// Callers log and continue; a broken recipient never aborts dispatch.
    pub async fn send(&self, msg: ChatMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    pub async fn current_room(&self) -> Option<String> {
        self.current_room.read().await.clone()
    }

    pub async fn set_current_room(&self, room: Option<String>) {
        *self.current_room.write().await = room;
    }
}

/// Registry of active sessions: username → session
///
/// Shared by every connection handler. The map lock is held only for the
/// map operation itself, never across network sends.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a username and create its session
    ///
    /// Fails with `UsernameTaken` if the username already has an active
    /// session. Check and insert happen under one write lock, so two
    /// concurrent logins with the same name cannot both succeed.
    pub async fn register(
        &self,
        username: &str,
        sender: mpsc::Sender<ChatMessage>,
    ) -> Result<Arc<Session>, AppError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(username) {
            return Err(AppError::UsernameTaken(username.to_string()));
        }
        let session = Arc::new(Session::new(username.to_string(), sender));
        sessions.insert(username.to_string(), Arc::clone(&session));
        debug!("registered session for '{}' ({} active)", username, sessions.len());
        Ok(session)
    }

    pub async fn lookup(&self, username: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(username).cloned()
    }

    /// Remove a username's session; no-op if absent (idempotent)
    pub async fn unregister(&self, username: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(username).is_some() {
            debug!("unregistered session for '{}' ({} active)", username, sessions.len());
        }
    }

    /// All currently registered usernames
    pub async fn usernames(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);

        let session = registry.register("alice", tx).await.unwrap();
        assert_eq!(session.username, "alice");
        assert!(registry.lookup("alice").await.is_some());
        assert!(registry.lookup("bob").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let registry = SessionRegistry::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        registry.register("alice", tx1).await.unwrap();
        let err = registry.register("alice", tx2).await.unwrap_err();
        assert!(matches!(err, AppError::UsernameTaken(name) if name == "alice"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);

        registry.register("alice", tx).await.unwrap();
        registry.unregister("alice").await;
        registry.unregister("alice").await;
        assert!(registry.is_empty().await);

        // Username is free again after unregister
        let (tx2, _rx2) = mpsc::channel(8);
        assert!(registry.register("alice", tx2).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_register_same_name_single_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let (tx, _rx) = mpsc::channel(8);
            handles.push(tokio::spawn(async move {
                registry.register("alice", tx).await.is_ok()
            }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_session_send_reaches_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        let session = Session::new("alice".to_string(), tx);

        session
            .send(ChatMessage::new(MessageKind::TextMessage, None))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, MessageKind::TextMessage);
    }

    #[tokio::test]
    async fn test_session_send_after_writer_gone() {
        let (tx, rx) = mpsc::channel(8);
        let session = Session::new("alice".to_string(), tx);
        drop(rx);

        let err = session
            .send(ChatMessage::new(MessageKind::TextMessage, None))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_current_room_tracking() {
        let (tx, _rx) = mpsc::channel(8);
        let session = Session::new("alice".to_string(), tx);

        assert!(session.current_room().await.is_none());
        session.set_current_room(Some("general".to_string())).await;
        assert_eq!(session.current_room().await.as_deref(), Some("general"));
    }
}
