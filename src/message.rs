//! Message protocol definitions
//!
//! The `ChatMessage` value carried by every frame, its closed set of
//! kinds, and the mapping from application errors to ERROR_RESPONSE
//! messages sent back to clients.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::AppError;

/// Protocol version stamped on server-authored messages
pub const PROTOCOL_VERSION: &str = "1.0";

/// Sender name used for server-authored messages (welcome, notices, errors)
pub const SERVER_SENDER: &str = "server";

/// Message kind (closed enumeration)
///
/// Wire identifiers are the case-sensitive SCREAMING_SNAKE_CASE names;
/// anything else fails decoding with `UnknownKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    LoginRequest,
    LoginResponse,
    JoinRoomRequest,
    TextMessage,
    PrivateMessage,
    UserListRequest,
    ErrorResponse,
}

impl MessageKind {
    /// Wire identifier for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::LoginRequest => "LOGIN_REQUEST",
            MessageKind::LoginResponse => "LOGIN_RESPONSE",
            MessageKind::JoinRoomRequest => "JOIN_ROOM_REQUEST",
            MessageKind::TextMessage => "TEXT_MESSAGE",
            MessageKind::PrivateMessage => "PRIVATE_MESSAGE",
            MessageKind::UserListRequest => "USER_LIST_REQUEST",
            MessageKind::ErrorResponse => "ERROR_RESPONSE",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOGIN_REQUEST" => Ok(MessageKind::LoginRequest),
            "LOGIN_RESPONSE" => Ok(MessageKind::LoginResponse),
            "JOIN_ROOM_REQUEST" => Ok(MessageKind::JoinRoomRequest),
            "TEXT_MESSAGE" => Ok(MessageKind::TextMessage),
            "PRIVATE_MESSAGE" => Ok(MessageKind::PrivateMessage),
            "USER_LIST_REQUEST" => Ok(MessageKind::UserListRequest),
            "ERROR_RESPONSE" => Ok(MessageKind::ErrorResponse),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat protocol message
///
/// Immutable value; `recipient`, `room` and `content` are optional and
/// encoded as explicit nulls on the wire. `sender` is optional because a
/// client that has not logged in may omit it (login validation checks it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub kind: MessageKind,
    pub version: String,
    /// Unix timestamp, second precision
    pub timestamp: i64,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub room: Option<String>,
    pub content: Option<String>,
}

impl ChatMessage {
    /// Current Unix time in seconds
    pub fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    /// Build a client-authored message (mostly used by tests and clients)
    pub fn new(kind: MessageKind, sender: Option<String>) -> Self {
        Self {
            kind,
            version: PROTOCOL_VERSION.to_string(),
            timestamp: Self::now(),
            sender,
            recipient: None,
            room: None,
            content: None,
        }
    }

    /// LOGIN_RESPONSE welcoming a freshly authenticated user
    pub fn login_response(username: &str) -> Self {
        Self {
            kind: MessageKind::LoginResponse,
            version: PROTOCOL_VERSION.to_string(),
            timestamp: Self::now(),
            sender: Some(SERVER_SENDER.to_string()),
            recipient: Some(username.to_string()),
            room: None,
            content: Some(format!("Welcome {}!", username)),
        }
    }

    /// Server-authored room notice (e.g. "<user> joined the room.")
    pub fn room_notice(room: &str, content: String) -> Self {
        Self {
            kind: MessageKind::TextMessage,
            version: PROTOCOL_VERSION.to_string(),
            timestamp: Self::now(),
            sender: Some(SERVER_SENDER.to_string()),
            recipient: None,
            room: Some(room.to_string()),
            content: Some(content),
        }
    }

    /// Re-stamped broadcast copy of a client TEXT_MESSAGE: the sender is
    /// overwritten with the authenticated username and the timestamp is
    /// refreshed, so clients cannot spoof either.
    pub fn restamped_text(username: &str, room: &str, content: Option<String>) -> Self {
        Self {
            kind: MessageKind::TextMessage,
            version: PROTOCOL_VERSION.to_string(),
            timestamp: Self::now(),
            sender: Some(username.to_string()),
            recipient: None,
            room: Some(room.to_string()),
            content,
        }
    }

    /// Re-stamped direct copy of a client PRIVATE_MESSAGE
    pub fn restamped_private(username: &str, recipient: &str, content: Option<String>) -> Self {
        Self {
            kind: MessageKind::PrivateMessage,
            version: PROTOCOL_VERSION.to_string(),
            timestamp: Self::now(),
            sender: Some(username.to_string()),
            recipient: Some(recipient.to_string()),
            room: None,
            content,
        }
    }

    /// Reply to USER_LIST_REQUEST: comma-joined list of active usernames.
    ///
    /// Reuses the USER_LIST_REQUEST kind since the enumeration carries no
    /// dedicated response kind.
    pub fn user_list(recipient: &str, usernames: &[String]) -> Self {
        Self {
            kind: MessageKind::UserListRequest,
            version: PROTOCOL_VERSION.to_string(),
            timestamp: Self::now(),
            sender: Some(SERVER_SENDER.to_string()),
            recipient: Some(recipient.to_string()),
            room: None,
            content: Some(usernames.join(", ")),
        }
    }
}

/// Convert an AppError to an ERROR_RESPONSE for client notification
///
/// Only protocol-rule variants are normally converted (fatal errors close
/// the connection instead), but the mapping is total: any error's display
/// text becomes the content.
impl From<&AppError> for ChatMessage {
    fn from(err: &AppError) -> Self {
        Self {
            kind: MessageKind::ErrorResponse,
            version: PROTOCOL_VERSION.to_string(),
            timestamp: Self::now(),
            sender: Some(SERVER_SENDER.to_string()),
            recipient: None,
            room: None,
            content: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            MessageKind::LoginRequest,
            MessageKind::LoginResponse,
            MessageKind::JoinRoomRequest,
            MessageKind::TextMessage,
            MessageKind::PrivateMessage,
            MessageKind::UserListRequest,
            MessageKind::ErrorResponse,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_kind_is_case_sensitive() {
        assert!("login_request".parse::<MessageKind>().is_err());
        assert!("TEXT".parse::<MessageKind>().is_err());
    }

    #[test]
    fn test_login_response_content() {
        let msg = ChatMessage::login_response("alice");
        assert_eq!(msg.kind, MessageKind::LoginResponse);
        assert_eq!(msg.content.as_deref(), Some("Welcome alice!"));
        assert_eq!(msg.recipient.as_deref(), Some("alice"));
    }

    #[test]
    fn test_error_response_carries_display_text() {
        let err = AppError::UserNotFound("bob".to_string());
        let msg = ChatMessage::from(&err);
        assert_eq!(msg.kind, MessageKind::ErrorResponse);
        assert_eq!(msg.content.as_deref(), Some("User not found: bob"));
    }

    #[test]
    fn test_user_list_joins_with_comma() {
        let users = vec!["alice".to_string(), "bob".to_string()];
        let msg = ChatMessage::user_list("alice", &users);
        assert_eq!(msg.content.as_deref(), Some("alice, bob"));
    }
}
