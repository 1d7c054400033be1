//! Error types for the chat server
//!
//! Defines framing/decoding errors, application-level errors and message
//! send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Frame decoding errors
///
/// Every variant except `Io` corresponds to a structural violation of the
/// wire format. All of them are fatal to the connection that produced the
/// bytes; none of them may affect any other connection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Fewer than 4 bytes available for the length prefix
    #[error("frame too short: no complete length prefix")]
    FrameTooShort,

    /// Declared body length exceeds the configured maximum
    #[error("declared length {0} exceeds maximum frame size")]
    LengthOutOfRange(usize),

    /// Stream ended before the declared number of body bytes arrived
    #[error("body truncated: expected {expected} bytes, got {actual}")]
    BodyTruncated { expected: usize, actual: usize },

    /// The kind field does not name an enumerated message kind
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// Any other structural violation (bad UTF-8, bad JSON, wrong types)
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// IO error while reading or writing a frame (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and protocol-rule
/// violations (reported back to the client as an ERROR_RESPONSE message).
/// The `Display` strings of the protocol-rule variants are exactly the
/// texts sent to clients.
#[derive(Debug, Error)]
pub enum AppError {
    /// Framing or decoding error (fatal)
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound channel to the writer task is broken (fatal)
    #[error("Channel send error")]
    ChannelSend,

    /// A non-login message arrived before authentication
    #[error("You must login first.")]
    LoginRequired,

    /// Login attempted with a missing or blank username
    #[error("Username must not be empty.")]
    UsernameRequired,

    /// Login attempted with a username that already has a session
    #[error("Username already in use: {0}")]
    UsernameTaken(String),

    /// Join attempted with a missing or blank room name
    #[error("Room name must not be empty.")]
    RoomNameRequired,

    /// Text message targeted a room that was never created
    #[error("Room does not exist: {0}")]
    RoomNotFound(String),

    /// Text message sent with no target room and no current room
    #[error("You are not in any room.")]
    NotInRoom,

    /// Private message with a missing or blank recipient
    #[error("Recipient is required for private message.")]
    RecipientRequired,

    /// Private message targeted a user with no active session
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Message kind has no handler in the authenticated state
    #[error("Unsupported message type: {0}")]
    UnsupportedKind(String),
}

impl AppError {
    /// Whether this error terminates the connection.
    ///
    /// Protocol-rule violations are reported to the client and the
    /// connection stays open; codec, IO and channel errors are fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Codec(_) | AppError::Io(_) | AppError::ChannelSend
        )
    }
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
