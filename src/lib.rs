//! Secure Multi-Room Chat Server Library
//!
//! A TLS chat server routing structured messages between named users and
//! rooms over a length-prefixed JSON wire protocol.
//!
//! # Features
//! - Login with at-most-one active session per username (first name wins)
//! - Lazily created named rooms with join/leave and broadcast
//! - Private (direct) messages between users
//! - User list queries
//! - Explicit error responses for every protocol-rule violation
//!
//! # Architecture
//! One tokio task per connection, reading frames strictly in order. Two
//! shared registries (sessions, rooms) are passed to every handler and
//! synchronized internally; outbound writes go through a per-connection
//! writer task so no lock is held across network I/O.
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use secure_chat_server::ChatServer;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8444").await?;
//!     let server = ChatServer::new();
//!     server.serve(listener, None).await
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod message;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use codec::{decode, encode, read_frame, write_frame, MAX_BODY_LEN};
pub use error::{AppError, CodecError, SendError};
pub use handler::handle_connection;
pub use message::{ChatMessage, MessageKind, PROTOCOL_VERSION};
pub use room::{Room, RoomRegistry};
pub use server::ChatServer;
pub use session::{Session, SessionRegistry};
pub use types::ConnectionId;
