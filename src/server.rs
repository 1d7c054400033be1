//! Chat server: registries and accept loop
//!
//! `ChatServer` owns the two shared registries and hands each accepted
//! connection to its own handler task. The accept loop never blocks on a
//! client's I/O; a failed TLS handshake or handler error only affects
//! that one connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::handler::handle_connection;
use crate::room::RoomRegistry;
use crate::session::SessionRegistry;
use crate::types::ConnectionId;

/// The chat server
///
/// Cloneable handles to the session and room registries are passed into
/// every connection handler; there is no ambient global state.
#[derive(Debug, Default)]
pub struct ChatServer {
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomRegistry>,
}

impl ChatServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared session registry handle
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    /// Shared room registry handle
    pub fn rooms(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.rooms)
    }

    /// Accept connections forever, one handler task per connection
    ///
    /// With an acceptor, each stream is TLS-terminated inside the
    /// connection's own task so a slow handshake cannot stall the accept
    /// loop. Without one, frames travel over plain TCP (local testing).
    pub async fn serve(
        &self,
        listener: TcpListener,
        acceptor: Option<TlsAcceptor>,
    ) -> std::io::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let conn_id = ConnectionId::new();
                    info!("connection {} accepted from {}", conn_id, addr);

                    let sessions = self.sessions();
                    let rooms = self.rooms();
                    let acceptor = acceptor.clone();

                    tokio::spawn(async move {
                        let result = match acceptor {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(tls_stream) => {
                                    handle_connection(tls_stream, conn_id, sessions, rooms).await
                                }
                                Err(e) => {
                                    warn!("TLS handshake failed for {}: {}", conn_id, e);
                                    return;
                                }
                            },
                            None => handle_connection(stream, conn_id, sessions, rooms).await,
                        };

                        if let Err(e) = result {
                            warn!("connection {} terminated: {}", conn_id, e);
                        }
                    });
                }
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                }
            }
        }
    }
}
