//! Connection handler
//!
//! One handler per accepted connection. The stream is split: the read
//! half stays with the handler loop (frames are processed strictly in
//! arrival order), the write half goes to a dedicated writer task fed by
//! an mpsc channel, so no registry or room lock is ever held across a
//! network write.
//!
//! Protocol state machine: a connection starts unauthenticated and only
//! accepts LOGIN_REQUEST; after a successful login it dispatches chat
//! messages until end-of-stream, a framing error or an I/O error, then
//! cleans up its session and room membership. Errors on one connection
//! never touch another.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::AppError;
use crate::message::{ChatMessage, MessageKind};
use crate::room::RoomRegistry;
use crate::session::{Session, SessionRegistry};
use crate::types::ConnectionId;

/// Buffer size for the per-connection outbound channel
const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Handle one client connection until it closes
///
/// Generic over the stream so TLS streams, plain TCP streams and
/// in-memory test streams all share this path. The stream must already be
/// fully established (TLS handshake done); this handler only ever sees
/// plaintext frames.
pub async fn handle_connection<S>(
    stream: S,
    conn_id: ConnectionId,
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomRegistry>,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut read_half, mut write_half) = tokio::io::split(stream);

    // Writer task: drains the outbound channel onto the stream. All sends
    // to this connection (own replies and other sessions' broadcasts) go
    // through this channel.
    let (out_tx, mut out_rx) = mpsc::channel::<ChatMessage>(OUTBOUND_BUFFER_SIZE);
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = codec::write_frame(&mut write_half, &msg).await {
                debug!("writer stopped for {}: {}", conn_id, e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut session: Option<Arc<Session>> = None;

    let result = loop {
        let msg = match codec::read_frame(&mut read_half).await {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                debug!("connection {} closed by peer", conn_id);
                break Ok(());
            }
            Err(e) => break Err(AppError::Codec(e)),
        };

        match &session {
            None => {
                if msg.kind == MessageKind::LoginRequest {
                    match login(&msg, &out_tx, &sessions).await {
                        Ok(s) => {
                            info!("user '{}' logged in on {}", s.username, conn_id);
                            session = Some(s);
                        }
                        Err(e) => {
                            // No session exists to keep open safely; report
                            // the failure and drop the connection.
                            send_error(&out_tx, &e, None).await;
                            info!("login failed on {}: {}", conn_id, e);
                            break Ok(());
                        }
                    }
                } else {
                    debug!("{} sent {} before login", conn_id, msg.kind);
                    send_error(&out_tx, &AppError::LoginRequired, None).await;
                }
            }
            Some(s) => {
                if let Err(e) = dispatch(s, msg, &sessions, &rooms).await {
                    if e.is_fatal() {
                        break Err(e);
                    }
                    debug!("protocol violation from '{}': {}", s.username, e);
                    send_error(&out_tx, &e, Some(&s.username)).await;
                }
            }
        }
    };

    // Cleanup: deregister and leave the current room. Runs on every exit
    // path, graceful or not.
    if let Some(session) = session {
        sessions.unregister(&session.username).await;
        if let Some(room_name) = session.current_room().await {
            if let Some(room) = rooms.lookup(&room_name).await {
                room.leave(&session).await;
            }
        }
        info!("session closed for user '{}'", session.username);
    }

    // Dropping the sender lets the writer drain queued frames and exit.
    drop(out_tx);
    let _ = writer.await;

    result
}

/// Validate a LOGIN_REQUEST and register the session
async fn login(
    msg: &ChatMessage,
    out_tx: &mpsc::Sender<ChatMessage>,
    sessions: &SessionRegistry,
) -> Result<Arc<Session>, AppError> {
    let username = match msg.sender.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(AppError::UsernameRequired),
    };

    let session = sessions.register(&username, out_tx.clone()).await?;
    if session
        .send(ChatMessage::login_response(&username))
        .await
        .is_err()
    {
        // Own writer is already gone; undo the registration.
        sessions.unregister(&username).await;
        return Err(AppError::ChannelSend);
    }
    Ok(session)
}

/// Dispatch one message from an authenticated session
///
/// Protocol-rule violations come back as recoverable errors; the caller
/// reports them to the client and keeps the connection open.
async fn dispatch(
    session: &Arc<Session>,
    msg: ChatMessage,
    sessions: &SessionRegistry,
    rooms: &RoomRegistry,
) -> Result<(), AppError> {
    match msg.kind {
        MessageKind::JoinRoomRequest => join_room(session, &msg, rooms).await,
        MessageKind::TextMessage => text_message(session, msg, rooms).await,
        MessageKind::PrivateMessage => private_message(session, msg, sessions).await,
        MessageKind::UserListRequest => user_list(session, sessions).await,
        other => Err(AppError::UnsupportedKind(other.to_string())),
    }
}

async fn join_room(
    session: &Arc<Session>,
    msg: &ChatMessage,
    rooms: &RoomRegistry,
) -> Result<(), AppError> {
    let room_name = match msg.room.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Err(AppError::RoomNameRequired),
    };

    let room = rooms.get_or_create(room_name).await;

    // A session is in at most one room: leave the previous one first.
    if let Some(previous) = session.current_room().await {
        if previous != room_name {
            if let Some(old_room) = rooms.lookup(&previous).await {
                old_room.leave(session).await;
            }
        }
    }

    room.join(session).await;
    info!("user '{}' joined room '{}'", session.username, room_name);

    let notice = ChatMessage::room_notice(
        room_name,
        format!("{} joined the room.", session.username),
    );
    room.broadcast(&notice).await;
    Ok(())
}

async fn text_message(
    session: &Arc<Session>,
    msg: ChatMessage,
    rooms: &RoomRegistry,
) -> Result<(), AppError> {
    // Target the named room if given, the current room otherwise.
    let room_name = match msg.room.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => session.current_room().await.ok_or(AppError::NotInRoom)?,
    };

    let room = rooms
        .lookup(&room_name)
        .await
        .ok_or_else(|| AppError::RoomNotFound(room_name.clone()))?;

    let broadcast = ChatMessage::restamped_text(&session.username, &room_name, msg.content);
    room.broadcast(&broadcast).await;
    Ok(())
}

async fn private_message(
    session: &Arc<Session>,
    msg: ChatMessage,
    sessions: &SessionRegistry,
) -> Result<(), AppError> {
    let recipient = match msg.recipient.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(AppError::RecipientRequired),
    };

    let target = sessions
        .lookup(&recipient)
        .await
        .ok_or_else(|| AppError::UserNotFound(recipient.clone()))?;

    let private = ChatMessage::restamped_private(&session.username, &recipient, msg.content);
    if let Err(e) = target.send(private).await {
        // Target is disconnecting; delivery failure is not the sender's
        // problem.
        warn!("failed to deliver private message to '{}': {}", recipient, e);
    }
    Ok(())
}

async fn user_list(session: &Arc<Session>, sessions: &SessionRegistry) -> Result<(), AppError> {
    let mut usernames = sessions.usernames().await;
    usernames.sort();
    let reply = ChatMessage::user_list(&session.username, &usernames);
    session.send(reply).await.map_err(|_| AppError::ChannelSend)
}

/// Queue an ERROR_RESPONSE on the connection's outbound channel
async fn send_error(out_tx: &mpsc::Sender<ChatMessage>, err: &AppError, recipient: Option<&str>) {
    let mut msg = ChatMessage::from(err);
    msg.recipient = recipient.map(str::to_string);
    if out_tx.send(msg).await.is_err() {
        debug!("could not report error, writer gone: {}", err);
    }
}
