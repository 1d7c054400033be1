//! Wire codec: length-prefixed JSON frames
//!
//! Every protocol message travels as `[4-byte big-endian u32 length]`
//! followed by exactly that many bytes of a UTF-8 JSON record. The record
//! is a flat object with the keys `kind`, `version`, `sender`,
//! `recipient`, `room`, `content` and `timestamp`; absent optional fields
//! are explicit JSON nulls. JSON keeps the format self-describing and
//! human-inspectable, and serde_json handles delimiter escaping inside
//! `content`.
//!
//! `decode` works on byte slices; `read_frame`/`write_frame` are the async
//! counterparts used by the connection handler.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CodecError;
use crate::message::{ChatMessage, MessageKind, PROTOCOL_VERSION};

/// Maximum accepted body length in bytes. Frames declaring more are a
/// protocol violation and the connection is dropped.
pub const MAX_BODY_LEN: usize = 64 * 1024;

/// Length prefix size in bytes
const PREFIX_LEN: usize = 4;

/// On-the-wire shape of a message
///
/// `kind` stays a plain string here so an unrecognized identifier is
/// reported as `UnknownKind` instead of a generic parse failure.
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    kind: String,
    version: Option<String>,
    sender: Option<String>,
    recipient: Option<String>,
    room: Option<String>,
    content: Option<String>,
    timestamp: Option<i64>,
}

impl From<&ChatMessage> for WireRecord {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            kind: msg.kind.as_str().to_string(),
            version: Some(msg.version.clone()),
            sender: msg.sender.clone(),
            recipient: msg.recipient.clone(),
            room: msg.room.clone(),
            content: msg.content.clone(),
            timestamp: Some(msg.timestamp),
        }
    }
}

impl TryFrom<WireRecord> for ChatMessage {
    type Error = CodecError;

    fn try_from(rec: WireRecord) -> Result<Self, CodecError> {
        let kind: MessageKind = rec
            .kind
            .parse()
            .map_err(|_| CodecError::UnknownKind(rec.kind.clone()))?;
        Ok(ChatMessage {
            kind,
            version: rec.version.unwrap_or_else(|| PROTOCOL_VERSION.to_string()),
            timestamp: rec.timestamp.unwrap_or_default(),
            sender: rec.sender,
            recipient: rec.recipient,
            room: rec.room,
            content: rec.content,
        })
    }
}

/// Encode a message into one complete frame (prefix + body)
pub fn encode(msg: &ChatMessage) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_vec(&WireRecord::from(msg))
        .map_err(|e| CodecError::MalformedRecord(e.to_string()))?;
    if body.len() > MAX_BODY_LEN {
        return Err(CodecError::LengthOutOfRange(body.len()));
    }
    let mut frame = Vec::with_capacity(PREFIX_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode one complete frame from a byte slice
///
/// The slice must contain the whole frame; trailing bytes beyond the
/// declared length are ignored.
pub fn decode(bytes: &[u8]) -> Result<ChatMessage, CodecError> {
    if bytes.len() < PREFIX_LEN {
        return Err(CodecError::FrameTooShort);
    }
    let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if declared > MAX_BODY_LEN {
        return Err(CodecError::LengthOutOfRange(declared));
    }
    let available = bytes.len() - PREFIX_LEN;
    if available < declared {
        return Err(CodecError::BodyTruncated {
            expected: declared,
            actual: available,
        });
    }
    decode_body(&bytes[PREFIX_LEN..PREFIX_LEN + declared])
}

fn decode_body(body: &[u8]) -> Result<ChatMessage, CodecError> {
    let rec: WireRecord = serde_json::from_slice(body)
        .map_err(|e| CodecError::MalformedRecord(e.to_string()))?;
    rec.try_into()
}

/// Read one frame from the stream
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary. EOF
/// inside the prefix is `FrameTooShort`; EOF inside the body is
/// `BodyTruncated`. Both are fatal to the connection.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<ChatMessage>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];

    // First byte separately: zero bytes here is a graceful close.
    let n = reader.read(&mut prefix[..1]).await?;
    if n == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut prefix[1..])
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => CodecError::FrameTooShort,
            _ => CodecError::Io(e),
        })?;

    let declared = u32::from_be_bytes(prefix) as usize;
    if declared > MAX_BODY_LEN {
        return Err(CodecError::LengthOutOfRange(declared));
    }

    let mut body = vec![0u8; declared];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => CodecError::BodyTruncated {
                expected: declared,
                actual: 0,
            },
            _ => CodecError::Io(e),
        })?;

    decode_body(&body).map(Some)
}

/// Write one encoded frame to the stream and flush
pub async fn write_frame<W>(writer: &mut W, msg: &ChatMessage) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
