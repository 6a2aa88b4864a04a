//! Bridge message definitions for termhost.
//!
//! Requests flow from the display surface into the host; events flow from
//! the host back to the display surface. Every message is a JSON object
//! tagged by a snake_case `type` field. Byte payloads travel as standard
//! base64 because PTY chunk boundaries can split UTF-8 sequences.

use serde::{Deserialize, Serialize};

/// Opaque session identifier as it appears on the wire.
pub type SessionId = String;

/// Requests sent by the display surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Spawn a new shell session.
    Create(CreateSession),
    /// Send input bytes to a session.
    Write(WriteInput),
    /// Change a session's terminal size.
    Resize(ResizeSession),
    /// Terminate a session.
    Kill(KillSession),
}

/// Events sent to the display surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Reply to a successful `create` request.
    Created(SessionCreated),
    /// A chunk of session output.
    Data(SessionData),
    /// The session's process has exited. Always the last event for an id.
    Exit(SessionExit),
    /// A request failed, or a line could not be decoded.
    Error(ErrorMessage),
}

// ============================================================================
// Requests
// ============================================================================

/// Request to create a new shell session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSession {
    /// Correlation number echoed in the reply.
    pub seq: u64,
    /// Initial terminal columns.
    pub cols: u16,
    /// Initial terminal rows.
    pub rows: u16,
}

/// Input for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteInput {
    /// Target session.
    pub id: SessionId,
    /// Raw input bytes.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Terminal resize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeSession {
    /// Target session.
    pub id: SessionId,
    /// New column count.
    pub cols: u16,
    /// New row count.
    pub rows: u16,
}

/// Request to terminate a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSession {
    /// Target session.
    pub id: SessionId,
}

// ============================================================================
// Events
// ============================================================================

/// Reply confirming session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCreated {
    /// `seq` of the originating `create` request.
    pub seq: u64,
    /// Identifier of the new session.
    pub id: SessionId,
}

/// Output produced by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Source session.
    pub id: SessionId,
    /// Raw output bytes.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Session exit notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExit {
    /// The session that exited.
    pub id: SessionId,
}

/// Error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// `seq` of the failed request, if the failure is tied to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Human-readable description.
    pub message: String,
}

impl Event {
    /// Builds the reply to a successful create.
    pub fn created(seq: u64, id: impl Into<SessionId>) -> Self {
        Event::Created(SessionCreated { seq, id: id.into() })
    }

    /// Builds a data event.
    pub fn data(id: impl Into<SessionId>, data: Vec<u8>) -> Self {
        Event::Data(SessionData {
            id: id.into(),
            data,
        })
    }

    /// Builds an exit event.
    pub fn exit(id: impl Into<SessionId>) -> Self {
        Event::Exit(SessionExit { id: id.into() })
    }

    /// Builds an error event.
    pub fn error(seq: Option<u64>, message: impl Into<String>) -> Self {
        Event::Error(ErrorMessage {
            seq,
            message: message.into(),
        })
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
