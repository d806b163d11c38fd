//! JSON event frames.
//!
//! Every message on the relay connection is one JSON object of the form
//! `{"event": "<name>", "data": {...}}`. Stream transports send one frame per
//! line, so an encoded frame never contains a raw newline.
//!
//! # Invariants
//!
//! - `decode(encode(f)) == f` for every valid frame
//! - `decode` never panics; oversized, malformed or invalid input is an error
//! - A decoded envelope frame has passed [`Envelope::validate`]

use serde::{Deserialize, Serialize};

use crate::{
    envelope::{DmEnvelope, Envelope, RoomEnvelope},
    errors::{ProtocolError, Result},
};

/// Maximum encoded frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// One event on the relay connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Frame {
    /// Announce the local username so the relay can route DMs to us.
    Join {
        /// Username of the connecting client
        username: String,
    },
    /// Room broadcast.
    RoomEnvelope(RoomEnvelope),
    /// Direct message.
    DmEnvelope(DmEnvelope),
}

impl Frame {
    /// Event name on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::RoomEnvelope(_) => "room-envelope",
            Self::DmEnvelope(_) => "dm-envelope",
        }
    }

    /// Encode as compact JSON bytes (no trailing newline).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))?;

        if bytes.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: bytes.len(), max: MAX_FRAME_SIZE });
        }

        Ok(bytes)
    }

    /// Decode and validate a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: bytes.len(), max: MAX_FRAME_SIZE });
        }

        let frame: Self =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        frame.validate()?;
        Ok(frame)
    }

    /// Check the invariants of the carried envelope.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Join { username } => {
                if username.trim().is_empty() {
                    return Err(ProtocolError::InvalidField {
                        field: "username",
                        reason: "must not be empty",
                    });
                }
                Ok(())
            },
            Self::RoomEnvelope(room) => room.validate(),
            Self::DmEnvelope(dm) => dm.validate(),
        }
    }

    /// The carried envelope, if this is an envelope frame.
    pub fn into_envelope(self) -> Option<Envelope> {
        match self {
            Self::Join { .. } => None,
            Self::RoomEnvelope(room) => Some(Envelope::Room(room)),
            Self::DmEnvelope(dm) => Some(Envelope::Dm(dm)),
        }
    }
}

/// Borrowed view with the same wire shape as the envelope variants of [`Frame`].
#[derive(Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum FrameRef<'a> {
    RoomEnvelope(&'a RoomEnvelope),
    DmEnvelope(&'a DmEnvelope),
}

impl Envelope {
    /// Size of this envelope once encoded as a [`Frame`], without the line
    /// terminator.
    ///
    /// # Errors
    ///
    /// - `FrameTooLarge`: the frame exceeds [`MAX_FRAME_SIZE`]; no transport
    ///   will carry it
    pub fn frame_len(&self) -> Result<usize> {
        let view = match self {
            Self::Room(room) => FrameRef::RoomEnvelope(room),
            Self::Dm(dm) => FrameRef::DmEnvelope(dm),
        };
        let size = serde_json::to_vec(&view)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?
            .len();

        if size > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size, max: MAX_FRAME_SIZE });
        }
        Ok(size)
    }
}

impl From<Envelope> for Frame {
    fn from(envelope: Envelope) -> Self {
        match envelope {
            Envelope::Room(room) => Self::RoomEnvelope(room),
            Envelope::Dm(dm) => Self::DmEnvelope(dm),
        }
    }
}
