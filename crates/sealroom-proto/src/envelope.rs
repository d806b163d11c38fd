//! Encrypted envelopes exchanged over the relay.
//!
//! Two variants with different trust models:
//!
//! - [`RoomEnvelope`]: encrypted under the shared RoomKey, broadcast to every
//!   room member. The key is implicit.
//! - [`DmEnvelope`]: encrypted under a per-peer session key that travels
//!   alongside, wrapped under the recipient's RSA public key.
//!
//! Field names serialize in camelCase and byte fields as JSON number arrays,
//! matching the browser clients on the same relay.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Size of the AES-GCM IV carried in every envelope.
pub const IV_LEN: usize = 12;

/// Smallest valid ciphertext: an empty plaintext still carries a 16-byte tag.
pub const MIN_CIPHERTEXT_LEN: usize = 16;

/// Envelope for broadcast room traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEnvelope {
    /// Room name the relay scopes the broadcast to
    pub room: String,
    /// Sender username
    pub sender: String,
    /// AES-GCM ciphertext with tag appended
    pub ciphertext: Vec<u8>,
    /// AES-GCM IV
    pub iv: [u8; IV_LEN],
}

/// Envelope for a direct message to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmEnvelope {
    /// Sender username
    pub sender: String,
    /// Recipient username; the relay delivers only to this user
    pub recipient: String,
    /// Session key wrapped under the recipient's public key (RSA-OAEP)
    pub wrapped_session_key: Vec<u8>,
    /// AES-GCM ciphertext with tag appended
    pub ciphertext: Vec<u8>,
    /// AES-GCM IV
    pub iv: [u8; IV_LEN],
}

/// Either envelope variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Room broadcast
    Room(RoomEnvelope),
    /// Direct message
    Dm(DmEnvelope),
}

impl Envelope {
    /// Username of the sender.
    pub fn sender(&self) -> &str {
        match self {
            Self::Room(room) => &room.sender,
            Self::Dm(dm) => &dm.sender,
        }
    }

    /// Check structural invariants the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Room(room) => room.validate(),
            Self::Dm(dm) => dm.validate(),
        }
    }
}

impl RoomEnvelope {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<()> {
        require_name("room", &self.room)?;
        require_name("sender", &self.sender)?;
        require_ciphertext(&self.ciphertext)
    }
}

impl DmEnvelope {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<()> {
        require_name("sender", &self.sender)?;
        require_name("recipient", &self.recipient)?;
        if self.wrapped_session_key.is_empty() {
            return Err(ProtocolError::InvalidField {
                field: "wrappedSessionKey",
                reason: "must not be empty",
            });
        }
        require_ciphertext(&self.ciphertext)
    }
}

impl From<RoomEnvelope> for Envelope {
    fn from(envelope: RoomEnvelope) -> Self {
        Self::Room(envelope)
    }
}

impl From<DmEnvelope> for Envelope {
    fn from(envelope: DmEnvelope) -> Self {
        Self::Dm(envelope)
    }
}

fn require_name(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ProtocolError::InvalidField { field, reason: "must not be empty" });
    }
    Ok(())
}

fn require_ciphertext(ciphertext: &[u8]) -> Result<()> {
    if ciphertext.len() < MIN_CIPHERTEXT_LEN {
        return Err(ProtocolError::InvalidField {
            field: "ciphertext",
            reason: "shorter than the authentication tag",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomEnvelope {
        RoomEnvelope {
            room: "general".into(),
            sender: "alice".into(),
            ciphertext: vec![0; 21],
            iv: [1; IV_LEN],
        }
    }

    fn dm() -> DmEnvelope {
        DmEnvelope {
            sender: "alice".into(),
            recipient: "bob".into(),
            wrapped_session_key: vec![9; 256],
            ciphertext: vec![0; 22],
            iv: [2; IV_LEN],
        }
    }

    #[test]
    fn valid_envelopes_pass() {
        assert!(Envelope::from(room()).validate().is_ok());
        assert!(Envelope::from(dm()).validate().is_ok());
    }

    #[test]
    fn empty_room_is_rejected() {
        let envelope = RoomEnvelope { room: "  ".into(), ..room() };
        assert_eq!(
            envelope.validate(),
            Err(ProtocolError::InvalidField { field: "room", reason: "must not be empty" })
        );
    }

    #[test]
    fn short_ciphertext_is_rejected() {
        let envelope = RoomEnvelope { ciphertext: vec![0; MIN_CIPHERTEXT_LEN - 1], ..room() };
        assert!(matches!(
            envelope.validate(),
            Err(ProtocolError::InvalidField { field: "ciphertext", .. })
        ));
    }

    #[test]
    fn dm_without_wrapped_key_is_rejected() {
        let envelope = DmEnvelope { wrapped_session_key: Vec::new(), ..dm() };
        assert!(matches!(
            envelope.validate(),
            Err(ProtocolError::InvalidField { field: "wrappedSessionKey", .. })
        ));
    }

    #[test]
    fn dm_without_recipient_is_rejected() {
        let envelope = DmEnvelope { recipient: String::new(), ..dm() };
        assert!(matches!(
            envelope.validate(),
            Err(ProtocolError::InvalidField { field: "recipient", .. })
        ));
    }

    #[test]
    fn sender_accessor() {
        assert_eq!(Envelope::from(room()).sender(), "alice");
        assert_eq!(Envelope::from(dm()).sender(), "alice");
    }
}
