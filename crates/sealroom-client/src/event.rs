//! Session events and actions.

use sealroom_core::DecryptedMessage;
use sealroom_crypto::{PrivateKey, PublicKey};
use sealroom_proto::Envelope;

use crate::error::SessionError;

/// Caller-assigned identifier correlating a send with its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SendId(pub u64);

/// Events the caller feeds into the session.
///
/// The caller is responsible for:
/// - Receiving envelopes from the relay
/// - Forwarding application intents (send room message, send DM)
/// - Performing the key directory lookups the session asks for
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Envelope received from the relay.
    EnvelopeReceived(Envelope),

    /// Application wants to broadcast to a room.
    SendRoomMessage {
        /// Correlation id for the outcome.
        id: SendId,
        /// Target room.
        room: String,
        /// Message text.
        text: String,
    },

    /// Application wants to send a direct message.
    SendDirectMessage {
        /// Correlation id for the outcome.
        id: SendId,
        /// Recipient username.
        peer: String,
        /// Message text.
        text: String,
    },

    /// A lookup requested by [`SessionAction::ResolvePeerKey`] succeeded.
    PeerKeyResolved {
        /// Peer that was looked up.
        peer: String,
        /// The peer's public key.
        public_key: PublicKey,
    },

    /// A lookup requested by [`SessionAction::ResolvePeerKey`] failed.
    PeerKeyUnavailable {
        /// Peer that was looked up.
        peer: String,
        /// Why the lookup failed.
        reason: String,
    },

    /// Key provisioning finished; the private key is now available.
    ///
    /// DMs buffered while the key was missing are replayed.
    PrivateKeyLoaded(PrivateKey),
}

/// Actions the session produces for the caller to execute.
#[derive(Debug, Clone)]
pub enum SessionAction<I> {
    /// Hand this envelope to the transport.
    Send(Envelope),

    /// Surface an admitted message to the application.
    Deliver(DecryptedMessage<I>),

    /// Look up a peer's public key and report back with
    /// [`SessionEvent::PeerKeyResolved`] or
    /// [`SessionEvent::PeerKeyUnavailable`].
    ResolvePeerKey {
        /// Peer to look up.
        peer: String,
    },

    /// The send was encrypted and handed over via [`SessionAction::Send`].
    SendCompleted {
        /// Correlation id of the send.
        id: SendId,
    },

    /// The send could not be completed.
    SendFailed {
        /// Correlation id of the send.
        id: SendId,
        /// Why it failed.
        error: SessionError,
    },

    /// No private key is loaded. Account key provisioning must run before
    /// inbound DMs can be read.
    KeyProvisioningNeeded {
        /// Reason provisioning is needed.
        reason: String,
    },

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
