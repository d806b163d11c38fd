//! Caller-facing session handle.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use sealroom_client::{Conversation, DecryptedMessage, PeerState, SessionError};
use sealroom_crypto::PrivateKey;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Result of a send, delivered once the envelope reaches the transport.
pub(crate) type SendReply = oneshot::Sender<Result<(), SessionError>>;

/// Requests from handles to the runtime task.
pub(crate) enum Command<I> {
    SendRoom { room: String, text: String, reply: SendReply },
    SendDirect { peer: String, text: String, reply: SendReply },
    History { conversation: Conversation, reply: oneshot::Sender<Vec<DecryptedMessage<I>>> },
    PeerState { peer: String, reply: oneshot::Sender<PeerState> },
    ProvidePrivateKey { key: PrivateKey, reply: oneshot::Sender<()> },
    Shutdown,
}

/// Cloneable handle to a running session.
///
/// Every method is a request to the runtime task, which owns all session
/// state. Once the runtime has stopped, requests fail with
/// [`SessionError::Closed`].
#[derive(Debug)]
pub struct SessionHandle<I> {
    pub(crate) commands: mpsc::Sender<Command<I>>,
    pub(crate) messages: broadcast::Sender<DecryptedMessage<I>>,
    pub(crate) alive: Arc<AtomicBool>,
}

impl<I> Clone for SessionHandle<I> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            messages: self.messages.clone(),
            alive: Arc::clone(&self.alive),
        }
    }
}

impl<I> std::fmt::Debug for Command<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SendRoom { .. } => "SendRoom",
            Self::SendDirect { .. } => "SendDirect",
            Self::History { .. } => "History",
            Self::PeerState { .. } => "PeerState",
            Self::ProvidePrivateKey { .. } => "ProvidePrivateKey",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl<I: Clone + Send + 'static> SessionHandle<I> {
    /// Encrypt `text` under the RoomKey and broadcast it to `room`.
    ///
    /// Resolves once the envelope is handed to the transport. The message is
    /// surfaced to subscribers when the relay echoes it back.
    pub async fn send_room_message(
        &self,
        room: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SendRoom { room: room.into(), text: text.into(), reply }).await?;
        rx.await.unwrap_or(Err(SessionError::Closed))
    }

    /// Encrypt `text` for `peer` and send it.
    ///
    /// Resolves once the peer's public key has been looked up and the
    /// envelope handed to the transport, or fails with `PeerKeyUnavailable`.
    pub async fn send_direct_message(
        &self,
        peer: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SendDirect { peer: peer.into(), text: text.into(), reply }).await?;
        rx.await.unwrap_or(Err(SessionError::Closed))
    }

    /// Subscribe to admitted messages.
    ///
    /// Only messages admitted after subscribing are received; use
    /// [`Self::history`] for earlier ones.
    pub fn subscribe(&self) -> broadcast::Receiver<DecryptedMessage<I>> {
        self.messages.subscribe()
    }

    /// Admitted messages of one conversation, in admission order.
    pub async fn history(
        &self,
        conversation: Conversation,
    ) -> Result<Vec<DecryptedMessage<I>>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::History { conversation, reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// DM session state for `peer`.
    pub async fn peer_state(&self, peer: impl Into<String>) -> Result<PeerState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::PeerState { peer: peer.into(), reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Supply the private key after provisioning ran; buffered DMs replay.
    pub async fn provide_private_key(&self, key: PrivateKey) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::ProvidePrivateKey { key, reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stop the session.
    ///
    /// Lookups still in flight are discarded when they complete.
    pub async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Shutdown).await;
    }

    /// False once shutdown was requested or the runtime stopped.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.commands.is_closed()
    }

    async fn request(&self, command: Command<I>) -> Result<(), SessionError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        self.commands.send(command).await.map_err(|_| SessionError::Closed)
    }
}
