//! Session runtime.
//!
//! One task owns the [`Session`] and is the only place session state is
//! mutated. It multiplexes three sources:
//!
//! - commands from [`SessionHandle`]s
//! - frames from the relay
//! - completed public-key lookups
//!
//! Lookups are the only work that runs concurrently with the dispatcher; their
//! results re-enter as ordinary session events. Encryption of an outbound
//! message therefore always happens before its send, and unwrap always happens
//! before decrypt, without any locks.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use sealroom_client::{
    DirectoryError, KeyDirectory, LocalKeyStore, SendId, Session, SessionAction, SessionConfig,
    SessionError, SessionEvent,
};
use sealroom_core::{DecryptedMessage, Environment};
use sealroom_crypto::PublicKey;
use sealroom_proto::Frame;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinSet,
};

use crate::{
    AppError, SessionHandle, Transport,
    handle::{Command, SendReply},
};

/// Queued handle requests.
const COMMAND_CAPACITY: usize = 64;

/// Admitted messages buffered per subscriber before it starts lagging.
const SUBSCRIBER_CAPACITY: usize = 256;

type Lookup = (String, Result<PublicKey, DirectoryError>);

/// Everything needed to start a session.
pub struct SessionSetup<E> {
    /// Clock and randomness.
    pub env: E,
    /// Local username, announced to the relay on connect.
    pub username: String,
    /// Derivation parameters and limits.
    pub config: SessionConfig,
    /// Source of the account's private key.
    pub key_store: Arc<dyn LocalKeyStore>,
    /// Public-key lookup service.
    pub directory: Arc<dyn KeyDirectory>,
    /// Connection to the relay.
    pub transport: Transport,
}

/// Create a session and the runtime that drives it.
///
/// Derives the RoomKey, loads the private key (if any) and announces the
/// username to the relay. The returned [`Runtime`] does nothing until
/// [`Runtime::run`] is awaited or spawned.
///
/// # Errors
///
/// - `Session(KeyDerivation)`: the RoomKey cannot be derived
/// - `KeyStore`: the key store exists but cannot be read
/// - `Transport`: the relay connection is already closed
pub async fn init_session<E: Environment>(
    setup: SessionSetup<E>,
) -> Result<(SessionHandle<E::Instant>, Runtime<E>), AppError> {
    let SessionSetup { env, username, config, key_store, directory, transport } = setup;

    let private_key = match key_store.load()? {
        Some(stored) => Some(stored.private_key()?),
        None => None,
    };

    let (session, actions) = Session::new(env, username.clone(), config, private_key)?;

    transport
        .outbound
        .send(Frame::Join { username: username.clone() })
        .await
        .map_err(|_| AppError::Transport { reason: "relay closed before join".to_string() })?;

    let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
    let (messages, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
    let alive = Arc::new(AtomicBool::new(true));

    let handle =
        SessionHandle { commands: commands_tx, messages: messages.clone(), alive: Arc::clone(&alive) };

    let mut runtime = Runtime {
        session,
        commands,
        transport,
        directory,
        lookups: JoinSet::new(),
        replies: HashMap::new(),
        next_send_id: 0,
        messages,
        alive,
    };

    // Setup actions are logs and provisioning notices only
    runtime.apply(actions).await?;
    tracing::info!(%username, "session initialized");

    Ok((handle, runtime))
}

/// Dispatcher owning the session state.
pub struct Runtime<E: Environment> {
    session: Session<E>,
    commands: mpsc::Receiver<Command<E::Instant>>,
    transport: Transport,
    directory: Arc<dyn KeyDirectory>,
    lookups: JoinSet<Lookup>,
    replies: HashMap<SendId, SendReply>,
    next_send_id: u64,
    messages: broadcast::Sender<DecryptedMessage<E::Instant>>,
    alive: Arc<AtomicBool>,
}

impl<E: Environment> Runtime<E> {
    /// Run until shutdown, until every handle is dropped, or until the
    /// transport closes.
    ///
    /// Sends still pending when the runtime stops fail with
    /// [`SessionError::Closed`], or [`SessionError::Transport`] if the relay
    /// connection is what ended it.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the relay connection closed or failed.
    pub async fn run(mut self) -> Result<(), AppError> {
        let result = self.dispatch().await;

        self.alive.store(false, Ordering::SeqCst);
        self.lookups.abort_all();

        let error = match &result {
            Err(AppError::Transport { reason }) => SessionError::Transport { reason: reason.clone() },
            _ => SessionError::Closed,
        };
        for (_, reply) in self.replies.drain() {
            let _ = reply.send(Err(error.clone()));
        }

        match &result {
            Ok(()) => tracing::info!(user = self.session.username(), "session stopped"),
            Err(e) => tracing::warn!(user = self.session.username(), error = %e, "session ended"),
        }
        result
    }

    async fn dispatch(&mut self) -> Result<(), AppError> {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return Ok(()),
                    Some(command) => self.handle_command(command).await?,
                },

                frame = self.transport.inbound.recv() => match frame {
                    None => {
                        return Err(AppError::Transport { reason: "relay connection closed".into() });
                    },
                    Some(frame) => self.handle_frame(frame).await?,
                },

                Some(joined) = self.lookups.join_next(), if !self.lookups.is_empty() => {
                    match joined {
                        Ok(lookup) => self.handle_lookup(lookup).await?,
                        Err(e) => tracing::error!(error = %e, "key lookup task aborted"),
                    }
                },
            }
        }
    }

    async fn handle_command(&mut self, command: Command<E::Instant>) -> Result<(), AppError> {
        match command {
            Command::SendRoom { room, text, reply } => {
                let id = self.register(reply);
                let result = self.session.handle(SessionEvent::SendRoomMessage { id, room, text });
                self.apply_send_result(id, result).await
            },
            Command::SendDirect { peer, text, reply } => {
                let id = self.register(reply);
                let result = self.session.handle(SessionEvent::SendDirectMessage { id, peer, text });
                self.apply_send_result(id, result).await
            },
            Command::History { conversation, reply } => {
                let _ = reply.send(self.session.history(&conversation).to_vec());
                Ok(())
            },
            Command::PeerState { peer, reply } => {
                let _ = reply.send(self.session.peer_state(&peer));
                Ok(())
            },
            Command::ProvidePrivateKey { key, reply } => {
                let actions = self.session.handle(SessionEvent::PrivateKeyLoaded(key))?;
                self.apply(actions).await?;
                let _ = reply.send(());
                Ok(())
            },
            Command::Shutdown => Ok(()),
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), AppError> {
        let Some(envelope) = frame.into_envelope() else {
            tracing::debug!("ignoring non-envelope frame from relay");
            return Ok(());
        };

        let sender = envelope.sender().to_string();
        match self.session.handle(SessionEvent::EnvelopeReceived(envelope)) {
            Ok(actions) => self.apply(actions).await,
            Err(e) => {
                // Scoped to this one message; session state is untouched
                tracing::warn!(%sender, error = %e, retryable = e.is_retryable(), "dropping envelope");
                Ok(())
            },
        }
    }

    async fn handle_lookup(&mut self, (peer, result): Lookup) -> Result<(), AppError> {
        if !self.alive.load(Ordering::SeqCst) {
            tracing::debug!(%peer, "discarding key lookup after shutdown");
            return Ok(());
        }

        let event = match result {
            Ok(public_key) => SessionEvent::PeerKeyResolved { peer, public_key },
            Err(e) => SessionEvent::PeerKeyUnavailable { peer, reason: e.to_string() },
        };

        let actions = self.session.handle(event)?;
        self.apply(actions).await
    }

    fn register(&mut self, reply: SendReply) -> SendId {
        let id = SendId(self.next_send_id);
        self.next_send_id += 1;
        self.replies.insert(id, reply);
        id
    }

    async fn apply_send_result(
        &mut self,
        id: SendId,
        result: Result<Vec<SessionAction<E::Instant>>, SessionError>,
    ) -> Result<(), AppError> {
        match result {
            Ok(actions) => self.apply(actions).await,
            Err(error) => {
                self.reply(id, Err(error));
                Ok(())
            },
        }
    }

    fn reply(&mut self, id: SendId, outcome: Result<(), SessionError>) {
        if let Some(reply) = self.replies.remove(&id) {
            // The caller may have stopped waiting
            let _ = reply.send(outcome);
        }
    }

    async fn apply(&mut self, actions: Vec<SessionAction<E::Instant>>) -> Result<(), AppError> {
        for action in actions {
            match action {
                SessionAction::Send(envelope) => {
                    self.transport.outbound.send(Frame::from(envelope)).await.map_err(|_| {
                        AppError::Transport { reason: "relay connection closed".to_string() }
                    })?;
                },
                SessionAction::Deliver(message) => {
                    tracing::debug!(
                        sender = %message.sender,
                        conversation = %message.conversation,
                        "message admitted"
                    );
                    // No subscribers is fine; history still has it
                    let _ = self.messages.send(message);
                },
                SessionAction::ResolvePeerKey { peer } => self.spawn_lookup(peer),
                SessionAction::SendCompleted { id } => self.reply(id, Ok(())),
                SessionAction::SendFailed { id, error } => {
                    tracing::warn!(error = %error, "send failed");
                    self.reply(id, Err(error));
                },
                SessionAction::KeyProvisioningNeeded { reason } => {
                    tracing::warn!(%reason, "key provisioning needed; DMs are buffered until a private key is provided");
                },
                SessionAction::Log { message } => tracing::debug!("{message}"),
            }
        }
        Ok(())
    }

    fn spawn_lookup(&mut self, peer: String) {
        let directory = Arc::clone(&self.directory);

        // Inner task isolates directory panics so the peer is always reported
        self.lookups.spawn(async move {
            let lookup_peer = peer.clone();
            let result = tokio::spawn(async move { directory.public_key(&lookup_peer).await })
                .await
                .unwrap_or_else(|e| {
                    Err(DirectoryError::Unreachable { reason: format!("lookup task failed: {e}") })
                });
            (peer, result)
        });
    }
}
