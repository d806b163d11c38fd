//! In-memory relay.
//!
//! Routes frames the way the production relay does: a `join` binds a username
//! to the connection, room envelopes go to every joined client (the sender
//! included, which is how room messages come back as echoes), and DM
//! envelopes go only to the named recipient. The relay never sees plaintext;
//! it records every frame it routes so tests can inspect the wire.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use sealroom_app::{CHANNEL_CAPACITY, Transport};
use sealroom_proto::{Envelope, Frame};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

#[derive(Debug, Default)]
struct RelayState {
    /// username -> (connection id, frames to that client)
    clients: HashMap<String, (u64, mpsc::Sender<Frame>)>,
    next_connection: u64,
    duplicate: bool,
    observed: Vec<Frame>,
}

/// Shared in-memory relay. Clones route through the same state.
#[derive(Debug, Clone, Default)]
pub struct SimRelay {
    state: Arc<Mutex<RelayState>>,
}

impl SimRelay {
    /// Empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an in-memory connection.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect(&self) -> Transport {
        let (transport, relay_end) = Transport::channel(CHANNEL_CAPACITY);
        tokio::spawn(self.clone().serve(relay_end.from_client, relay_end.to_client));
        transport
    }

    /// Serve one client over a byte stream (newline-delimited JSON frames).
    ///
    /// Must be called within a tokio runtime.
    pub fn serve_stream<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        // Framing is symmetric: the client's outbound is our inbound
        let (connection, _io) = Transport::from_stream(stream);
        tokio::spawn(self.clone().serve(connection.inbound, connection.outbound));
    }

    /// Deliver every routed frame twice, simulating relay redelivery.
    pub fn set_duplicate_delivery(&self, duplicate: bool) {
        self.lock().duplicate = duplicate;
    }

    /// Every frame routed so far, in routing order.
    pub fn observed(&self) -> Vec<Frame> {
        self.lock().observed.clone()
    }

    /// Every envelope routed so far.
    pub fn observed_envelopes(&self) -> Vec<Envelope> {
        self.observed().into_iter().filter_map(Frame::into_envelope).collect()
    }

    /// Usernames currently joined.
    pub fn joined(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().clients.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn serve(self, mut from_client: mpsc::Receiver<Frame>, to_client: mpsc::Sender<Frame>) {
        let connection = {
            let mut state = self.lock();
            state.next_connection += 1;
            state.next_connection
        };
        let mut username: Option<String> = None;

        while let Some(frame) = from_client.recv().await {
            // Resolve targets under the lock, send after releasing it
            let (targets, copies) = {
                let mut state = self.lock();
                let targets = match &frame {
                    Frame::Join { username: name } => {
                        state.clients.insert(name.clone(), (connection, to_client.clone()));
                        username = Some(name.clone());
                        tracing::debug!(user = %name, connection, "relay: joined");
                        Vec::new()
                    },
                    Frame::RoomEnvelope(_) => {
                        state.clients.values().map(|(_, tx)| tx.clone()).collect()
                    },
                    Frame::DmEnvelope(dm) => state
                        .clients
                        .get(&dm.recipient)
                        .map(|(_, tx)| tx.clone())
                        .into_iter()
                        .collect(),
                };
                state.observed.push(frame.clone());
                (targets, if state.duplicate { 2 } else { 1 })
            };

            for target in targets {
                for _ in 0..copies {
                    // A client that disconnected simply misses the frame
                    let _ = target.send(frame.clone()).await;
                }
            }
        }

        if let Some(name) = username {
            let mut state = self.lock();
            if state.clients.get(&name).is_some_and(|(id, _)| *id == connection) {
                state.clients.remove(&name);
            }
            tracing::debug!(user = %name, connection, "relay: left");
        }
    }
}
