//! Sealroom command-line client.
//!
//! # Usage
//!
//! ```bash
//! # Generate the account key pair once and upload the printed public key
//! sealroom keygen --store ~/.sealroom/alice.json
//!
//! # Check that two clients agree on the room key
//! sealroom room-key
//!
//! # Chat: "#general hi" for the room, "@bob hi" for a direct message
//! sealroom chat --username alice --store ~/.sealroom/alice.json \
//!     --relay 127.0.0.1:5000 --directory http://127.0.0.1:5000 --token "$TOKEN"
//! ```

mod input;

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use sealroom_app::{SessionSetup, SystemEnv, connect_tcp, init_session};
use sealroom_client::{
    DEFAULT_MAX_PENDING_UNWRAPS, DEFAULT_ROOM_PASSPHRASE, DEFAULT_ROOM_SALT, FileKeyStore,
    HttpKeyDirectory, SessionConfig, provision,
};
use sealroom_core::DecryptedMessage;
use sealroom_crypto::{DEFAULT_ITERATIONS, RNG_SEED_SIZE, derive_room_key};
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::input::{ChatLine, render};

/// Sealroom end-to-end encrypted chat client
#[derive(Parser, Debug)]
#[command(name = "sealroom")]
#[command(about = "End-to-end encrypted room and direct-message client")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the account key pair if absent and print the public key
    Keygen {
        /// Key store file
        #[arg(long, env = "SEALROOM_KEY_STORE")]
        store: PathBuf,
    },

    /// Print the fingerprint of the configured room key
    RoomKey {
        #[command(flatten)]
        room: RoomArgs,
    },

    /// Join the relay and chat from stdin
    Chat(ChatArgs),
}

/// Room key derivation and session limits.
#[derive(Args, Debug)]
struct RoomArgs {
    /// Passphrase the room key is derived from
    #[arg(long, env = "SEALROOM_ROOM_PASSPHRASE", hide_env_values = true)]
    #[arg(default_value = DEFAULT_ROOM_PASSPHRASE)]
    room_passphrase: String,

    /// Salt for room key derivation
    #[arg(long, env = "SEALROOM_ROOM_SALT", default_value = DEFAULT_ROOM_SALT)]
    room_salt: String,

    /// PBKDF2 iteration count
    #[arg(long, env = "SEALROOM_KDF_ITERATIONS", default_value_t = DEFAULT_ITERATIONS)]
    kdf_iterations: u32,

    /// Window for collapsing duplicate room messages, in milliseconds
    #[arg(long, env = "SEALROOM_DEDUP_WINDOW_MS", default_value_t = 1_000)]
    dedup_window_ms: u64,

    /// Direct messages buffered while no private key is loaded
    #[arg(long, env = "SEALROOM_MAX_PENDING_UNWRAPS")]
    #[arg(default_value_t = DEFAULT_MAX_PENDING_UNWRAPS)]
    max_pending_unwraps: usize,
}

impl RoomArgs {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            room_passphrase: self.room_passphrase.clone(),
            room_salt: self.room_salt.clone(),
            kdf_iterations: self.kdf_iterations,
            dedup_window: Duration::from_millis(self.dedup_window_ms),
            max_pending_unwraps: self.max_pending_unwraps,
        }
    }
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Username announced to the relay
    #[arg(short, long, env = "SEALROOM_USERNAME")]
    username: String,

    /// Key store file (see `keygen`)
    #[arg(long, env = "SEALROOM_KEY_STORE")]
    store: PathBuf,

    /// Relay address (host:port)
    #[arg(long, env = "SEALROOM_RELAY", default_value = "127.0.0.1:5000")]
    relay: String,

    /// Key directory base URL
    #[arg(long, env = "SEALROOM_DIRECTORY", default_value = "http://127.0.0.1:5000")]
    directory: String,

    /// Bearer token for the key directory
    #[arg(long, env = "SEALROOM_TOKEN", hide_env_values = true)]
    token: String,

    #[command(flatten)]
    room: RoomArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // Logs go to stderr; stdout carries chat output only
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Command::Keygen { store } => keygen(store).await,
        Command::RoomKey { room } => room_key(&room).await,
        Command::Chat(args) => chat(args).await,
    }
}

async fn keygen(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileKeyStore::new(path);
    let mut seed = [0u8; RNG_SEED_SIZE];
    getrandom::fill(&mut seed).map_err(|e| format!("OS randomness unavailable: {e}"))?;

    let (pair, created) = provision(&store, seed)?;
    if created {
        tracing::info!(path = %store.path().display(), "generated new key pair");
    } else {
        tracing::info!(path = %store.path().display(), "key pair already present");
    }

    let line = format!("{}\n", pair.public.to_base64()?);
    tokio::io::stdout().write_all(line.as_bytes()).await?;
    Ok(())
}

async fn room_key(room: &RoomArgs) -> Result<(), Box<dyn std::error::Error>> {
    let key = derive_room_key(&room.room_passphrase, &room.room_salt, room.kdf_iterations)?;
    let line = format!("{}\n", key.fingerprint());
    tokio::io::stdout().write_all(line.as_bytes()).await?;
    Ok(())
}

async fn chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (transport, io) = connect_tcp(&args.relay).await?;
    let directory = HttpKeyDirectory::new(&args.directory, args.token)?;

    let setup = SessionSetup {
        env: SystemEnv::new(),
        username: args.username,
        config: args.room.session_config(),
        key_store: Arc::new(FileKeyStore::new(args.store)),
        directory: Arc::new(directory),
        transport,
    };

    let (handle, runtime) = init_session(setup).await?;
    let printer = tokio::spawn(print_messages(handle.subscribe()));
    let runtime = tokio::spawn(runtime.run());

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while handle.is_alive() {
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let result = match ChatLine::parse(&line) {
            Ok(ChatLine::Room { room, text }) => handle.send_room_message(room, text).await,
            Ok(ChatLine::Direct { peer, text }) => handle.send_direct_message(peer, text).await,
            Ok(ChatLine::History(conversation)) => match handle.history(conversation).await {
                Ok(messages) => {
                    for message in &messages {
                        write_line(&mut stdout, &render(message)).await?;
                    }
                    Ok(())
                },
                Err(e) => Err(e),
            },
            Ok(ChatLine::Quit) => break,
            Ok(ChatLine::Blank) => Ok(()),
            Err(e) => {
                write_line(&mut tokio::io::stderr(), &e.to_string()).await?;
                Ok(())
            },
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, retryable = e.is_retryable(), "send failed");
            write_line(&mut tokio::io::stderr(), &format!("error: {e}")).await?;
        }
    }

    handle.shutdown().await;
    let outcome = runtime.await?;
    io.stop();
    printer.abort();

    Ok(outcome?)
}

async fn print_messages<I: Clone>(mut messages: broadcast::Receiver<DecryptedMessage<I>>) {
    let mut stdout = tokio::io::stdout();

    loop {
        match messages.recv().await {
            Ok(message) => {
                if write_line(&mut stdout, &render(&message)).await.is_err() {
                    break;
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "output fell behind; messages skipped");
            },
            Err(RecvError::Closed) => break,
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
