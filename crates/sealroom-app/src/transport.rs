//! Relay transport.
//!
//! The runtime only sees a pair of frame channels. Where the frames go is up
//! to whoever holds the other ends: an in-memory relay in tests, or a task
//! moving newline-delimited JSON over a byte stream in production.

use sealroom_proto::{Frame, MAX_FRAME_SIZE};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::AbortHandle,
};

/// Frames buffered per direction.
pub const CHANNEL_CAPACITY: usize = 64;

/// Client end of a relay connection.
#[derive(Debug)]
pub struct Transport {
    /// Frames to the relay.
    pub outbound: mpsc::Sender<Frame>,
    /// Frames from the relay. Closes when the connection drops.
    pub inbound: mpsc::Receiver<Frame>,
}

/// Relay end of an in-memory connection created by [`Transport::channel`].
#[derive(Debug)]
pub struct RelayEnd {
    /// Frames to the client.
    pub to_client: mpsc::Sender<Frame>,
    /// Frames from the client.
    pub from_client: mpsc::Receiver<Frame>,
}

impl Transport {
    /// In-memory connection.
    pub fn channel(capacity: usize) -> (Self, RelayEnd) {
        let (outbound, from_client) = mpsc::channel(capacity);
        let (to_client, inbound) = mpsc::channel(capacity);
        (Self { outbound, inbound }, RelayEnd { to_client, from_client })
    }

    /// Run newline-delimited JSON frames over `stream`.
    ///
    /// Must be called within a tokio runtime. Undecodable lines are logged and
    /// skipped; an oversized line or a read error closes the connection.
    pub fn from_stream<S>(stream: S) -> (Self, StreamTask)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound) = mpsc::channel(CHANNEL_CAPACITY);

        let (reader, writer) = tokio::io::split(stream);
        let reader_task = tokio::spawn(read_frames(BufReader::new(reader), inbound_tx));
        let writer_task =
            tokio::spawn(write_frames(writer, outbound_rx, reader_task.abort_handle()));

        let task = StreamTask {
            reader: reader_task.abort_handle(),
            writer: writer_task.abort_handle(),
        };
        (Self { outbound, inbound }, task)
    }
}

/// Handle to the I/O tasks behind [`Transport::from_stream`].
#[derive(Debug)]
pub struct StreamTask {
    reader: AbortHandle,
    writer: AbortHandle,
}

impl StreamTask {
    /// Stop both directions immediately.
    pub fn stop(&self) {
        self.reader.abort();
        self.writer.abort();
    }

    /// True once both directions have ended.
    pub fn is_finished(&self) -> bool {
        self.reader.is_finished() && self.writer.is_finished()
    }
}

/// Connect to a relay over TCP.
#[cfg(feature = "tcp")]
pub async fn connect_tcp(addr: &str) -> Result<(Transport, StreamTask), crate::AppError> {
    let stream = tokio::net::TcpStream::connect(addr)
        .await
        .map_err(|e| crate::AppError::Transport { reason: format!("connect {addr}: {e}") })?;
    stream
        .set_nodelay(true)
        .map_err(|e| crate::AppError::Transport { reason: e.to_string() })?;

    Ok(Transport::from_stream(stream))
}

async fn read_frames<R>(mut reader: BufReader<R>, inbound: mpsc::Sender<Frame>)
where
    R: AsyncRead + Unpin,
{
    let limit = MAX_FRAME_SIZE as u64 + 1;
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = (&mut reader).take(limit).read_until(b'\n', &mut line).await;

        match read {
            Ok(0) => break,
            Ok(n) if n as u64 == limit && line.last() != Some(&b'\n') => {
                tracing::warn!(bytes = n, "relay line exceeds frame limit, closing");
                break;
            },
            Ok(_) => {},
            Err(e) => {
                tracing::warn!(error = %e, "relay read failed");
                break;
            },
        }

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        match Frame::decode(trimmed) {
            Ok(frame) => {
                if inbound.send(frame).await.is_err() {
                    break;
                }
            },
            Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
        }
    }
}

async fn write_frames<W>(mut writer: W, mut outbound: mpsc::Receiver<Frame>, reader: AbortHandle)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        let mut bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, event = frame.event_name(), "frame not sent");
                continue;
            },
        };
        bytes.push(b'\n');

        if let Err(e) = writer.write_all(&bytes).await {
            tracing::warn!(error = %e, "relay write failed");
            break;
        }
    }

    // Closing our side ends the session; stop reading too
    let _ = writer.shutdown().await;
    reader.abort();
}
