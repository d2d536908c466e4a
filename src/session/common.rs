//! Common functions within the session layer
// (c) 2025 Ross Younger

use std::path::Path;

use anyhow::{Context as _, Result};
use tokio::fs::File;
use tokio::io::AsyncReadExt as _;
use tracing::warn;

use crate::protocol::{Datagram, MessageType, ProtocolError, CHUNK_SIZE};
use crate::transport::{StreamId, StreamUnit, Transport, TransportError};

/// Encodes a datagram and ships it, leaving the stream open
pub(crate) async fn send_datagram(
    transport: &dyn Transport,
    id: StreamId,
    datagram: &Datagram,
) -> Result<()> {
    transport
        .send(StreamUnit::message(id, datagram.encode()?))
        .await?;
    Ok(())
}

/// Encodes a datagram and ships it, closing the stream with it
pub(crate) async fn send_closing_datagram(
    transport: &dyn Transport,
    id: StreamId,
    datagram: &Datagram,
) -> Result<()> {
    transport
        .send(StreamUnit::closing(id, datagram.encode()?))
        .await?;
    Ok(())
}

/// The next unit on the given stream. Units for other streams are not
/// expected on the client side; anything else is logged and skipped.
pub(crate) async fn receive_on(
    transport: &dyn Transport,
    id: StreamId,
) -> Result<StreamUnit, TransportError> {
    loop {
        let unit = transport.receive().await?;
        if unit.id == id {
            return Ok(unit);
        }
        warn!("ignoring unit for unexpected stream {}", unit.id);
    }
}

/// Checks the datagram answering a REQUEST. Anything other than a
/// RESPONSE fails the transaction; an ERROR additionally surfaces the
/// server's reason.
pub(crate) fn expect_response(datagram: &Datagram) -> Result<()> {
    match datagram.kind {
        MessageType::Response => Ok(()),
        MessageType::Error => Err(ProtocolError::UnexpectedMessage {
            expected: MessageType::Response,
            got: MessageType::Error,
        })
        .with_context(|| format!("server reported: {}", datagram.message)),
        got => Err(ProtocolError::UnexpectedMessage {
            expected: MessageType::Response,
            got,
        }
        .into()),
    }
}

/// Number of DATA chunks a file of the given size becomes
pub(crate) fn chunk_count(filesize: u64) -> u64 {
    filesize.div_ceil(CHUNK_SIZE as u64)
}

/// Reads a file in [`CHUNK_SIZE`] pieces, numbering them from 1
pub(crate) struct FileChunker {
    file: File,
    remaining: u64,
    sequence: u32,
}

impl FileChunker {
    /// Opens `path` for chunked reading; also returns the file size
    pub(crate) async fn open(path: &Path) -> std::io::Result<(Self, u64)> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok((
            Self {
                file,
                remaining: size,
                sequence: 0,
            },
            size,
        ))
    }

    /// The next `(sequence, payload)` pair, or `None` at end of file
    pub(crate) async fn next_chunk(&mut self) -> std::io::Result<Option<(u32, Vec<u8>)>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let take = self.remaining.min(CHUNK_SIZE as u64) as usize;
        let mut payload = vec![0u8; take];
        self.file.read_exact(&mut payload).await?;
        self.remaining -= take as u64;
        self.sequence += 1;
        Ok(Some((self.sequence, payload)))
    }
}
