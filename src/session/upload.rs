//! Upload transactions
// (c) 2025 Ross Younger

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use human_repr::HumanCount as _;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::common::{
    chunk_count, expect_response, receive_on, send_closing_datagram, send_datagram, FileChunker,
};
use super::StreamHandler;
use crate::protocol::{verify_checksum, Datagram, MessageType, ProtocolError};
use crate::transport::{StreamId, StreamUnit, Transport, TransportError};

/// Upload: the client pushes a file, the server stores it as
/// `received_<name>` under its root directory.
pub(crate) struct Upload {
    transport: Arc<dyn Transport>,
    units: mpsc::Receiver<StreamUnit>,
    request: Datagram,
    id: StreamId,
    root: PathBuf,
}

impl Upload {
    /// Boxing constructor (server side)
    pub(crate) fn boxed(
        transport: Arc<dyn Transport>,
        units: mpsc::Receiver<StreamUnit>,
        request: Datagram,
        id: StreamId,
        root: PathBuf,
    ) -> Box<dyn StreamHandler> {
        Box::new(Self {
            transport,
            units,
            request,
            id,
            root,
        })
    }

    /// Client side: drives one upload end to end on a fresh stream.
    /// Returns the number of payload bytes sent.
    pub(crate) async fn send(transport: &dyn Transport, source: &Path) -> Result<u64> {
        let filename = source
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .ok_or_else(|| {
                anyhow::anyhow!("source path {} has no usable file name", source.display())
            })?;
        let (mut chunker, filesize) = FileChunker::open(source)
            .await
            .with_context(|| format!("opening {}", source.display()))?;

        let id = transport.open_stream().await?;
        trace!("sending request");
        send_datagram(
            transport,
            id,
            &Datagram::upload_request(filename, filesize, id.0),
        )
        .await?;

        trace!("awaiting response");
        let unit = receive_on(transport, id)
            .await
            .context("awaiting server response")?;
        let response = Datagram::decode(&unit.payload)?;
        expect_response(&response)?;

        let total = chunk_count(filesize);
        let mut sent = 0u64;
        while let Some((sequence, payload)) = chunker.next_chunk().await? {
            sent += payload.len() as u64;
            debug!("sending chunk {sequence}/{total} ({} bytes)", payload.len());
            send_datagram(transport, id, &Datagram::chunk(id.0, sequence, payload)).await?;
        }

        // Close the stream without waiting for the server's ACK
        trace!("sending end of stream");
        transport.send(StreamUnit::end(id)).await?;
        Ok(sent)
    }
}

#[async_trait]
impl StreamHandler for Upload {
    async fn handle(&mut self) -> Result<()> {
        let id = self.id;
        trace!("responding");
        send_datagram(
            &*self.transport,
            id,
            &Datagram::response(&self.request.filename, self.request.filesize, id.0),
        )
        .await?;

        let dest = upload_destination(&self.root, &self.request.filename);
        let file = tokio::fs::File::create(&dest)
            .await
            .with_context(|| format!("creating {}", dest.display()))?;
        let mut state = TransferState::new(file);

        loop {
            let Some(unit) = self.units.recv().await else {
                return Err(TransportError::Closed.into());
            };
            if unit.end_of_stream {
                trace!("end of stream");
                break;
            }
            if unit.payload.is_empty() {
                continue;
            }
            match Datagram::decode(&unit.payload) {
                Ok(chunk) if chunk.kind == MessageType::Data => state.absorb(chunk).await?,
                Ok(other) => warn!("dropping unexpected {} message mid-upload", other.kind),
                Err(e) => warn!("dropping message: {e}"),
            }
        }

        state.file.flush().await?;
        info!(
            "upload complete: {} in {} chunks -> {}",
            state.bytes_written.human_count_bytes(),
            state.chunks_written,
            dest.display()
        );
        send_closing_datagram(&*self.transport, id, &Datagram::ack("Upload complete")).await
    }
}

/// Per-stream bookkeeping on the receiving side of an upload
struct TransferState {
    expected_next: u32,
    bytes_written: u64,
    chunks_written: u32,
    file: tokio::fs::File,
}

impl TransferState {
    fn new(file: tokio::fs::File) -> Self {
        Self {
            expected_next: 1,
            bytes_written: 0,
            chunks_written: 0,
            file,
        }
    }

    /// Appends a chunk if its digest and sequence number check out,
    /// drops it otherwise. There is no reorder buffer and no
    /// retransmission request.
    async fn absorb(&mut self, chunk: Datagram) -> std::io::Result<()> {
        if !verify_checksum(&chunk.checksum, &chunk.data) {
            warn!(
                "dropping chunk: {}",
                ProtocolError::ChecksumMismatch {
                    sequence: chunk.sequence
                }
            );
            return Ok(());
        }
        if chunk.sequence != self.expected_next {
            warn!(
                "dropping chunk: {}",
                ProtocolError::OutOfOrderChunk {
                    got: chunk.sequence,
                    expected: self.expected_next
                }
            );
            return Ok(());
        }
        self.file.write_all(&chunk.data).await?;
        self.bytes_written += chunk.data.len() as u64;
        self.chunks_written += 1;
        self.expected_next += 1;
        debug!("stored chunk {} ({} bytes)", chunk.sequence, chunk.data.len());
        Ok(())
    }
}

/// Only the file part of the requested name is honoured
fn upload_destination(root: &Path, requested: &str) -> PathBuf {
    let name = Path::new(requested)
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("unnamed");
    root.join(format!("received_{name}"))
}
