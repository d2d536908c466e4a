//! Download transactions
// (c) 2025 Ross Younger

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use human_repr::HumanCount as _;
use tokio::fs::File;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::common::{
    chunk_count, expect_response, receive_on, send_datagram, FileChunker,
};
use super::StreamHandler;
use crate::protocol::{verify_checksum, Datagram, MessageType, ProtocolError};
use crate::transport::{StreamId, StreamUnit, Transport};

/// Download: the client fetches a file from under the server's root.
pub(crate) struct Download {
    transport: Arc<dyn Transport>,
    // The client sends nothing after its REQUEST; the receiver is kept
    // so the dispatcher's map entry stays live for the handler's life.
    _units: mpsc::Receiver<StreamUnit>,
    request: Datagram,
    id: StreamId,
    root: PathBuf,
}

impl Download {
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
            _units: units,
            request,
            id,
            root,
        })
    }

    /// Client side: requests `filename` and writes it to `dest`.
    /// Returns the number of payload bytes received.
    pub(crate) async fn send(
        transport: &dyn Transport,
        filename: &str,
        dest: &Path,
    ) -> Result<u64> {
        let id = transport.open_stream().await?;
        trace!("sending request");
        send_datagram(transport, id, &Datagram::download_request(filename, id.0)).await?;

        trace!("awaiting response");
        let unit = receive_on(transport, id)
            .await
            .context("awaiting server response")?;
        let response = Datagram::decode(&unit.payload)?;
        expect_response(&response)?;
        debug!(
            "downloading {} ({})",
            response.filename,
            response.filesize.human_count_bytes()
        );

        let mut file = File::create(dest)
            .await
            .with_context(|| format!("creating {}", dest.display()))?;
        let mut received = 0u64;
        loop {
            let unit = receive_on(transport, id).await?;
            if unit.end_of_stream {
                trace!("end of stream");
                break;
            }
            if unit.payload.is_empty() {
                continue;
            }
            match Datagram::decode(&unit.payload) {
                Ok(chunk) if chunk.kind == MessageType::Data => {
                    if verify_checksum(&chunk.checksum, &chunk.data) {
                        // valid chunks are appended in arrival order
                        file.write_all(&chunk.data).await?;
                        received += chunk.data.len() as u64;
                        debug!("received chunk {} ({} bytes)", chunk.sequence, chunk.data.len());
                    } else {
                        warn!(
                            "dropping chunk: {}",
                            ProtocolError::ChecksumMismatch {
                                sequence: chunk.sequence
                            }
                        );
                    }
                }
                Ok(other) => warn!("dropping unexpected {} message mid-download", other.kind),
                Err(e) => warn!("dropping message: {e}"),
            }
        }
        file.flush().await?;
        Ok(received)
    }
}

#[async_trait]
impl StreamHandler for Download {
    async fn handle(&mut self) -> Result<()> {
        let id = self.id;
        let path = self.root.join(&self.request.filename);
        let (mut chunker, filesize) = match FileChunker::open(&path).await {
            Ok(opened) => opened,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{}", ProtocolError::FileNotFound(self.request.filename.clone()));
                // The stream is deliberately left open; the client sees
                // the ERROR and abandons it.
                return send_datagram(
                    &*self.transport,
                    id,
                    &Datagram::error("File not found"),
                )
                .await;
            }
            Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
        };

        trace!("responding");
        send_datagram(
            &*self.transport,
            id,
            &Datagram::response(&self.request.filename, filesize, id.0),
        )
        .await?;

        let total = chunk_count(filesize);
        let mut sent = 0u64;
        while let Some((sequence, payload)) = chunker.next_chunk().await? {
            sent += payload.len() as u64;
            debug!("sending chunk {sequence}/{total} ({} bytes)", payload.len());
            send_datagram(&*self.transport, id, &Datagram::chunk(id.0, sequence, payload))
                .await?;
        }
        self.transport.send(StreamUnit::end(id)).await?;
        info!(
            "download complete: {} ({})",
            self.request.filename,
            sent.human_count_bytes()
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::Download;
    use crate::protocol::{verify_checksum, Datagram, MessageType, CHUNK_SIZE};
    use crate::server::Dispatcher;
    use crate::transport::testing::{transport_pair, ChannelTransport};
    use crate::transport::{StreamUnit, Transport as _};

    fn spawn_dispatcher(server: ChannelTransport, root: &Path) {
        let dispatcher = Dispatcher::new(Arc::new(server), root.to_path_buf());
        drop(tokio::spawn(async move { dispatcher.run().await }));
    }

    /// A 25 KiB file becomes RESPONSE + three DATA chunks + end of stream
    #[tokio::test]
    async fn served_file_is_chunked_and_checksummed() {
        let root = tempfile::tempdir().unwrap();
        let contents: Vec<u8> = (0..25_600).map(|i| (i % 241) as u8).collect();
        std::fs::write(root.path().join("clip.mp4"), &contents).unwrap();

        let (client, server) = transport_pair();
        spawn_dispatcher(server, root.path());

        let id = client.open_stream().await.unwrap();
        client
            .send(StreamUnit::message(
                id,
                Datagram::download_request("clip.mp4", id.0).encode().unwrap(),
            ))
            .await
            .unwrap();

        let response = Datagram::decode(&client.receive().await.unwrap().payload).unwrap();
        assert_eq!(response.kind, MessageType::Response);
        assert_eq!(response.filesize, 25_600);
        assert_eq!(response.filename, "clip.mp4");

        let mut rebuilt = Vec::new();
        for (sequence, len) in [(1u32, CHUNK_SIZE), (2, CHUNK_SIZE), (3, 5_120)] {
            let unit = client.receive().await.unwrap();
            assert!(!unit.end_of_stream);
            let chunk = Datagram::decode(&unit.payload).unwrap();
            assert_eq!(chunk.kind, MessageType::Data);
            assert_eq!(chunk.sequence, sequence);
            assert_eq!(chunk.data.len(), len);
            assert!(verify_checksum(&chunk.checksum, &chunk.data));
            rebuilt.extend_from_slice(&chunk.data);
        }
        let end = client.receive().await.unwrap();
        assert!(end.end_of_stream);
        assert!(end.payload.is_empty());
        assert_eq!(rebuilt, contents);
    }

    #[tokio::test]
    async fn download_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let contents: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 239) as u8).collect();
        std::fs::write(root.path().join("clip.mp4"), &contents).unwrap();

        let (client, server) = transport_pair();
        spawn_dispatcher(server, root.path());

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("clip.mp4");
        let received = Download::send(&client, "clip.mp4", &dest).await.unwrap();

        assert_eq!(received, contents.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), contents);
    }

    #[tokio::test]
    async fn missing_file_reports_not_found() {
        let root = tempfile::tempdir().unwrap();
        let (client, server) = transport_pair();
        spawn_dispatcher(server, root.path());

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("nope.mp4");
        let e = Download::send(&client, "nope.mp4", &dest).await.unwrap_err();
        assert!(format!("{e:#}").contains("File not found"));
        // the transaction failed before any destination file was created
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn corrupt_chunk_is_dropped_but_transfer_continues() {
        let (client, server) = transport_pair();

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out.bin");
        let client_fut = Download::send(&client, "movie.bin", &dest);

        let server_fut = async {
            let request_unit = server.receive().await.unwrap();
            let id = request_unit.id;
            let request = Datagram::decode(&request_unit.payload).unwrap();
            assert_eq!(request.kind, MessageType::Request);
            assert_eq!(request.filesize, 0); // download marker

            let reply = |d: Datagram| StreamUnit::message(id, d.encode().unwrap());
            server
                .send(reply(Datagram::response("movie.bin", 300, id.0)))
                .await
                .unwrap();
            server
                .send(reply(Datagram::chunk(id.0, 1, vec![b'a'; 100])))
                .await
                .unwrap();
            let mut corrupt = Datagram::chunk(id.0, 2, vec![b'x'; 100]);
            corrupt.checksum = "0000".to_string();
            server.send(reply(corrupt)).await.unwrap();
            server
                .send(reply(Datagram::chunk(id.0, 3, vec![b'c'; 100])))
                .await
                .unwrap();
            server.send(StreamUnit::end(id)).await.unwrap();
        };

        let (received, ()) = tokio::join!(client_fut, server_fut);
        // the damaged chunk is gone for good: the client keeps what
        // verified, in arrival order
        assert_eq!(received.unwrap(), 200);
        let mut expected = vec![b'a'; 100];
        expected.extend_from_slice(&[b'c'; 100]);
        assert_eq!(std::fs::read(&dest).unwrap(), expected);
    }

    #[tokio::test]
    async fn non_response_aborts_the_transaction() {
        let (client, server) = transport_pair();

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out.bin");
        let client_fut = Download::send(&client, "movie.bin", &dest);

        let server_fut = async {
            let request_unit = server.receive().await.unwrap();
            let id = request_unit.id;
            server
                .send(StreamUnit::message(
                    id,
                    Datagram::ack("surprise").encode().unwrap(),
                ))
                .await
                .unwrap();
        };

        let (result, ()) = tokio::join!(client_fut, server_fut);
        let e = result.unwrap_err();
        assert!(e.to_string().contains("unexpected Ack message"));
        assert!(!dest.exists());
    }
}
