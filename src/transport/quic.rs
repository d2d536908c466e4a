//! quinn-backed transport adapter
// (c) 2025 Ross Younger
//!
//! Maps the abstract stream interface onto one QUIC connection. QUIC
//! preserves byte order within a stream but not message boundaries, so
//! each unit travels as a 4-byte big-endian length prefix followed by the
//! payload; a clean FIN between frames becomes the end-of-stream unit.

use std::collections::HashMap;
use std::sync::Arc;

use quinn::{Connection, SendStream};
use tokio::io::{AsyncRead, AsyncReadExt as _};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

use super::{StreamId, StreamUnit, Transport, TransportError};

/// Ceiling on a single inbound unit frame, to bound memory consumption
/// in the event of corruption or bugs
const MAX_UNIT_BYTES: u32 = 1_048_576;

/// Capacity of the inbound unit queue shared by all stream readers
const INBOUND_QUEUE: usize = 64;

/// The abstract stream interface realised over one [`quinn::Connection`]
pub struct QuicTransport {
    connection: Connection,
    senders: Arc<Mutex<HashMap<StreamId, SendStream>>>,
    inbound: Mutex<mpsc::Receiver<StreamUnit>>,
    unit_tx: mpsc::Sender<StreamUnit>,
}

impl std::fmt::Debug for QuicTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuicTransport")
            .field("remote", &self.connection.remote_address())
            .finish_non_exhaustive()
    }
}

impl QuicTransport {
    fn new(connection: Connection) -> Self {
        let (unit_tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        Self {
            connection,
            senders: Arc::new(Mutex::new(HashMap::new())),
            inbound: Mutex::new(inbound),
            unit_tx,
        }
    }

    /// Client-side construction. Only locally-opened streams are read;
    /// the peer is not expected to initiate any.
    #[must_use]
    pub fn new_client(connection: Connection) -> Self {
        Self::new(connection)
    }

    /// Server-side construction: spawns a task that accepts incoming
    /// bidirectional streams and feeds their units into the inbound queue.
    #[must_use]
    pub fn new_server(connection: Connection) -> Self {
        let transport = Self::new(connection.clone());
        let senders = Arc::clone(&transport.senders);
        let unit_tx = transport.unit_tx.clone();
        drop(tokio::spawn(accept_streams(connection, senders, unit_tx)));
        transport
    }
}

#[async_trait::async_trait]
impl Transport for QuicTransport {
    async fn open_stream(&self) -> Result<StreamId, TransportError> {
        let (send, recv) = self
            .connection
            .open_bi()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let id = wire_stream_id(send.id())?;
        trace!("opened stream {id}");
        let _ = self.senders.lock().await.insert(id, send);
        drop(tokio::spawn(read_units(id, recv, self.unit_tx.clone())));
        Ok(id)
    }

    async fn send(&self, unit: StreamUnit) -> Result<(), TransportError> {
        // The send half leaves the map while in use so a slow stream
        // cannot stall the others.
        let Some(mut stream) = self.senders.lock().await.remove(&unit.id) else {
            return Err(TransportError::Connection(format!(
                "stream {} is not open for sending",
                unit.id
            )));
        };
        if !unit.payload.is_empty() {
            let len = u32::try_from(unit.payload.len())
                .ok()
                .filter(|len| *len <= MAX_UNIT_BYTES)
                .ok_or_else(|| {
                    TransportError::Connection(format!(
                        "unit of {} bytes exceeds frame limit",
                        unit.payload.len()
                    ))
                })?;
            let result = write_frame(&mut stream, len, &unit.payload).await;
            if let Err(e) = result {
                return Err(TransportError::Connection(format!(
                    "writing to stream {}: {e}",
                    unit.id
                )));
            }
        }
        if unit.end_of_stream {
            // Best-effort: the peer may already have stopped reading
            let _ = stream.finish();
        } else {
            let _ = self.senders.lock().await.insert(unit.id, stream);
        }
        Ok(())
    }

    async fn receive(&self) -> Result<StreamUnit, TransportError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            // Queued units drain before connection closure is reported
            biased;
            unit = inbound.recv() => unit.ok_or(TransportError::Closed),
            _reason = self.connection.closed() => Err(TransportError::Closed),
        }
    }

    async fn close(&self) {
        self.connection.close(0u32.into(), b"finished");
    }
}

/// Accepts incoming bidirectional streams for the life of the connection
async fn accept_streams(
    connection: Connection,
    senders: Arc<Mutex<HashMap<StreamId, SendStream>>>,
    unit_tx: mpsc::Sender<StreamUnit>,
) {
    loop {
        match connection.accept_bi().await {
            Ok((send, recv)) => {
                let id = match wire_stream_id(send.id()) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!("rejecting stream: {e}");
                        continue;
                    }
                };
                trace!("accepted stream {id}");
                // The send half must be registered before the first unit
                // surfaces, so replies always find it.
                let _ = senders.lock().await.insert(id, send);
                drop(tokio::spawn(read_units(id, recv, unit_tx.clone())));
            }
            Err(quinn::ConnectionError::ApplicationClosed { .. })
            | Err(quinn::ConnectionError::ConnectionClosed { .. })
            | Err(quinn::ConnectionError::LocallyClosed) => {
                debug!("connection closed");
                return;
            }
            Err(e) => {
                warn!("connection failed: {e}");
                return;
            }
        }
    }
}

/// Reads length-prefixed unit frames from one stream until FIN.
/// A clean FIN between frames is surfaced as the end-of-stream unit; a
/// FIN inside a frame, an oversized frame or a read failure ends the
/// stream without one.
async fn read_units<R>(id: StreamId, mut recv: R, unit_tx: mpsc::Sender<StreamUnit>)
where
    R: AsyncRead + Unpin + Send,
{
    loop {
        let len = match recv.read_u32().await {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                let _ = unit_tx.send(StreamUnit::end(id)).await;
                return;
            }
            Err(e) => {
                warn!("stream {id}: read failed: {e}");
                return;
            }
        };
        if len > MAX_UNIT_BYTES {
            warn!("stream {id}: inbound unit of {len} bytes exceeds limit, abandoning stream");
            return;
        }
        let mut payload = vec![0u8; len as usize];
        if let Err(e) = recv.read_exact(&mut payload).await {
            warn!("stream {id}: truncated unit: {e}");
            return;
        }
        if unit_tx
            .send(StreamUnit::message(id, payload.into()))
            .await
            .is_err()
        {
            return;
        }
    }
}

async fn write_frame(
    stream: &mut SendStream,
    len: u32,
    payload: &[u8],
) -> Result<(), quinn::WriteError> {
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await
}

// Only the client opens streams in this protocol, so the stream index is
// unique within a connection and small enough for the wire.
fn wire_stream_id(id: quinn::StreamId) -> Result<StreamId, TransportError> {
    let index = id.index();
    u32::try_from(index).map(StreamId).map_err(|_| {
        TransportError::Connection(format!("stream index {index} exceeds protocol range"))
    })
}
