//! Stream dispatch for incoming transactions
// (c) 2025 Ross Younger

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, trace, trace_span, warn, Instrument as _};

use crate::protocol::{Datagram, Direction};
use crate::session::{self, StreamHandler};
use crate::transport::{StreamId, StreamUnit, Transport, TransportError};

/// Queue depth between the dispatcher and one stream handler
const UNIT_QUEUE: usize = 16;

type HandlerMap = Arc<Mutex<HashMap<StreamId, mpsc::Sender<StreamUnit>>>>;

/// Routes a connection's incoming units to per-stream handler tasks.
///
/// The map is the only state shared between tasks: an entry is inserted
/// when a previously-unseen stream id appears and removed when its
/// handler terminates.
pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    handlers: HandlerMap,
    root: PathBuf,
}

impl Dispatcher {
    pub(crate) fn new(transport: Arc<dyn Transport>, root: PathBuf) -> Self {
        Self {
            transport,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            root,
        }
    }

    /// Runs until the transport closes. Per-stream failures are contained
    /// to their handler task and logged; they never end this loop.
    pub(crate) async fn run(&self) -> Result<()> {
        loop {
            let unit = match self.transport.receive().await {
                Ok(unit) => unit,
                Err(TransportError::Closed) => {
                    debug!("transport closed, dispatcher finishing");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            self.route(unit).await;
        }
    }

    async fn route(&self, unit: StreamUnit) {
        let id = unit.id;
        let mut handlers = self.handlers.lock().await;
        if let Some(tx) = handlers.get(&id) {
            if tx.send(unit).await.is_ok() {
                return;
            }
            // Handler ended early (e.g. rejected request); drop the
            // stale entry along with the unit.
            trace!("dropping unit for finished stream {id}");
            let _ = handlers.remove(&id);
            return;
        }

        trace!("new stream {id}");
        let (tx, rx) = mpsc::channel(UNIT_QUEUE);
        let _ = tx.send(unit).await;
        let _ = handlers.insert(id, tx);
        drop(handlers);

        let transport = Arc::clone(&self.transport);
        let handlers = Arc::clone(&self.handlers);
        let root = self.root.clone();
        drop(tokio::spawn(async move {
            if let Err(e) = handle_stream(transport, root, id, rx).await {
                error!("stream {id} handler failed: {e:#}");
            }
            let _ = handlers.lock().await.remove(&id);
            trace!("stream {id} handler finished");
        }));
    }
}

/// Classifies the first message on a stream and runs the matching handler
async fn handle_stream(
    transport: Arc<dyn Transport>,
    root: PathBuf,
    id: StreamId,
    mut units: mpsc::Receiver<StreamUnit>,
) -> Result<()> {
    let Some(first) = units.recv().await else {
        return Ok(());
    };
    if first.payload.is_empty() {
        // A stream that opened and closed without a message needs nothing
        return Ok(());
    }
    let request = match Datagram::decode(&first.payload) {
        Ok(datagram) => datagram,
        Err(e) => {
            warn!("stream {id}: {e}");
            return invalid_request(&*transport, id).await;
        }
    };
    let direction = match request.direction() {
        Some(direction) if !request.filename.is_empty() => direction,
        _ => {
            warn!(
                "stream {id}: not a usable request ({} message)",
                request.kind
            );
            return invalid_request(&*transport, id).await;
        }
    };
    let span = match direction {
        Direction::Upload => trace_span!("SERVER:UPLOAD", filename = %request.filename),
        Direction::Download => trace_span!("SERVER:DOWNLOAD", filename = %request.filename),
    };
    let mut handler: Box<dyn StreamHandler> = match direction {
        Direction::Upload => session::Upload::boxed(transport, units, request, id, root),
        Direction::Download => session::Download::boxed(transport, units, request, id, root),
    };
    handler.handle().instrument(span).await
}

/// ERROR reply for an unusable first message. The stream is left open;
/// the client abandons it.
async fn invalid_request(transport: &dyn Transport, id: StreamId) -> Result<()> {
    session::common::send_datagram(transport, id, &Datagram::error("Invalid request")).await
}
