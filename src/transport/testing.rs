//! Test helpers: an in-memory transport pair
// (c) 2025 Ross Younger

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::{mpsc, Mutex};

use super::{StreamId, StreamUnit, Transport, TransportError};

/// In order to test the state machines we need a bi-directional unit
/// flow. Each side of a pair sends into the other's inbound queue;
/// dropping one side surfaces as [`TransportError::Closed`] on the other.
pub(crate) struct ChannelTransport {
    peer: mpsc::UnboundedSender<StreamUnit>,
    inbound: Mutex<mpsc::UnboundedReceiver<StreamUnit>>,
    next_stream: AtomicU32,
}

/// Creates a connected transport pair (client side, server side)
pub(crate) fn transport_pair() -> (ChannelTransport, ChannelTransport) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, from_server) = mpsc::unbounded_channel();
    let client = ChannelTransport {
        peer: to_server,
        inbound: Mutex::new(from_server),
        next_stream: AtomicU32::new(0),
    };
    let server = ChannelTransport {
        peer: to_client,
        inbound: Mutex::new(from_client),
        next_stream: AtomicU32::new(1),
    };
    (client, server)
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn open_stream(&self) -> Result<StreamId, TransportError> {
        Ok(StreamId(self.next_stream.fetch_add(4, Ordering::SeqCst)))
    }

    async fn send(&self, unit: StreamUnit) -> Result<(), TransportError> {
        self.peer.send(unit).map_err(|_| TransportError::Closed)
    }

    async fn receive(&self) -> Result<StreamUnit, TransportError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod test {
    use super::transport_pair;
    use crate::transport::{StreamUnit, Transport as _, TransportError};
    use bytes::Bytes;

    #[tokio::test]
    async fn units_flow_both_ways() {
        let (client, server) = transport_pair();
        let id = client.open_stream().await.unwrap();
        client
            .send(StreamUnit::message(id, Bytes::from_static(b"hello")))
            .await
            .unwrap();
        let unit = server.receive().await.unwrap();
        assert_eq!(unit.id, id);
        server.send(StreamUnit::end(id)).await.unwrap();
        assert!(client.receive().await.unwrap().end_of_stream);
    }

    #[tokio::test]
    async fn dropped_peer_reads_as_closed() {
        let (client, server) = transport_pair();
        drop(server);
        assert!(matches!(
            client.receive().await,
            Err(TransportError::Closed)
        ));
    }
}
