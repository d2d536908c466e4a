//! Abstract stream transport consumed by the protocol core
// (c) 2025 Ross Younger
//!
//! The protocol state machines never touch network I/O directly; they see
//! only this interface. A transport session carries many ordered,
//! reliable byte streams; each delivery observed from it is a
//! [StreamUnit] — one whole application message, or the end-of-stream
//! marker. Connection establishment, TLS, congestion control and stream
//! multiplexing all live behind the implementation (see [QuicTransport]).

mod quic;
pub use quic::QuicTransport;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use bytes::Bytes;

/// Keepalive interval for the underlying connection
pub(crate) const PROTOCOL_KEEPALIVE: Duration = Duration::from_secs(5);

/// Identifies one stream within a transport session. Stream ids double as
/// transaction ids on the wire, so they are kept to 32 bits.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct StreamId(pub u32);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One delivery observed from the transport. Purely transient; never
/// stored beyond the state machine step that consumes it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamUnit {
    /// The stream this unit travelled on
    pub id: StreamId,
    /// One encoded [Datagram](crate::protocol::Datagram), or empty
    pub payload: Bytes,
    /// True if the sender closed the stream with this unit
    pub end_of_stream: bool,
}

impl StreamUnit {
    /// A unit carrying one encoded message, stream left open
    #[must_use]
    pub fn message(id: StreamId, payload: Bytes) -> Self {
        Self {
            id,
            payload,
            end_of_stream: false,
        }
    }

    /// A unit carrying one encoded message and closing the stream
    #[must_use]
    pub fn closing(id: StreamId, payload: Bytes) -> Self {
        Self {
            id,
            payload,
            end_of_stream: true,
        }
    }

    /// The bare end-of-stream marker
    #[must_use]
    pub fn end(id: StreamId) -> Self {
        Self {
            id,
            payload: Bytes::new(),
            end_of_stream: true,
        }
    }
}

/// Failures surfaced by a transport
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The underlying session ended; no further units will arrive.
    /// Aborts the current transaction only.
    #[error("transport session closed")]
    Closed,
    /// A stream-level I/O failure
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Any other connection-level failure
    #[error("{0}")]
    Connection(String),
}

/// The abstract stream interface.
///
/// `receive` is the sole suspension point of the protocol core; sends are
/// fire-and-continue, relying on the transport's own backpressure. There
/// is no timeout or cancellation here: a stalled peer leaves the caller
/// suspended until the transport surfaces a failure.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Allocates a new stream for an outgoing transaction
    async fn open_stream(&self) -> Result<StreamId, TransportError>;

    /// Ships one unit on its stream; suspends until the transport accepts
    /// it. A unit with `end_of_stream` set closes the stream for sending.
    async fn send(&self, unit: StreamUnit) -> Result<(), TransportError>;

    /// The next available unit from any stream; suspends until one
    /// arrives. Fails with [`TransportError::Closed`] when the session
    /// ends.
    async fn receive(&self) -> Result<StreamUnit, TransportError>;

    /// Closes the session gracefully
    async fn close(&self);
}
