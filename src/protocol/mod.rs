//! QVTP protocol definitions and helper types
// (c) 2025 Ross Younger
//!
//! The protocol moves video files over a multiplexed, reliable, ordered
//! byte-stream transport. Every application message is a [Datagram]; one
//! upload or download (a *transaction*) lives on a dedicated stream.
//!
//! * Client ➡️ Server: (opens a stream) REQUEST carrying the filename.
//!   A non-zero `filesize` marks an upload, zero marks a download.
//! * Server ➡️ Client: RESPONSE echoing the filename and size, or ERROR.
//! * The sending side (client for uploads, server for downloads) then
//!   streams the file as DATA chunks of [`CHUNK_SIZE`] bytes, sequence
//!   numbers counting from 1, each carrying an MD5 digest of its payload,
//!   and closes the stream with an empty end-of-stream unit.
//! * After an upload the server sends ACK as it closes the stream; the
//!   client does not wait for it.
//!
//! The receiving side recomputes every chunk digest before trusting the
//! payload. Corrupt or out-of-order chunks are dropped and logged; there
//! is no retransmission handshake and no reorder buffer.

mod checksum;
mod datagram;

pub use checksum::{compute_checksum, verify_checksum};
pub use datagram::{Datagram, MessageType};

/// ALPN protocol identifier negotiated on every connection
pub const ALPN: &[u8] = b"qvtp";

/// Payload size of a single DATA chunk
pub const CHUNK_SIZE: usize = 10 * 1024;

/// Protocol-level failure taxonomy.
///
/// Only [`UnexpectedMessage`](ProtocolError::UnexpectedMessage) aborts a
/// transaction (at the request/response handshake); the chunk-level
/// conditions are logged and the offending chunk dropped.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    /// Structural violation found while decoding a message
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    /// A DATA chunk whose digest does not match its payload
    #[error("checksum mismatch on chunk {sequence}")]
    ChecksumMismatch {
        /// Sequence number of the offending chunk
        sequence: u32,
    },
    /// A DATA chunk that arrived out of sequence
    #[error("out-of-order chunk {got} (expected {expected})")]
    OutOfOrderChunk {
        /// Sequence number carried by the chunk
        got: u32,
        /// Sequence number the receiver wanted next
        expected: u32,
    },
    /// The wrong message type for the current protocol state
    #[error("unexpected {got} message (expected {expected})")]
    UnexpectedMessage {
        /// What the state machine was waiting for
        expected: MessageType,
        /// What actually arrived
        got: MessageType,
    },
    /// A download was requested for a file the server does not have
    #[error("file not found: {0}")]
    FileNotFound(String),
}

/// Direction of a transfer, as encoded by a REQUEST's `filesize`
/// discriminator (non-zero means upload). The wire format has no separate
/// direction field; this enum keeps the overload out of the state machines.
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display)]
pub enum Direction {
    /// Client sends a file to the server
    Upload,
    /// Client fetches a file from the server
    Download,
}
