//! Datagram wire codec
// (c) 2025 Ross Younger
//!
//! # On-wire layout
//!
//! All integers are big-endian; variable-length fields carry a 4-byte
//! length prefix so a decoder never reads past a declared boundary.
//!
//! ```text
//! | type (u32) | message len (u32) | message (UTF-8) |
//! ```
//!
//! REQUEST, RESPONSE and DATA continue (other types stop above):
//!
//! ```text
//! | filename len (u32) | filename (UTF-8) | filesize (u64)
//! | transaction id (u32) | sequence (u32) | data len (u32) | data
//! | checksum (UTF-8 hex, consumes the remainder of the message) |
//! ```
//!
//! Encoding is purely structural; integrity checking is a separate
//! operation (see [`compute_checksum`](super::compute_checksum) and
//! [`verify_checksum`](super::verify_checksum)).

use bytes::{BufMut as _, Bytes, BytesMut};

use super::{compute_checksum, Direction, ProtocolError};

/// Discriminates the kinds of [Datagram]
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display)]
#[repr(u32)]
pub enum MessageType {
    /// Initiates a transaction (client to server)
    Request = 1,
    /// Accepts a request, echoing filename and size
    Response = 2,
    /// One chunk of file contents
    Data = 3,
    /// Completion signal after an upload
    Ack = 4,
    /// Rejection or failure report
    Error = 5,
}

impl MessageType {
    fn from_wire(code: u32) -> Result<Self, ProtocolError> {
        Ok(match code {
            1 => Self::Request,
            2 => Self::Response,
            3 => Self::Data,
            4 => Self::Ack,
            5 => Self::Error,
            _ => {
                return Err(ProtocolError::MalformedMessage(format!(
                    "unknown message type code {code}"
                )))
            }
        })
    }

    /// The transfer fields (filename through checksum) travel only on
    /// these three types; ACK and ERROR stop after `message`.
    fn has_transfer_fields(self) -> bool {
        matches!(self, Self::Request | Self::Response | Self::Data)
    }
}

/// A single application message. See the [module documentation](self)
/// for the wire layout.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Datagram {
    /// Message type
    pub kind: MessageType,
    /// Free-form human-readable status (error reason, completion note)
    pub message: String,
    /// Subject filename; meaningful on REQUEST and RESPONSE only
    pub filename: String,
    /// Total size of the file being transferred. On a REQUEST, zero
    /// marks a download and a positive value an upload.
    pub filesize: u64,
    /// Identifies the transaction: the id of the stream the initiating
    /// REQUEST travelled on
    pub transaction_id: u32,
    /// 1-based ordinal of a DATA chunk within its transaction
    pub sequence: u32,
    /// Chunk payload, present only on DATA
    pub data: Vec<u8>,
    /// Hex digest of `data`, present only on DATA; empty means unset
    pub checksum: String,
}

impl Datagram {
    fn bare(kind: MessageType, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
            filename: String::new(),
            filesize: 0,
            transaction_id: 0,
            sequence: 0,
            data: Vec::new(),
            checksum: String::new(),
        }
    }

    /// A REQUEST initiating an upload of `filesize` bytes
    #[must_use]
    pub fn upload_request(filename: &str, filesize: u64, transaction_id: u32) -> Self {
        Self {
            filename: filename.to_string(),
            filesize,
            transaction_id,
            ..Self::bare(MessageType::Request, "")
        }
    }

    /// A REQUEST initiating a download. Zero `filesize` is the wire-level
    /// download marker.
    #[must_use]
    pub fn download_request(filename: &str, transaction_id: u32) -> Self {
        Self {
            filename: filename.to_string(),
            transaction_id,
            ..Self::bare(MessageType::Request, "")
        }
    }

    /// A RESPONSE accepting a request
    #[must_use]
    pub fn response(filename: &str, filesize: u64, transaction_id: u32) -> Self {
        Self {
            filename: filename.to_string(),
            filesize,
            transaction_id,
            ..Self::bare(MessageType::Response, "")
        }
    }

    /// A DATA chunk; computes the payload digest at construction
    #[must_use]
    pub fn chunk(transaction_id: u32, sequence: u32, data: Vec<u8>) -> Self {
        let checksum = compute_checksum(&data);
        Self {
            transaction_id,
            sequence,
            data,
            checksum,
            ..Self::bare(MessageType::Data, "")
        }
    }

    /// An ACK closing an upload. ACK and ERROR identify their transaction
    /// only by the stream they travel on; the wire format carries no
    /// transfer fields for them.
    #[must_use]
    pub fn ack(message: &str) -> Self {
        Self::bare(MessageType::Ack, message)
    }

    /// An ERROR report
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self::bare(MessageType::Error, message)
    }

    /// The transfer direction a REQUEST asks for; `None` for other types
    #[must_use]
    pub fn direction(&self) -> Option<Direction> {
        (self.kind == MessageType::Request).then(|| {
            if self.filesize > 0 {
                Direction::Upload
            } else {
                Direction::Download
            }
        })
    }

    /// Serializes this message to its wire form
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(
            36 + self.message.len() + self.filename.len() + self.data.len() + self.checksum.len(),
        );
        buf.put_u32(self.kind as u32);
        put_block(&mut buf, "message", self.message.as_bytes())?;
        if self.kind.has_transfer_fields() {
            put_block(&mut buf, "filename", self.filename.as_bytes())?;
            buf.put_u64(self.filesize);
            buf.put_u32(self.transaction_id);
            buf.put_u32(self.sequence);
            put_block(&mut buf, "data", &self.data)?;
            buf.put_slice(self.checksum.as_bytes());
        }
        Ok(buf.freeze())
    }

    /// Deserializes a message from its wire form.
    ///
    /// Fails with [`ProtocolError::MalformedMessage`] if the buffer is
    /// shorter than the fixed prefix for its declared type, any declared
    /// length overruns the remaining bytes, a text field is not UTF-8,
    /// or a DATA frame carries no trailing checksum.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader(buf);
        let kind = MessageType::from_wire(r.u32("type")?)?;
        let message = r.string("message")?;
        let mut datagram = Self::bare(kind, &message);
        if kind.has_transfer_fields() {
            datagram.filename = r.string("filename")?;
            datagram.filesize = r.u64("filesize")?;
            datagram.transaction_id = r.u32("transaction id")?;
            datagram.sequence = r.u32("sequence number")?;
            let data_len = r.u32("data length")?;
            datagram.data = r.block(data_len, "data")?.to_vec();
            let trailer = r.rest();
            if kind == MessageType::Data && trailer.is_empty() {
                return Err(ProtocolError::MalformedMessage(
                    "DATA frame has no trailing checksum".to_string(),
                ));
            }
            datagram.checksum = std::str::from_utf8(trailer)
                .map_err(|_| {
                    ProtocolError::MalformedMessage("checksum is not valid UTF-8".to_string())
                })?
                .to_string();
        }
        Ok(datagram)
    }
}

fn put_block(buf: &mut BytesMut, what: &str, block: &[u8]) -> Result<(), ProtocolError> {
    let len = u32::try_from(block.len())
        .map_err(|_| ProtocolError::MalformedMessage(format!("{what} exceeds wire range")))?;
    buf.put_u32(len);
    buf.put_slice(block);
    Ok(())
}

/// Checked sequential reads over a received buffer
struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn block(&mut self, len: u32, what: &str) -> Result<&'a [u8], ProtocolError> {
        let len = len as usize;
        if self.0.len() < len {
            return Err(ProtocolError::MalformedMessage(format!(
                "declared {what} length {len} overruns buffer ({} bytes left)",
                self.0.len()
            )));
        }
        let (head, tail) = self.0.split_at(len);
        self.0 = tail;
        Ok(head)
    }

    fn u32(&mut self, what: &str) -> Result<u32, ProtocolError> {
        let raw = self.block(4, what)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn u64(&mut self, what: &str) -> Result<u64, ProtocolError> {
        let raw = self.block(8, what)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Ok(u64::from_be_bytes(bytes))
    }

    fn string(&mut self, what: &str) -> Result<String, ProtocolError> {
        let len = self.u32(what)?;
        let raw = self.block(len, what)?;
        Ok(std::str::from_utf8(raw)
            .map_err(|_| ProtocolError::MalformedMessage(format!("{what} is not valid UTF-8")))?
            .to_string())
    }

    fn rest(self) -> &'a [u8] {
        self.0
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{Datagram, MessageType};
    use crate::protocol::{Direction, ProtocolError};

    fn round_trip(datagram: &Datagram) {
        let wire = datagram.encode().unwrap();
        let decoded = Datagram::decode(&wire).unwrap();
        assert_eq!(*datagram, decoded);
    }

    #[test]
    fn round_trip_all_types() {
        round_trip(&Datagram::upload_request("movie.mp4", 123_456, 4));
        round_trip(&Datagram::download_request("movie.mp4", 8));
        round_trip(&Datagram::response("movie.mp4", 25_600, 4));
        round_trip(&Datagram::chunk(4, 3, vec![0xAB; 5120]));
        round_trip(&Datagram::ack("Upload complete"));
        round_trip(&Datagram::error("File not found"));
    }

    #[test]
    fn type_codes() {
        for (kind, code) in [
            (MessageType::Request, 1u8),
            (MessageType::Response, 2),
            (MessageType::Data, 3),
            (MessageType::Ack, 4),
            (MessageType::Error, 5),
        ] {
            let wire = Datagram {
                kind,
                ..Datagram::chunk(0, 1, vec![1])
            }
            .encode()
            .unwrap();
            assert_eq!(wire[..4], [0, 0, 0, code]);
        }
    }

    #[test]
    fn ack_and_error_stop_after_message() {
        let wire = Datagram::error("Invalid request").encode().unwrap();
        // type + message length + message text, nothing else
        assert_eq!(wire.len(), 4 + 4 + "Invalid request".len());
    }

    #[test]
    fn direction_discriminator() {
        assert_eq!(
            Datagram::upload_request("f", 1, 0).direction(),
            Some(Direction::Upload)
        );
        assert_eq!(
            Datagram::download_request("f", 0).direction(),
            Some(Direction::Download)
        );
        assert_eq!(Datagram::ack("").direction(), None);
    }

    #[test]
    fn rejects_empty_and_truncated_buffers() {
        assert!(matches!(
            Datagram::decode(&[]),
            Err(ProtocolError::MalformedMessage(_))
        ));
        let wire = Datagram::upload_request("movie.mp4", 99, 1).encode().unwrap();
        // every proper prefix must be rejected: a REQUEST has no trailing
        // checksum so any truncation loses a declared field
        for cut in 0..wire.len() {
            assert!(
                Datagram::decode(&wire[..cut]).is_err(),
                "decode accepted a {cut}-byte prefix"
            );
        }
    }

    #[test]
    fn rejects_unknown_type_code() {
        let e = Datagram::decode(&[0, 0, 0, 9, 0, 0, 0, 0]).unwrap_err();
        assert!(e.to_string().contains("unknown message type code 9"));
    }

    #[test]
    fn rejects_overlong_declared_length() {
        // message claims 1000 bytes but only 2 follow
        let buf = [0, 0, 0, 4, 0, 0, 3, 0xE8, 0x61, 0x62];
        let e = Datagram::decode(&buf).unwrap_err();
        assert!(e.to_string().contains("overruns buffer"));
    }

    #[test]
    fn rejects_data_without_checksum() {
        let mut chunk = Datagram::chunk(1, 1, vec![1, 2, 3]);
        chunk.checksum = String::new();
        let wire = chunk.encode().unwrap();
        let e = Datagram::decode(&wire).unwrap_err();
        assert!(e.to_string().contains("no trailing checksum"));
    }

    #[test]
    fn rejects_non_utf8_text() {
        let buf = [0, 0, 0, 4, 0, 0, 0, 2, 0xFF, 0xFE];
        let e = Datagram::decode(&buf).unwrap_err();
        assert!(e.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn chunk_constructor_checksums_its_payload() {
        let chunk = Datagram::chunk(7, 1, b"payload".to_vec());
        assert!(crate::protocol::verify_checksum(&chunk.checksum, &chunk.data));
    }
}
