//! Chunk integrity digests
// (c) 2025 Ross Younger

use md5::{Digest as _, Md5};

/// Computes the content digest of a chunk payload, as lowercase hex.
///
/// MD5 is plenty here: the digest guards against corruption on a shared
/// stream, not against tampering.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Recomputes the digest of `data` and compares it with `checksum`.
/// An empty checksum means "unset" and never verifies.
#[must_use]
pub fn verify_checksum(checksum: &str, data: &[u8]) -> bool {
    !checksum.is_empty() && checksum == compute_checksum(data)
}

#[cfg(test)]
mod test {
    use super::{compute_checksum, verify_checksum};
    use pretty_assertions::assert_eq;

    #[test]
    fn digest_is_stable_hex() {
        // Well-known MD5 test vector
        assert_eq!(compute_checksum(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            compute_checksum(b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn verify_round_trip() {
        let payload = b"some chunk payload".to_vec();
        let digest = compute_checksum(&payload);
        assert!(verify_checksum(&digest, &payload));
    }

    #[test]
    fn mutation_fails_verification() {
        let mut payload = vec![7u8; 1024];
        let digest = compute_checksum(&payload);
        payload[512] ^= 0x01;
        assert!(!verify_checksum(&digest, &payload));
    }

    #[test]
    fn empty_checksum_is_invalid() {
        assert!(!verify_checksum("", b"payload"));
    }
}
