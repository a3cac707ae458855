//! Integrity verifier
//!
//! Content hash of extracted artifacts (SHA-256, lowercase hex). Used for
//! deduplication and integrity reporting, not as a security boundary.

use sha2::{Digest, Sha256};
use std::io::{self, Read};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Hashes an artifact by streaming it back from its handle
///
/// # Panics
///
/// When the artifact does not contain exactly `expected_len` bytes. The
/// extractor reported that many bytes written, so a mismatch means the
/// output was altered behind the engine's back.
pub fn verify(reader: &mut dyn Read, expected_len: u64) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut total_read: u64 = 0;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        total_read += n as u64;
    }

    assert_eq!(
        total_read, expected_len,
        "integrity mismatch: artifact holds {total_read} bytes, extractor wrote {expected_len}"
    );

    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of an in-memory buffer
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            digest_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_streamed_digest_matches_buffer() {
        let data = vec![0x5Au8; HASH_BUFFER_SIZE * 2 + 17];
        let hash = verify(&mut data.as_slice(), data.len() as u64).unwrap();
        assert_eq!(hash, digest_bytes(&data));
    }

    #[test]
    #[should_panic(expected = "integrity mismatch")]
    fn test_length_mismatch_panics() {
        let data = [1u8, 2, 3];
        let _ = verify(&mut data.as_slice(), 4);
    }
}
