//! Content digests used to detect silent corruption.
//!
//! Both the integrity verifier and the capacity verifier compare a digest
//! taken before writing against a digest of what the drive hands back.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::io::Read;

// ============================================================================
// Digest Algorithm
// ============================================================================

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256 (default)
    #[default]
    Sha256,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Get the output length in bytes
    pub fn byte_length(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Get algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.to_lowercase();
        match s.as_str() {
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(Error::InvalidConfig(format!(
                "Unknown digest algorithm: {}",
                s
            ))),
        }
    }
}

// ============================================================================
// Checksum
// ============================================================================

/// A computed digest
#[derive(Debug, Clone)]
pub struct Checksum {
    /// The algorithm used
    pub algorithm: DigestAlgorithm,
    /// The digest bytes
    pub bytes: Vec<u8>,
}

impl Checksum {
    /// Create a new checksum from bytes
    pub fn new(algorithm: DigestAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Get the checksum as a lowercase hex string
    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.bytes)
    }

    /// First 16 hex characters, for log lines and error messages
    pub fn short_hex(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(16);
        hex
    }

    /// Check if this checksum matches another
    pub fn matches(&self, other: &Checksum) -> bool {
        self.algorithm == other.algorithm && self.bytes == other.bytes
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PartialEq for Checksum {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

// ============================================================================
// Hashing
// ============================================================================

enum Hasher {
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha256 => Hasher::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha512 => Hasher::Sha512(sha2::Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Digest an in-memory buffer
pub fn digest(algorithm: DigestAlgorithm, data: &[u8]) -> Checksum {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    Checksum::new(algorithm, hasher.finalize())
}

/// Digest everything a reader yields, returning the checksum and byte count
pub fn digest_reader<R: Read + ?Sized>(
    algorithm: DigestAlgorithm,
    reader: &mut R,
    block_size: usize,
) -> Result<(Checksum, u64)> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; block_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = read_full(reader, &mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
    }

    Ok((Checksum::new(algorithm, hasher.finalize()), total))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read as much as possible into buffer, stopping only at end of input
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(total)
}

/// Convert bytes to lowercase hex string
fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::str::FromStr;

    #[test]
    fn test_known_sha256() {
        let checksum = digest(DigestAlgorithm::Sha256, b"hello world");
        assert_eq!(
            checksum.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(checksum.short_hex(), "b94d27b9934d3e08");
    }

    #[test]
    fn test_byte_length_matches_output() {
        for algorithm in [DigestAlgorithm::Sha256, DigestAlgorithm::Sha512] {
            let checksum = digest(algorithm, b"abc");
            assert_eq!(checksum.bytes.len(), algorithm.byte_length());
        }
    }

    #[test]
    fn test_digest_reader_matches_buffer() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let expected = digest(DigestAlgorithm::Sha512, &data);

        let (actual, n) =
            digest_reader(DigestAlgorithm::Sha512, &mut Cursor::new(&data), 4096).unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_single_bit_flip_changes_digest() {
        let mut data = vec![0xAAu8; 4096];
        let before = digest(DigestAlgorithm::Sha256, &data);
        data[2048] ^= 0x01;
        let after = digest(DigestAlgorithm::Sha256, &data);
        assert!(!before.matches(&after));
    }

    #[test]
    fn test_algorithms_do_not_match_each_other() {
        let a = digest(DigestAlgorithm::Sha256, b"x");
        let b = digest(DigestAlgorithm::Sha512, b"x");
        assert_ne!(a, b);
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!(
            DigestAlgorithm::from_str("SHA256").unwrap(),
            DigestAlgorithm::Sha256
        );
        assert_eq!(
            DigestAlgorithm::from_str("sha-512").unwrap(),
            DigestAlgorithm::Sha512
        );
        assert!(DigestAlgorithm::from_str("md5").is_err());
    }

    #[test]
    fn test_read_full_short_input() {
        let mut buf = [0u8; 16];
        let n = read_full(&mut Cursor::new(vec![7u8; 10]), &mut buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(&buf[..10], &[7u8; 10]);
    }
}
