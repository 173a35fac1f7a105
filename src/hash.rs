//! Block-wise SHA-256 content hashing.
//!
//! A content hash is computed by splitting the stream into 4 MiB blocks,
//! hashing each block with SHA-256, and hashing the concatenation of the
//! per-block digests once more. Every storage backend produces hashes with
//! this exact scheme so identity comparison works across backends. It is
//! also the scheme Dropbox reports as `content_hash`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Fixed block size (4 MiB)
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Lowercase hex-encoded 64-character content hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Parse a hex digest, normalizing to lowercase
    pub fn from_hex(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized.len() != 64 || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidHash {
                value: value.to_string(),
            });
        }
        Ok(Self(normalized))
    }

    /// Degraded identifier derived from a backend path rather than content.
    ///
    /// Used only when a backend cannot produce a real content hash. Two files
    /// collide here only if they share the exact same path string.
    pub fn from_path_fallback(path: &str) -> Self {
        Self(hex::encode(Sha256::digest(path.as_bytes())))
    }

    /// Get the hash as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Incremental two-level block hasher.
///
/// Block digests are fed into the outer hasher as soon as a block fills, so
/// memory use stays constant regardless of input size.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    block: Sha256,
    block_len: usize,
    outer: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            block: Sha256::new(),
            block_len: 0,
            outer: Sha256::new(),
        }
    }

    /// Feed bytes in any split; block boundaries are tracked internally
    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (BLOCK_SIZE - self.block_len).min(data.len());
            self.block.update(&data[..take]);
            self.block_len += take;
            data = &data[take..];

            if self.block_len == BLOCK_SIZE {
                let digest = self.block.finalize_reset();
                self.outer.update(digest);
                self.block_len = 0;
            }
        }
    }

    pub fn finalize(mut self) -> ContentHash {
        if self.block_len > 0 {
            let digest = self.block.finalize();
            self.outer.update(digest);
        }
        ContentHash(hex::encode(self.outer.finalize()))
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hash an in-memory buffer
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Hash everything a reader yields
pub fn hash_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<ContentHash> {
    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Compute the content hash of a local file in streaming fashion
pub fn hash_file<P: AsRef<Path>>(file_path: P) -> io::Result<ContentHash> {
    let mut file = File::open(file_path)?;
    hash_reader(&mut file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SHA256_EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    /// Straight transcription of the block scheme, used as an oracle
    fn reference_hash(data: &[u8]) -> String {
        let mut digests = Vec::new();
        for block in data.chunks(BLOCK_SIZE) {
            digests.extend_from_slice(&Sha256::digest(block));
        }
        hex::encode(Sha256::digest(&digests))
    }

    #[test]
    fn test_empty_input_hashes_to_sha256_of_nothing() {
        assert_eq!(hash_bytes(b"").as_str(), SHA256_EMPTY);
        assert_eq!(ContentHasher::new().finalize().as_str(), SHA256_EMPTY);
    }

    #[test]
    fn test_small_input_is_hash_of_single_block_digest() {
        let data = b"hello world";
        let inner = Sha256::digest(data);
        let expected = hex::encode(Sha256::digest(inner));

        assert_eq!(hash_bytes(data).as_str(), expected);
        // Not a single-pass SHA-256
        assert_ne!(hash_bytes(data).as_str(), hex::encode(Sha256::digest(data)));
    }

    #[test]
    fn test_block_boundaries() {
        let exact = vec![0xabu8; BLOCK_SIZE];
        assert_eq!(hash_bytes(&exact).as_str(), reference_hash(&exact));

        let over = vec![0x11u8; BLOCK_SIZE + 17];
        assert_eq!(hash_bytes(&over).as_str(), reference_hash(&over));

        let under = vec![0x22u8; BLOCK_SIZE - 1];
        assert_eq!(hash_bytes(&under).as_str(), reference_hash(&under));
    }

    #[test]
    fn test_update_split_does_not_matter() {
        let data: Vec<u8> = (0..(BLOCK_SIZE * 2 + 1234)).map(|i| (i % 251) as u8).collect();

        let mut hasher = ContentHasher::new();
        for piece in data.chunks(999_999) {
            hasher.update(piece);
        }

        assert_eq!(hasher.finalize(), hash_bytes(&data));
    }

    #[test]
    fn test_file_and_reader_agree() -> io::Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"same bytes everywhere")?;
        file.flush()?;

        let from_file = hash_file(file.path())?;
        let from_reader = hash_reader(&mut io::Cursor::new(b"same bytes everywhere"))?;

        assert_eq!(from_file, from_reader);
        assert_eq!(from_file, hash_file(file.path())?);
        Ok(())
    }

    #[test]
    fn test_parse_and_fallback() {
        let upper = SHA256_EMPTY.to_ascii_uppercase();
        assert_eq!(ContentHash::from_hex(&upper).unwrap().as_str(), SHA256_EMPTY);
        assert!(ContentHash::from_hex("abc").is_err());
        assert!(ContentHash::from_hex(&"z".repeat(64)).is_err());

        let a = ContentHash::from_path_fallback("/HCS/report.txt");
        let b = ContentHash::from_path_fallback("/HCS/report.txt");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, ContentHash::from_path_fallback("/HCS/other.txt"));
    }
}
