//! Content hashing
//!
//! Files are identified by a digest of their bytes, independent of name or
//! location. The digest is streamed through a fixed buffer so large media
//! files are never loaded into memory at once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::task;

// Hash algorithm imports from RustCrypto
use blake2::{Blake2b512, Digest};
use digest::DynDigest;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

use crate::core::models::{AppError, AppResult};

/// Supported content digest algorithms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5 (default, matches digests already stored by existing archives)
    Md5,
    Sha1,
    Sha256,
    Blake2b512,
}

impl HashAlgorithm {
    /// Get the name of the hash algorithm
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Blake2b512 => "BLAKE2b-512",
        }
    }

    /// Create a new hasher instance
    pub fn create_hasher(&self) -> Box<dyn DynDigest> {
        match self {
            HashAlgorithm::Md5 => Box::new(Md5::new()),
            HashAlgorithm::Sha1 => Box::new(Sha1::new()),
            HashAlgorithm::Sha256 => Box::new(Sha256::new()),
            HashAlgorithm::Blake2b512 => Box::new(Blake2b512::new()),
        }
    }

    pub fn all() -> Vec<HashAlgorithm> {
        vec![
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Blake2b512,
        ]
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "blake2b512" => Ok(HashAlgorithm::Blake2b512),
            other => Err(AppError::Config(format!("unknown hash algorithm: {}", other))),
        }
    }
}

/// Computes the content digest of a file.
///
/// Implementations block; async callers go through [`hash_file_blocking`].
pub trait ContentHasher: Send + Sync {
    fn hash_file(&self, path: &Path) -> AppResult<String>;
}

/// Streaming file hasher
#[derive(Debug, Clone)]
pub struct FileHasher {
    algorithm: HashAlgorithm,
    buffer_size: usize,
}

impl FileHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            buffer_size: 64 * 1024, // 64KB
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Digest of an in-memory buffer, hex encoded
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        let mut hasher = self.algorithm.create_hasher();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}

impl Default for FileHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::Md5)
    }
}

impl ContentHasher for FileHasher {
    fn hash_file(&self, path: &Path) -> AppResult<String> {
        let file = File::open(path)
            .map_err(|e| AppError::Hash(format!("cannot open {}: {}", path.display(), e)))?;

        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut hasher = self.algorithm.create_hasher();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| AppError::Hash(format!("cannot read {}: {}", path.display(), e)))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}

/// Run a hasher on the blocking pool
pub async fn hash_file_blocking(
    hasher: Arc<dyn ContentHasher>,
    path: PathBuf,
) -> AppResult<String> {
    task::spawn_blocking(move || hasher.hash_file(&path)).await?
}
