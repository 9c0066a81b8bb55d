//! Content digests computed over uploaded payloads.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// Hash algorithms computed for every temporary blob.
///
/// The SHA-256 digest doubles as the content address of the stored blob.
pub const HASH_ALGORITHMS: &[HashAlgorithm] = &[HashAlgorithm::Sha256, HashAlgorithm::Sha512];

/// Supported digest algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A SHA-256 content hash represented as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute SHA-256 hash of data.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Digests of one payload under the algorithms it was hashed with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digests {
    pub sha256: ContentHash,
    /// Lowercase hex SHA-512, when requested.
    pub sha512: Option<String>,
}

impl Digests {
    /// Get the hex digest for an algorithm, if it was computed.
    pub fn hex(&self, algorithm: HashAlgorithm) -> Option<String> {
        match algorithm {
            HashAlgorithm::Sha256 => Some(self.sha256.to_hex()),
            HashAlgorithm::Sha512 => self.sha512.clone(),
        }
    }

    /// Algorithms these digests cover.
    pub fn algorithms(&self) -> Vec<HashAlgorithm> {
        let mut algorithms = vec![HashAlgorithm::Sha256];
        if self.sha512.is_some() {
            algorithms.push(HashAlgorithm::Sha512);
        }
        algorithms
    }
}

/// Incremental hasher computing the requested digests in one pass.
pub struct DigestSet {
    sha256: Sha256,
    sha512: Option<Sha512>,
    len: u64,
}

impl DigestSet {
    /// Create a digest set for `algorithms`.
    ///
    /// SHA-256 must be included: it is the content address of every blob.
    pub fn new(algorithms: &[HashAlgorithm]) -> crate::Result<Self> {
        if !algorithms.contains(&HashAlgorithm::Sha256) {
            return Err(crate::Error::InvalidHash(
                "sha256 is required to address blobs".to_string(),
            ));
        }
        Ok(Self {
            sha256: Sha256::new(),
            sha512: algorithms
                .contains(&HashAlgorithm::Sha512)
                .then(Sha512::new),
            len: 0,
        })
    }

    /// Update every hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.sha256.update(data);
        if let Some(sha512) = &mut self.sha512 {
            sha512.update(data);
        }
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether nothing has been hashed yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finalize all hashers.
    pub fn finalize(self) -> Digests {
        Digests {
            sha256: ContentHash(self.sha256.finalize().into()),
            sha512: self.sha512.map(|h| to_hex(&h.finalize())),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
