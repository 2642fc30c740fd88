//! Dual-algorithm content digests
//!
//! Every artifact is hashed with two independent algorithms so that a
//! collision weakness in one of them cannot by itself forge a match.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use blake2::Blake2b512;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::SIGNATURE_EXTENSION;

/// Read buffer used when streaming files through both hashers
const CHUNK_SIZE: usize = 64 * 1024;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256, the general-purpose hash
    Sha256,
    /// BLAKE2b with a 512-bit output
    Blake2b,
}

/// Both algorithms, in the order verification checks them
pub const ALGORITHMS: [DigestAlgorithm; 2] = [DigestAlgorithm::Sha256, DigestAlgorithm::Blake2b];

impl DigestAlgorithm {
    /// Display name, also used as the manifest sub-directory
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA256",
            DigestAlgorithm::Blake2b => "BLAKE2b",
        }
    }

    /// File name of this algorithm's manifest
    pub fn manifest_file_name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA256SUMS",
            DigestAlgorithm::Blake2b => "BLAKE2BSUMS",
        }
    }

    /// Length of a hex-encoded digest
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Blake2b => 128,
        }
    }

    /// Manifest location inside a signature directory
    ///
    /// Layout: `<dir>/SHA256/SHA256SUMS`, `<dir>/BLAKE2b/BLAKE2BSUMS`.
    pub fn manifest_path(&self, signature_dir: &Path) -> PathBuf {
        signature_dir.join(self.name()).join(self.manifest_file_name())
    }

    /// Detached signature location for this algorithm's manifest
    pub fn signature_path(&self, signature_dir: &Path) -> PathBuf {
        signature_dir.join(self.name()).join(format!(
            "{}.{}",
            self.manifest_file_name(),
            SIGNATURE_EXTENSION
        ))
    }

    /// Hash an in-memory buffer, returning lowercase hex
    pub fn digest_bytes(&self, data: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            DigestAlgorithm::Blake2b => hex::encode(Blake2b512::digest(data)),
        }
    }

    /// Check that a string is a well-formed digest for this algorithm
    pub fn is_valid_hex(&self, digest: &str) -> bool {
        digest.len() == self.hex_len()
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            "blake2b" | "blake2b-512" => Ok(DigestAlgorithm::Blake2b),
            other => Err(format!("unknown digest algorithm '{}'", other)),
        }
    }
}

/// Errors from digest computation
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Digests of one byte stream under every supported algorithm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSet {
    pub sha256: String,
    pub blake2b: String,
}

impl DigestSet {
    /// Hash a reader to completion, feeding both hashers from one pass
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut sha = Sha256::new();
        let mut blake = Blake2b512::new();
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            sha.update(&buf[..n]);
            blake.update(&buf[..n]);
        }

        Ok(Self {
            sha256: hex::encode(sha.finalize()),
            blake2b: hex::encode(blake.finalize()),
        })
    }

    /// Hash an in-memory buffer
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            sha256: DigestAlgorithm::Sha256.digest_bytes(data),
            blake2b: DigestAlgorithm::Blake2b.digest_bytes(data),
        }
    }

    /// Hash a file's contents
    pub fn from_file(path: &Path) -> Result<Self, DigestError> {
        let file = File::open(path).map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file).map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Digest for one algorithm
    pub fn get(&self, algorithm: DigestAlgorithm) -> &str {
        match algorithm {
            DigestAlgorithm::Sha256 => &self.sha256,
            DigestAlgorithm::Blake2b => &self.blake2b,
        }
    }
}
