//! Trust anchor: the release public key and its fingerprint

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};

use super::armor::{ArmorError, ArmorKind, ArmoredBlock};

/// Armor header carrying the key fingerprint
pub const FINGERPRINT_HEADER: &str = "Key-Fingerprint";

#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Armor(#[from] ArmorError),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("fingerprint mismatch: header says {expected}, key is {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

/// Compute SHA-256 fingerprint of an Ed25519 public key
pub fn compute_key_fingerprint(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    key: VerifyingKey,
    fingerprint: String,
}

impl TrustAnchor {
    pub fn from_key(key: VerifyingKey) -> Self {
        let fingerprint = compute_key_fingerprint(&key);
        Self { key, fingerprint }
    }

    pub fn key(&self) -> &VerifyingKey {
        &self.key
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Parse an armored public key block
    ///
    /// A fingerprint header, when present, must agree with the key.
    pub fn from_armored(text: &str) -> Result<Self, AnchorError> {
        let block = ArmoredBlock::decode(ArmorKind::PublicKey, text)?;
        let bytes: [u8; 32] = block
            .data
            .as_slice()
            .try_into()
            .map_err(|_| AnchorError::InvalidKey("key must be 32 bytes".to_string()))?;
        let key =
            VerifyingKey::from_bytes(&bytes).map_err(|e| AnchorError::InvalidKey(e.to_string()))?;
        let anchor = Self::from_key(key);

        if let Some(expected) = block.header(FINGERPRINT_HEADER) {
            if !expected.eq_ignore_ascii_case(&anchor.fingerprint) {
                return Err(AnchorError::FingerprintMismatch {
                    expected: expected.to_string(),
                    actual: anchor.fingerprint,
                });
            }
        }
        Ok(anchor)
    }

    pub fn load(path: &Path) -> Result<Self, AnchorError> {
        let text = fs::read_to_string(path).map_err(|source| AnchorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_armored(&text)
    }

    pub fn to_armored(&self) -> String {
        ArmoredBlock::new(ArmorKind::PublicKey, self.key.as_bytes().to_vec())
            .with_header(FINGERPRINT_HEADER, self.fingerprint.clone())
            .encode()
    }
}
