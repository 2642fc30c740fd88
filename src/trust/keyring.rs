//! Local keyrings
//!
//! A keyring holds imported trust anchors by fingerprint and checks
//! detached signatures against them. Import is idempotent per fingerprint.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::anchor::{AnchorError, TrustAnchor};
use super::signing::{DetachedSignature, SigningError};

#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Anchor(#[from] AnchorError),

    #[error(transparent)]
    Signature(#[from] SigningError),

    #[error("{0}")]
    Tool(String),
}

/// Outcome of checking one detached signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid { fingerprint: String },
    Invalid { reason: String },
}

pub trait Keyring {
    /// Fingerprint of the key in an anchor file, without importing it
    fn fingerprint_of(&mut self, anchor: &Path) -> Result<String, KeyringError>;

    fn contains(&mut self, fingerprint: &str) -> Result<bool, KeyringError>;

    /// Import the anchor file, returning its fingerprint
    fn import(&mut self, anchor: &Path) -> Result<String, KeyringError>;

    /// Check `signature` (a detached signature file) over the file `data`
    fn verify_detached(&mut self, data: &Path, signature: &Path) -> Result<SignatureCheck, KeyringError>;
}

/// Keyring directory of armored Ed25519 public keys named `<fingerprint>.asc`
#[derive(Debug, Clone)]
pub struct LocalKeyring {
    dir: PathBuf,
}

impl LocalKeyring {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{}.asc", fingerprint.to_ascii_lowercase()))
    }

    fn load_key(&self, fingerprint: &str) -> Result<Option<TrustAnchor>, KeyringError> {
        let path = self.key_path(fingerprint);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(TrustAnchor::load(&path)?))
    }

    /// Every key in the keyring
    pub fn keys(&self) -> Result<Vec<TrustAnchor>, KeyringError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(KeyringError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| KeyringError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "asc") {
                keys.push(TrustAnchor::load(&path)?);
            }
        }
        Ok(keys)
    }
}

impl Keyring for LocalKeyring {
    fn fingerprint_of(&mut self, anchor: &Path) -> Result<String, KeyringError> {
        Ok(TrustAnchor::load(anchor)?.fingerprint().to_string())
    }

    fn contains(&mut self, fingerprint: &str) -> Result<bool, KeyringError> {
        Ok(self.key_path(fingerprint).is_file())
    }

    fn import(&mut self, anchor: &Path) -> Result<String, KeyringError> {
        let key = TrustAnchor::load(anchor)?;
        let path = self.key_path(key.fingerprint());
        if path.is_file() {
            debug!(fingerprint = %key.fingerprint(), "key already in keyring");
            return Ok(key.fingerprint().to_string());
        }

        fs::create_dir_all(&self.dir).map_err(|source| KeyringError::Io {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, key.to_armored()).map_err(|source| KeyringError::Io {
            path: path.clone(),
            source,
        })?;
        info!(fingerprint = %key.fingerprint(), keyring = %self.dir.display(), "imported key");
        Ok(key.fingerprint().to_string())
    }

    fn verify_detached(&mut self, data: &Path, signature: &Path) -> Result<SignatureCheck, KeyringError> {
        let sig = DetachedSignature::load(signature)?;
        let bytes = fs::read(data).map_err(|source| KeyringError::Io {
            path: data.to_path_buf(),
            source,
        })?;

        let candidates = match &sig.fingerprint {
            Some(fp) => match self.load_key(fp)? {
                Some(key) => vec![key],
                None => {
                    return Ok(SignatureCheck::Invalid {
                        reason: format!("no public key with fingerprint {} in keyring", fp),
                    })
                }
            },
            None => self.keys()?,
        };

        let check = candidates
            .iter()
            .find(|key| sig.verify(key, &bytes))
            .map(|key| SignatureCheck::Valid {
                fingerprint: key.fingerprint().to_string(),
            })
            .unwrap_or_else(|| SignatureCheck::Invalid {
                reason: "signature does not verify against any key in keyring".to_string(),
            });
        Ok(check)
    }
}
