//! Offline release signing
//!
//! Generates the release key pair and writes ASCII-armored detached
//! signatures next to each checksum manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use attest_manifest::{DigestAlgorithm, ALGORITHMS, SIGNATURE_EXTENSION, TRUST_ANCHOR_FILE};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use tracing::info;

use super::anchor::{TrustAnchor, FINGERPRINT_HEADER};
use super::armor::{ArmorError, ArmorKind, ArmoredBlock};

/// File name of the armored secret key written by `write_keypair`
pub const SECRET_KEY_FILE: &str = "signing-key.asc";

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Armor(#[from] ArmorError),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("{0} already exists; refusing to overwrite")]
    AlreadyExists(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> SigningError + '_ {
    move |source| SigningError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Path of the detached signature for `data_path`
pub fn signature_path_for(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(".");
    name.push(SIGNATURE_EXTENSION);
    PathBuf::from(name)
}

/// Detached Ed25519 signature plus the signer's fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    pub signature: Signature,
    pub fingerprint: Option<String>,
}

impl DetachedSignature {
    pub fn from_armored(text: &str) -> Result<Self, SigningError> {
        let block = ArmoredBlock::decode(ArmorKind::Signature, text)?;
        let signature = Signature::from_slice(&block.data)
            .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
        Ok(Self {
            signature,
            fingerprint: block.header(FINGERPRINT_HEADER).map(str::to_string),
        })
    }

    pub fn load(path: &Path) -> Result<Self, SigningError> {
        let text = fs::read_to_string(path).map_err(io_err(path))?;
        Self::from_armored(&text)
    }

    pub fn to_armored(&self) -> String {
        let block = ArmoredBlock::new(ArmorKind::Signature, self.signature.to_bytes().to_vec());
        let block = match &self.fingerprint {
            Some(fp) => block.with_header(FINGERPRINT_HEADER, fp.clone()),
            None => block,
        };
        block.encode()
    }

    /// Check this signature over `data` with `anchor`'s key
    pub fn verify(&self, anchor: &TrustAnchor, data: &[u8]) -> bool {
        anchor.key().verify(data, &self.signature).is_ok()
    }
}

/// Holder of the release signing key
pub struct ReleaseSigner {
    key: SigningKey,
}

impl ReleaseSigner {
    /// Generate a new Ed25519 key
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    pub fn from_key(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn from_armored(text: &str) -> Result<Self, SigningError> {
        let block = ArmoredBlock::decode(ArmorKind::SecretKey, text)?;
        let bytes: [u8; 32] = block
            .data
            .as_slice()
            .try_into()
            .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
        Ok(Self::from_key(SigningKey::from_bytes(&bytes)))
    }

    pub fn load(path: &Path) -> Result<Self, SigningError> {
        let text = fs::read_to_string(path).map_err(io_err(path))?;
        Self::from_armored(&text)
    }

    /// Public half as a trust anchor
    pub fn anchor(&self) -> TrustAnchor {
        TrustAnchor::from_key(self.key.verifying_key())
    }

    pub fn secret_armored(&self) -> String {
        ArmoredBlock::new(ArmorKind::SecretKey, self.key.to_bytes().to_vec())
            .with_header(FINGERPRINT_HEADER, self.anchor().fingerprint().to_string())
            .encode()
    }

    pub fn sign_bytes(&self, data: &[u8]) -> DetachedSignature {
        DetachedSignature {
            signature: self.key.sign(data),
            fingerprint: Some(self.anchor().fingerprint().to_string()),
        }
    }

    /// Sign a file, writing `<file>.asc` beside it
    pub fn sign_file(&self, path: &Path) -> Result<PathBuf, SigningError> {
        let data = fs::read(path).map_err(io_err(path))?;
        let sig_path = signature_path_for(path);
        fs::write(&sig_path, self.sign_bytes(&data).to_armored()).map_err(io_err(&sig_path))?;
        info!(file = %path.display(), signature = %sig_path.display(), "signed file");
        Ok(sig_path)
    }

    /// Sign both algorithm manifests under a signature directory
    pub fn sign_manifests(&self, signature_dir: &Path) -> Result<Vec<PathBuf>, SigningError> {
        ALGORITHMS
            .iter()
            .map(|alg: &DigestAlgorithm| self.sign_file(&alg.manifest_path(signature_dir)))
            .collect()
    }

    /// Write the secret key and `publickey.asc` into `out_dir`
    ///
    /// An existing secret key is never overwritten.
    pub fn write_keypair(&self, out_dir: &Path) -> Result<(PathBuf, PathBuf), SigningError> {
        fs::create_dir_all(out_dir).map_err(io_err(out_dir))?;
        let secret_path = out_dir.join(SECRET_KEY_FILE);
        if secret_path.exists() {
            return Err(SigningError::AlreadyExists(secret_path));
        }
        fs::write(&secret_path, self.secret_armored()).map_err(io_err(&secret_path))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&secret_path, fs::Permissions::from_mode(0o600))
                .map_err(io_err(&secret_path))?;
        }

        let public_path = out_dir.join(TRUST_ANCHOR_FILE);
        fs::write(&public_path, self.anchor().to_armored()).map_err(io_err(&public_path))?;
        info!(fingerprint = %self.anchor().fingerprint(), dir = %out_dir.display(), "wrote key pair");
        Ok((secret_path, public_path))
    }
}
