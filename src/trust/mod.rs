//! Release keys, keyrings and artifact verification

pub mod anchor;
pub mod armor;
pub mod gpg;
pub mod keyring;
pub mod signing;
pub mod verifier;

pub use anchor::{compute_key_fingerprint, TrustAnchor};
pub use gpg::GpgKeyring;
pub use keyring::{Keyring, KeyringError, LocalKeyring, SignatureCheck};
pub use signing::{DetachedSignature, ReleaseSigner, SigningError};
pub use verifier::{AlgorithmCheck, SignatureLayout, TrustVerifier, VerificationReport};
