//! Checksum manifests for attested native builds
//!
//! Computes the two content digests (SHA-256 and BLAKE2b-512) of arbitrary
//! byte streams and reads/writes the plain-text manifest format
//! (`<lowercase hex>  <relative path>\n`, sorted by path) that the offline
//! signing tooling produces and the trust verifier consumes.

pub mod digest;
pub mod generate;
pub mod manifest;

pub use digest::{DigestAlgorithm, DigestError, DigestSet, ALGORITHMS};
pub use generate::{generate_manifests, GenerateError, GeneratedManifests, SourceFilter};
pub use manifest::{ChecksumManifest, ManifestEntry, ManifestError};

/// Extension appended to a manifest's file name to name its detached signature.
pub const SIGNATURE_EXTENSION: &str = "asc";

/// File name of the ASCII-armored trust anchor inside a signature directory.
pub const TRUST_ANCHOR_FILE: &str = "publickey.asc";
