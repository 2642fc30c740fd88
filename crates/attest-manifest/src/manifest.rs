//! Plain-text checksum manifests
//!
//! One manifest per digest algorithm. Each line is
//! `<lowercase hex digest><two spaces><POSIX relative path>\n`, entries are
//! unique by path and always kept sorted by path so that rendering is
//! byte-for-byte reproducible.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::digest::DigestAlgorithm;

/// Separator between digest and path on a manifest line
const FIELD_SEPARATOR: &str = "  ";

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the source root used at generation time
    pub path: String,
    /// Lowercase hex digest
    pub digest: String,
}

impl ManifestEntry {
    /// Final component of the entry's path
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Errors for manifest operations
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("duplicate entry for path '{0}'")]
    DuplicatePath(String),

    #[error("invalid {algorithm} digest for '{path}'")]
    InvalidDigest {
        algorithm: DigestAlgorithm,
        path: String,
    },

    #[error("invalid manifest path '{0}'")]
    InvalidPath(String),
}

/// Checksum manifest for a single digest algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumManifest {
    algorithm: DigestAlgorithm,
    entries: BTreeMap<String, String>,
}

impl ChecksumManifest {
    /// Create an empty manifest
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            entries: BTreeMap::new(),
        }
    }

    /// Algorithm this manifest was produced with
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Add an entry
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        digest: impl Into<String>,
    ) -> Result<(), ManifestError> {
        let path = path.into();
        let digest = digest.into();

        if path.is_empty() || path.contains('\n') || path.contains('\\') || path.starts_with('/') {
            return Err(ManifestError::InvalidPath(path));
        }
        if !self.algorithm.is_valid_hex(&digest) {
            return Err(ManifestError::InvalidDigest {
                algorithm: self.algorithm,
                path,
            });
        }
        if self.entries.contains_key(&path) {
            return Err(ManifestError::DuplicatePath(path));
        }

        self.entries.insert(path, digest);
        Ok(())
    }

    /// Parse manifest text
    ///
    /// Blank lines are ignored. A `*` binary-mode marker in front of the
    /// path, as written by coreutils, is accepted and dropped.
    pub fn parse(algorithm: DigestAlgorithm, text: &str) -> Result<Self, ManifestError> {
        let mut manifest = Self::new(algorithm);

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (digest, path) = match line.split_once(FIELD_SEPARATOR) {
                Some(fields) => fields,
                None => match line.split_once(" *") {
                    Some(fields) => fields,
                    None => {
                        return Err(ManifestError::Malformed {
                            line: line_no,
                            reason: "expected '<digest>  <path>'".to_string(),
                        })
                    }
                },
            };
            let path = path.strip_prefix('*').unwrap_or(path);

            manifest
                .insert(path, digest)
                .map_err(|e| ManifestError::Malformed {
                    line: line_no,
                    reason: e.to_string(),
                })?;
        }

        Ok(manifest)
    }

    /// Render to the canonical text form
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (path, digest) in &self.entries {
            out.push_str(digest);
            out.push_str(FIELD_SEPARATOR);
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// Load a manifest file
    pub fn read(algorithm: DigestAlgorithm, path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(algorithm, &text)
    }

    /// Write the manifest, creating parent directories as needed
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let write_err = |source| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, self.render()).map_err(write_err)
    }

    /// Entries in path order
    pub fn entries(&self) -> impl Iterator<Item = ManifestEntry> + '_ {
        self.entries.iter().map(|(path, digest)| ManifestEntry {
            path: path.clone(),
            digest: digest.clone(),
        })
    }

    /// Digest recorded for an exact relative path
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entry whose filename component and digest both match
    ///
    /// Manifest paths are relative to the generation-time source root, so
    /// callers match on the artifact's file name, never its absolute path.
    pub fn find_match(&self, file_name: &str, digest: &str) -> Option<ManifestEntry> {
        self.entries()
            .find(|entry| entry.file_name() == file_name && entry.digest == digest)
    }

    /// Whether any entry carries this file name, whatever its digest
    pub fn mentions_file_name(&self, file_name: &str) -> bool {
        self.entries().any(|entry| entry.file_name() == file_name)
    }
}
