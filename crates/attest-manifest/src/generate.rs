//! Manifest generation over a source tree
//!
//! Used by the offline release tooling: walks a source root, hashes every
//! selected file with both algorithms and produces one manifest per
//! algorithm, keyed by POSIX-style path relative to the root.

use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::digest::{DigestAlgorithm, DigestError, DigestSet};
use crate::manifest::{ChecksumManifest, ManifestError};

/// Errors from manifest generation
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("source root not found: {0}")]
    MissingRoot(PathBuf),

    #[error("invalid include pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("path is not within source root: {0}")]
    PathNotInRoot(PathBuf),
}

/// Selects which files of a source tree enter the manifests
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    includes: Option<GlobSet>,
    excluded_dirs: Vec<String>,
}

impl SourceFilter {
    /// Accept every regular file
    pub fn all() -> Self {
        Self::default()
    }

    /// Accept files whose relative path matches any glob pattern
    ///
    /// `*` crosses directory separators, so `*.cpp` selects every C++
    /// source at any depth.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, GenerateError> {
        if patterns.is_empty() {
            return Ok(Self::all());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| GenerateError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| GenerateError::Pattern {
            pattern: patterns
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(","),
            reason: e.to_string(),
        })?;

        Ok(Self {
            includes: Some(set),
            excluded_dirs: Vec::new(),
        })
    }

    /// Accept files with any of the given extensions, ignoring case
    ///
    /// A leading dot is tolerated (`.cpp` and `cpp` are the same filter).
    pub fn from_extensions<S: AsRef<str>>(extensions: &[S]) -> Result<Self, GenerateError> {
        let extensions: Vec<&str> = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .collect();
        if extensions.is_empty() {
            return Ok(Self::all());
        }

        let mut builder = GlobSetBuilder::new();
        for ext in &extensions {
            let pattern = format!("*.{}", ext);
            let glob = GlobBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| GenerateError::Pattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| GenerateError::Pattern {
            pattern: extensions.join(","),
            reason: e.to_string(),
        })?;

        Ok(Self {
            includes: Some(set),
            excluded_dirs: Vec::new(),
        })
    }

    /// Skip everything under a relative directory (e.g. the signature output)
    pub fn excluding_dir(mut self, rel_dir: impl Into<String>) -> Self {
        let dir = rel_dir.into().trim_end_matches('/').to_string();
        if !dir.is_empty() {
            self.excluded_dirs.push(dir);
        }
        self
    }

    /// Whether a relative POSIX path is selected
    pub fn matches(&self, rel_path: &str) -> bool {
        let excluded = self.excluded_dirs.iter().any(|dir| {
            rel_path == dir
                || rel_path
                    .strip_prefix(dir.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        });
        if excluded {
            return false;
        }
        match &self.includes {
            Some(set) => set.is_match(rel_path),
            None => true,
        }
    }
}

/// The pair of manifests produced for one file population
#[derive(Debug, Clone)]
pub struct GeneratedManifests {
    pub sha256: ChecksumManifest,
    pub blake2b: ChecksumManifest,
}

impl GeneratedManifests {
    /// Manifest for one algorithm
    pub fn get(&self, algorithm: DigestAlgorithm) -> &ChecksumManifest {
        match algorithm {
            DigestAlgorithm::Sha256 => &self.sha256,
            DigestAlgorithm::Blake2b => &self.blake2b,
        }
    }

    /// Number of files covered
    pub fn file_count(&self) -> usize {
        self.sha256.len()
    }

    /// Write both manifests into a signature directory layout
    pub fn write_to(&self, signature_dir: &Path) -> Result<Vec<PathBuf>, ManifestError> {
        let mut written = Vec::new();
        for manifest in [&self.sha256, &self.blake2b] {
            let path = manifest.algorithm().manifest_path(signature_dir);
            manifest.write(&path)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Hash every selected file under `source_root`
pub fn generate_manifests(
    source_root: &Path,
    filter: &SourceFilter,
) -> Result<GeneratedManifests, GenerateError> {
    if !source_root.is_dir() {
        return Err(GenerateError::MissingRoot(source_root.to_path_buf()));
    }

    let mut sha256 = ChecksumManifest::new(DigestAlgorithm::Sha256);
    let mut blake2b = ChecksumManifest::new(DigestAlgorithm::Blake2b);

    for entry in WalkDir::new(source_root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(source_root)
            .map_err(|_| GenerateError::PathNotInRoot(entry.path().to_path_buf()))?;
        let rel_path = posix_path(rel);
        if !filter.matches(&rel_path) {
            continue;
        }

        let digests = DigestSet::from_file(entry.path())?;
        debug!(path = %rel_path, sha256 = %digests.sha256, "hashed source file");
        sha256.insert(rel_path.clone(), digests.sha256)?;
        blake2b.insert(rel_path, digests.blake2b)?;
    }

    Ok(GeneratedManifests { sha256, blake2b })
}

/// Join path components with `/` regardless of host platform
fn posix_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_source_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("modules/crypto")).unwrap();
        fs::write(dir.path().join("main.cpp"), "int main() {}\n").unwrap();
        fs::write(dir.path().join("modules/crypto/hash.hpp"), "#pragma once\n").unwrap();
        fs::write(dir.path().join("modules/crypto/hash.cpp"), "// hash\n").unwrap();
        fs::write(dir.path().join("README.md"), "docs\n").unwrap();
        dir
    }

    #[test]
    fn test_generate_all_files() {
        let dir = create_source_tree();
        let generated = generate_manifests(dir.path(), &SourceFilter::all()).unwrap();

        assert_eq!(generated.file_count(), 4);
        assert_eq!(generated.blake2b.len(), 4);
        let paths: Vec<_> = generated.sha256.entries().map(|e| e.path).collect();
        assert_eq!(
            paths,
            vec![
                "README.md",
                "main.cpp",
                "modules/crypto/hash.cpp",
                "modules/crypto/hash.hpp"
            ]
        );
    }

    #[test]
    fn test_generate_with_patterns() {
        let dir = create_source_tree();
        let filter = SourceFilter::from_patterns(&["*.cpp", "*.hpp"]).unwrap();
        let generated = generate_manifests(dir.path(), &filter).unwrap();

        assert_eq!(generated.file_count(), 3);
        assert!(generated.sha256.get("README.md").is_none());
        assert!(generated.sha256.get("modules/crypto/hash.hpp").is_some());
    }

    #[test]
    fn test_excluded_dir_is_skipped() {
        let dir = create_source_tree();
        let filter = SourceFilter::all().excluding_dir("modules/crypto");
        let generated = generate_manifests(dir.path(), &filter).unwrap();

        assert_eq!(generated.file_count(), 2);
        assert!(filter.matches("modules/cryptography.cpp"));
    }

    #[test]
    fn test_generation_is_reproducible() {
        let dir = create_source_tree();
        let first = generate_manifests(dir.path(), &SourceFilter::all()).unwrap();
        let second = generate_manifests(dir.path(), &SourceFilter::all()).unwrap();

        assert_eq!(first.sha256.render(), second.sha256.render());
        assert_eq!(first.blake2b.render(), second.blake2b.render());
    }

    #[test]
    fn test_write_to_layout() {
        let dir = create_source_tree();
        let out = TempDir::new().unwrap();
        let generated = generate_manifests(dir.path(), &SourceFilter::all()).unwrap();

        let written = generated.write_to(out.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(out.path().join("SHA256/SHA256SUMS").is_file());
        assert!(out.path().join("BLAKE2b/BLAKE2BSUMS").is_file());
    }

    #[test]
    fn test_extension_filter_ignores_case() {
        let dir = create_source_tree();
        fs::write(dir.path().join("LEGACY.CPP"), "// old\n").unwrap();
        let filter = SourceFilter::from_extensions(&["cpp", ".hpp"]).unwrap();
        let generated = generate_manifests(dir.path(), &filter).unwrap();

        assert_eq!(generated.file_count(), 4);
        assert!(generated.sha256.get("LEGACY.CPP").is_some());
        assert!(generated.sha256.get("README.md").is_none());
    }

    #[test]
    fn test_missing_root() {
        let result = generate_manifests(Path::new("/no/such/source"), &SourceFilter::all());
        assert!(matches!(result, Err(GenerateError::MissingRoot(_))));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = SourceFilter::from_patterns(&["[unclosed"]);
        assert!(matches!(result, Err(GenerateError::Pattern { .. })));
    }
}
