//! Chain-of-trust verification
//!
//! 1. Read the trust anchor and compute its fingerprint.
//! 2. Import it unless the keyring already holds that fingerprint.
//! 3. Verify the detached signature of every algorithm's manifest.
//! 4. Hash the artifact and look it up in every manifest by file name.
//! 5. Pass only if steps 3 and 4 hold for every algorithm.
//!
//! Every step fails closed. Failures become classified errors in the
//! report; nothing here aborts the process.

use std::path::{Path, PathBuf};

use attest_manifest::{ChecksumManifest, DigestAlgorithm, DigestSet, ALGORITHMS, TRUST_ANCHOR_FILE};
use serde::Serialize;
use tracing::{info, warn};

use super::keyring::{Keyring, SignatureCheck};
use crate::error::AttestError;

/// Where manifests, signatures and the trust anchor live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureLayout {
    pub signature_dir: PathBuf,
    pub trust_anchor: PathBuf,
}

impl SignatureLayout {
    /// Default layout with the anchor at `<dir>/publickey.asc`
    pub fn new(signature_dir: impl Into<PathBuf>) -> Self {
        let signature_dir = signature_dir.into();
        let trust_anchor = signature_dir.join(TRUST_ANCHOR_FILE);
        Self {
            signature_dir,
            trust_anchor,
        }
    }

    pub fn with_trust_anchor(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_anchor = path.into();
        self
    }

    pub fn manifest_path(&self, algorithm: DigestAlgorithm) -> PathBuf {
        algorithm.manifest_path(&self.signature_dir)
    }

    pub fn signature_path(&self, algorithm: DigestAlgorithm) -> PathBuf {
        algorithm.signature_path(&self.signature_dir)
    }
}

/// Per-algorithm verification outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlgorithmCheck {
    pub algorithm: DigestAlgorithm,
    pub signature_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_digest: Option<String>,
    pub digest_found: bool,
    /// Manifest path of the matching entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_path: Option<String>,
}

impl AlgorithmCheck {
    fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            signature_valid: false,
            artifact_digest: None,
            digest_found: false,
            matched_path: None,
        }
    }
}

/// Full result of one verification run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub trust_anchor: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// True when this run imported the key (false when it was already present)
    pub key_imported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    pub checks: Vec<AlgorithmCheck>,
    pub errors: Vec<AttestError>,
}

impl VerificationReport {
    fn new(layout: &SignatureLayout, artifact: Option<&Path>) -> Self {
        Self {
            trust_anchor: layout.trust_anchor.clone(),
            fingerprint: None,
            key_imported: false,
            artifact: artifact.map(Path::to_path_buf),
            checks: ALGORITHMS.iter().map(|alg| AlgorithmCheck::new(*alg)).collect(),
            errors: Vec::new(),
        }
    }

    fn check_mut(&mut self, algorithm: DigestAlgorithm) -> Option<&mut AlgorithmCheck> {
        self.checks.iter_mut().find(|c| c.algorithm == algorithm)
    }

    fn fail(&mut self, error: AttestError) {
        warn!(kind = error.kind(), "{}", error);
        self.errors.push(error);
    }

    /// Signatures authentic for every algorithm
    pub fn signatures_valid(&self) -> bool {
        !self.checks.is_empty() && self.checks.iter().all(|c| c.signature_valid)
    }

    /// Overall result
    ///
    /// Without an artifact only the signatures count.
    pub fn passed(&self) -> bool {
        if !self.errors.is_empty() || !self.signatures_valid() {
            return false;
        }
        match self.artifact {
            Some(_) => self.checks.iter().all(|c| c.digest_found),
            None => true,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub struct TrustVerifier<'a> {
    layout: SignatureLayout,
    keyring: &'a mut dyn Keyring,
}

impl<'a> TrustVerifier<'a> {
    pub fn new(layout: SignatureLayout, keyring: &'a mut dyn Keyring) -> Self {
        Self { layout, keyring }
    }

    pub fn layout(&self) -> &SignatureLayout {
        &self.layout
    }

    /// Steps 1-3: anchor, import and both manifest signatures
    pub fn authenticate(&mut self) -> VerificationReport {
        let mut report = VerificationReport::new(&self.layout, None);
        self.check_signatures(&mut report);
        report
    }

    /// Steps 1-5 for a built artifact
    pub fn verify_artifact(&mut self, artifact: &Path) -> VerificationReport {
        let mut report = VerificationReport::new(&self.layout, Some(artifact));
        if !self.check_signatures(&mut report) {
            return report;
        }
        self.check_digests(artifact, &mut report);
        info!(
            artifact = %artifact.display(),
            passed = report.passed(),
            "artifact verification finished"
        );
        report
    }

    /// Returns true when the anchor is in place and every signature is valid
    fn check_signatures(&mut self, report: &mut VerificationReport) -> bool {
        let Some(fingerprint) = self.ensure_anchor(report) else {
            return false;
        };

        for algorithm in ALGORITHMS {
            let manifest = self.layout.manifest_path(algorithm);
            let signature = self.layout.signature_path(algorithm);

            if let Some(missing) = [&manifest, &signature].into_iter().find(|p| !p.is_file()) {
                report.fail(AttestError::ManifestMissing {
                    path: missing.clone(),
                    reason: format!("{} manifest or signature not found", algorithm),
                });
                continue;
            }

            let outcome = match self.keyring.verify_detached(&manifest, &signature) {
                Ok(SignatureCheck::Valid { fingerprint: signer })
                    if signer.eq_ignore_ascii_case(&fingerprint) =>
                {
                    Ok(())
                }
                Ok(SignatureCheck::Valid { fingerprint: signer }) => Err(format!(
                    "signed by {}, not by the trust anchor {}",
                    signer, fingerprint
                )),
                Ok(SignatureCheck::Invalid { reason }) => Err(reason),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(()) => {
                    info!(algorithm = %algorithm, fingerprint = %fingerprint, "manifest signature valid");
                    if let Some(check) = report.check_mut(algorithm) {
                        check.signature_valid = true;
                    }
                }
                Err(reason) => report.fail(AttestError::SignatureInvalid { algorithm, reason }),
            }
        }

        report.errors.is_empty() && report.signatures_valid()
    }

    /// Steps 1 and 2; returns the anchor fingerprint
    fn ensure_anchor(&mut self, report: &mut VerificationReport) -> Option<String> {
        let anchor = self.layout.trust_anchor.clone();
        if !anchor.is_file() {
            report.fail(AttestError::SignatureImportFailed {
                reason: format!("trust anchor not found at {}", anchor.display()),
            });
            return None;
        }

        let fingerprint = match self.keyring.fingerprint_of(&anchor) {
            Ok(fp) => fp,
            Err(e) => {
                report.fail(AttestError::SignatureImportFailed {
                    reason: e.to_string(),
                });
                return None;
            }
        };
        report.fingerprint = Some(fingerprint.clone());

        match self.keyring.contains(&fingerprint) {
            Ok(true) => {
                info!(fingerprint = %fingerprint, "trust anchor already in keyring");
            }
            Ok(false) => match self.keyring.import(&anchor) {
                Ok(_) => report.key_imported = true,
                Err(e) => {
                    report.fail(AttestError::SignatureImportFailed {
                        reason: e.to_string(),
                    });
                    return None;
                }
            },
            Err(e) => {
                report.fail(AttestError::SignatureImportFailed {
                    reason: e.to_string(),
                });
                return None;
            }
        }
        Some(fingerprint)
    }

    /// Steps 4 and 5
    fn check_digests(&mut self, artifact: &Path, report: &mut VerificationReport) {
        let digests = match DigestSet::from_file(artifact) {
            Ok(d) if artifact.is_file() => d,
            _ => {
                report.fail(AttestError::ArtifactMissing {
                    path: artifact.to_path_buf(),
                });
                return;
            }
        };
        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        for algorithm in ALGORITHMS {
            let digest = digests.get(algorithm).to_string();
            if let Some(check) = report.check_mut(algorithm) {
                check.artifact_digest = Some(digest.clone());
            }

            let manifest_path = self.layout.manifest_path(algorithm);
            let manifest = match ChecksumManifest::read(algorithm, &manifest_path) {
                Ok(m) => m,
                Err(e) => {
                    report.fail(AttestError::ManifestMissing {
                        path: manifest_path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match manifest.find_match(&file_name, &digest) {
                Some(entry) => {
                    info!(algorithm = %algorithm, path = %entry.path, "artifact digest found in manifest");
                    if let Some(check) = report.check_mut(algorithm) {
                        check.digest_found = true;
                        check.matched_path = Some(entry.path);
                    }
                }
                None => report.fail(AttestError::HashMismatch {
                    algorithm,
                    artifact: file_name.clone(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::keyring::LocalKeyring;
    use crate::trust::signing::ReleaseSigner;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        signer: ReleaseSigner,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let signer = ReleaseSigner::generate();
            let sig_dir = dir.path().join("signature");
            fs::create_dir_all(&sig_dir).unwrap();
            fs::write(sig_dir.join(TRUST_ANCHOR_FILE), signer.anchor().to_armored()).unwrap();
            Self { dir, signer }
        }

        fn layout(&self) -> SignatureLayout {
            SignatureLayout::new(self.dir.path().join("signature"))
        }

        fn publish(&self, entries: &[(&str, &str)]) {
            for algorithm in ALGORITHMS {
                let mut manifest = ChecksumManifest::new(algorithm);
                for (path, content) in entries {
                    manifest
                        .insert(*path, algorithm.digest_bytes(content.as_bytes()))
                        .unwrap();
                }
                manifest.write(&self.layout().manifest_path(algorithm)).unwrap();
            }
            self.signer.sign_manifests(&self.layout().signature_dir).unwrap();
        }

        fn artifact(&self, name: &str, content: &[u8]) -> PathBuf {
            let path = self.dir.path().join("build").join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn keyring(&self) -> LocalKeyring {
            LocalKeyring::new(self.dir.path().join("keyring"))
        }
    }

    #[test]
    fn test_missing_anchor_is_import_failure() {
        let fx = Fixture::new();
        fx.publish(&[("app", "bin")]);
        let mut keyring = fx.keyring();
        let layout = fx.layout().with_trust_anchor(fx.dir.path().join("nope.asc"));

        let report = TrustVerifier::new(layout, &mut keyring).authenticate();
        assert!(!report.passed());
        assert_eq!(report.errors[0].kind(), "SIGNATURE_IMPORT_FAILED");
    }

    #[test]
    fn test_authenticate_imports_once() {
        let fx = Fixture::new();
        fx.publish(&[("app", "bin")]);
        let mut keyring = fx.keyring();

        let first = TrustVerifier::new(fx.layout(), &mut keyring).authenticate();
        assert!(first.passed());
        assert!(first.key_imported);

        let second = TrustVerifier::new(fx.layout(), &mut keyring).authenticate();
        assert!(second.passed());
        assert!(!second.key_imported);
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn test_missing_signature_fails_closed() {
        let fx = Fixture::new();
        fx.publish(&[("app", "bin")]);
        fs::remove_file(DigestAlgorithm::Blake2b.signature_path(&fx.layout().signature_dir)).unwrap();
        let artifact = fx.artifact("app", b"bin");
        let mut keyring = fx.keyring();

        let report = TrustVerifier::new(fx.layout(), &mut keyring).verify_artifact(&artifact);
        assert!(!report.passed());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind(), "MANIFEST_MISSING");
        // digests are never consulted once a signature is missing
        assert!(report.checks.iter().all(|c| c.artifact_digest.is_none()));
    }

    #[test]
    fn test_missing_artifact() {
        let fx = Fixture::new();
        fx.publish(&[("app", "bin")]);
        let mut keyring = fx.keyring();

        let report = TrustVerifier::new(fx.layout(), &mut keyring)
            .verify_artifact(&fx.dir.path().join("build/app"));
        assert!(!report.passed());
        assert!(matches!(report.errors[0], AttestError::ArtifactMissing { .. }));
    }

    #[test]
    fn test_match_reports_manifest_path() {
        let fx = Fixture::new();
        fx.publish(&[("out/bin/app", "bin"), ("README", "docs")]);
        let artifact = fx.artifact("app", b"bin");
        let mut keyring = fx.keyring();

        let report = TrustVerifier::new(fx.layout(), &mut keyring).verify_artifact(&artifact);
        assert!(report.passed(), "errors: {:?}", report.errors);
        assert!(report
            .checks
            .iter()
            .all(|c| c.matched_path.as_deref() == Some("out/bin/app")));
        assert!(report.to_json().unwrap().contains("\"digest_found\": true"));
    }
}
