//! Signed-manifest verification end to end: keys, manifests, signatures,
//! keyring import and artifact lookup

use std::fs;
use std::path::{Path, PathBuf};

use attest_build::error::AttestError;
use attest_build::trust::{Keyring, LocalKeyring, ReleaseSigner, SignatureLayout, TrustVerifier};
use attest_manifest::{
    generate_manifests, ChecksumManifest, DigestAlgorithm, DigestSet, SourceFilter, ALGORITHMS,
    TRUST_ANCHOR_FILE,
};
use tempfile::TempDir;

const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

struct Release {
    dir: TempDir,
    signer: ReleaseSigner,
}

impl Release {
    fn new() -> Self {
        let release = Self {
            dir: TempDir::new().unwrap(),
            signer: ReleaseSigner::generate(),
        };
        fs::create_dir_all(release.signature_dir()).unwrap();
        release.publish_anchor(&release.signer);
        release
    }

    fn signature_dir(&self) -> PathBuf {
        self.dir.path().join("signature")
    }

    fn layout(&self) -> SignatureLayout {
        SignatureLayout::new(self.signature_dir())
    }

    fn publish_anchor(&self, signer: &ReleaseSigner) {
        fs::write(self.signature_dir().join(TRUST_ANCHOR_FILE), signer.anchor().to_armored()).unwrap();
    }

    /// Write both manifests listing `(path, digests)` and sign them with `signer`
    fn publish(&self, entries: &[(&str, &DigestSet)], signer: &ReleaseSigner) {
        for algorithm in ALGORITHMS {
            let mut manifest = ChecksumManifest::new(algorithm);
            for (path, digests) in entries {
                manifest.insert(*path, digests.get(algorithm)).unwrap();
            }
            manifest.write(&algorithm.manifest_path(&self.signature_dir())).unwrap();
        }
        signer.sign_manifests(&self.signature_dir()).unwrap();
    }

    fn artifact(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn keyring(&self) -> LocalKeyring {
        LocalKeyring::new(self.dir.path().join("keyring"))
    }
}

fn hash_mismatches(errors: &[AttestError]) -> Vec<DigestAlgorithm> {
    errors
        .iter()
        .filter_map(|e| match e {
            AttestError::HashMismatch { algorithm, .. } => Some(*algorithm),
            _ => None,
        })
        .collect()
}

#[test]
fn test_abc_sample_verifies() {
    let release = Release::new();
    let artifact = release.artifact("build/sample.bin", b"abc");
    let digests = DigestSet::from_file(&artifact).unwrap();
    assert_eq!(digests.sha256, ABC_SHA256);

    release.publish(&[("sample.bin", &digests)], &release.signer);
    let sha_text = fs::read_to_string(DigestAlgorithm::Sha256.manifest_path(&release.signature_dir())).unwrap();
    assert_eq!(sha_text, format!("{}  sample.bin\n", ABC_SHA256));

    let mut keyring = release.keyring();
    let report = TrustVerifier::new(release.layout(), &mut keyring).verify_artifact(&artifact);

    assert!(report.passed(), "errors: {:?}", report.errors);
    assert!(report.key_imported);
    assert_eq!(
        report.fingerprint.as_deref(),
        Some(release.signer.anchor().fingerprint())
    );
}

#[test]
fn test_artifact_not_listed_fails_every_algorithm() {
    let release = Release::new();
    let artifact = release.artifact("build/sample.bin", b"abc");
    let digests = DigestSet::from_bytes(b"abc");
    release.publish(&[("dist/other.bin", &digests)], &release.signer);

    let mut keyring = release.keyring();
    let report = TrustVerifier::new(release.layout(), &mut keyring).verify_artifact(&artifact);

    assert!(!report.passed());
    assert!(report.signatures_valid());
    assert_eq!(hash_mismatches(&report.errors), ALGORITHMS.to_vec());
}

#[test]
fn test_filename_component_must_match_exactly() {
    let release = Release::new();
    let artifact = release.artifact("build/app", b"payload");
    let digests = DigestSet::from_bytes(b"payload");
    release.publish(&[("bin/myapp", &digests), ("bin/app.old", &digests)], &release.signer);

    let mut keyring = release.keyring();
    let report = TrustVerifier::new(release.layout(), &mut keyring).verify_artifact(&artifact);
    assert_eq!(hash_mismatches(&report.errors).len(), 2);
}

#[test]
fn test_flipped_byte_is_detected_by_both_algorithms() {
    let release = Release::new();
    let artifact = release.artifact("build/tool", b"\x7fELF original bytes");
    release.publish(&[("tool", &DigestSet::from_file(&artifact).unwrap())], &release.signer);

    let mut keyring = release.keyring();
    assert!(TrustVerifier::new(release.layout(), &mut keyring)
        .verify_artifact(&artifact)
        .passed());

    let mut bytes = fs::read(&artifact).unwrap();
    bytes[5] ^= 0x01;
    fs::write(&artifact, bytes).unwrap();

    let report = TrustVerifier::new(release.layout(), &mut keyring).verify_artifact(&artifact);
    assert!(!report.passed());
    assert_eq!(hash_mismatches(&report.errors), ALGORITHMS.to_vec());
}

#[test]
fn test_signature_by_untrusted_key_is_invalid() {
    let release = Release::new();
    let stranger = ReleaseSigner::generate();
    let artifact = release.artifact("build/sample.bin", b"abc");
    // anchor is the release key, manifests signed by someone else
    release.publish(&[("sample.bin", &DigestSet::from_bytes(b"abc"))], &stranger);

    let mut keyring = release.keyring();
    let report = TrustVerifier::new(release.layout(), &mut keyring).verify_artifact(&artifact);

    assert!(!report.passed());
    let invalid: Vec<_> = report
        .errors
        .iter()
        .filter_map(|e| match e {
            AttestError::SignatureInvalid { algorithm, .. } => Some(*algorithm),
            _ => None,
        })
        .collect();
    assert_eq!(invalid, ALGORITHMS.to_vec());
    assert!(hash_mismatches(&report.errors).is_empty());
}

#[test]
fn test_manifest_edited_after_signing() {
    let release = Release::new();
    let artifact = release.artifact("build/sample.bin", b"abc");
    release.publish(&[("sample.bin", &DigestSet::from_bytes(b"abc"))], &release.signer);

    let forged = DigestSet::from_bytes(b"forged");
    let blake = DigestAlgorithm::Blake2b.manifest_path(&release.signature_dir());
    fs::write(&blake, format!("{}  sample.bin\n", forged.blake2b)).unwrap();

    let mut keyring = release.keyring();
    let report = TrustVerifier::new(release.layout(), &mut keyring).verify_artifact(&artifact);

    assert!(!report.passed());
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(
        report.errors[0],
        AttestError::SignatureInvalid {
            algorithm: DigestAlgorithm::Blake2b,
            ..
        }
    ));
}

#[test]
fn test_missing_algorithm_manifest_is_hard_failure() {
    let release = Release::new();
    let artifact = release.artifact("build/sample.bin", b"abc");
    release.publish(&[("sample.bin", &DigestSet::from_bytes(b"abc"))], &release.signer);
    fs::remove_dir_all(release.signature_dir().join("BLAKE2b")).unwrap();

    let mut keyring = release.keyring();
    let report = TrustVerifier::new(release.layout(), &mut keyring).verify_artifact(&artifact);

    assert!(!report.passed());
    assert!(report
        .errors
        .iter()
        .any(|e| matches!(e, AttestError::ManifestMissing { .. })));
}

#[test]
fn test_generated_manifests_round_trip() {
    let release = Release::new();
    let source = release.dir.path().join("src");
    let files = [
        ("main.cpp", "int main() { return 0; }\n"),
        ("lib/codec.cpp", "// codec\n"),
        ("lib/codec.hpp", "#pragma once\n"),
        ("lib/Legacy.CPP", "// upper-case extension\n"),
    ];
    for (rel, content) in files {
        let path = source.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    let filter = SourceFilter::from_extensions(&["cpp", "hpp"]).unwrap();
    let generated = generate_manifests(&source, &filter).unwrap();
    assert_eq!(generated.file_count(), files.len());
    generated.write_to(&release.signature_dir()).unwrap();
    release.signer.sign_manifests(&release.signature_dir()).unwrap();

    let mut keyring = release.keyring();
    for (rel, _) in files {
        let report = TrustVerifier::new(release.layout(), &mut keyring).verify_artifact(&source.join(rel));
        assert!(report.passed(), "{}: {:?}", rel, report.errors);
        assert!(hash_mismatches(&report.errors).is_empty());
    }
}

#[test]
fn test_keygen_output_is_a_usable_anchor() {
    let release = Release::new();
    let keys = release.dir.path().join("keys");
    let (secret, public) = release.signer.write_keypair(&keys).unwrap();

    let reloaded = ReleaseSigner::load(&secret).unwrap();
    assert_eq!(reloaded.anchor().fingerprint(), release.signer.anchor().fingerprint());

    let mut keyring = release.keyring();
    let fingerprint = keyring.import(&public).unwrap();
    assert_eq!(fingerprint, release.signer.anchor().fingerprint());
    assert!(keyring.contains(&fingerprint).unwrap());
    assert!(release.signer.write_keypair(&keys).is_err());
}

#[test]
fn test_authenticate_without_artifact() {
    let release = Release::new();
    release.publish(&[("sample.bin", &DigestSet::from_bytes(b"abc"))], &release.signer);

    let mut keyring = release.keyring();
    let report = TrustVerifier::new(release.layout(), &mut keyring).authenticate();
    assert!(report.passed());
    assert!(report.artifact.is_none());

    let other = Path::new("/nonexistent/anchor.asc");
    let report = TrustVerifier::new(release.layout().with_trust_anchor(other), &mut keyring).authenticate();
    assert!(!report.passed());
    assert_eq!(report.errors[0].kind(), "SIGNATURE_IMPORT_FAILED");
}
