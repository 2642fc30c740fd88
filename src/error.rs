//! Failure taxonomy shared by resolution, orchestration and verification
//!
//! Resolution-class errors are recovered inside the resolver loop,
//! `BuildBackendFailed` is owned by the orchestrator's Failed state, and
//! verification-class errors only ever fail the verification stage.

use std::path::PathBuf;

use attest_manifest::DigestAlgorithm;
use serde::{Deserialize, Serialize};

/// Classified failure surfaced to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttestError {
    #[error("required tool '{tool}' is not reachable on the search path")]
    ToolUnresolved { tool: String },

    #[error("install command `{command}` failed: {detail}")]
    InstallCommandFailed { command: String, detail: String },

    #[error("manual path {} rejected: {reason}", path.display())]
    ManualPathInvalid { path: PathBuf, reason: String },

    #[error("build backend failed: {detail}")]
    BuildBackendFailed {
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("trust anchor import failed: {reason}")]
    SignatureImportFailed { reason: String },

    #[error("{algorithm} manifest signature invalid: {reason}")]
    SignatureInvalid {
        algorithm: DigestAlgorithm,
        reason: String,
    },

    #[error("required file missing or unreadable: {} ({reason})", path.display())]
    ManifestMissing { path: PathBuf, reason: String },

    #[error("artifact not found: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("{algorithm} digest of '{artifact}' not listed in manifest")]
    HashMismatch {
        algorithm: DigestAlgorithm,
        artifact: String,
    },
}

impl AttestError {
    /// Stable classification label
    pub fn kind(&self) -> &'static str {
        match self {
            AttestError::ToolUnresolved { .. } => "TOOL_UNRESOLVED",
            AttestError::InstallCommandFailed { .. } => "INSTALL_COMMAND_FAILED",
            AttestError::ManualPathInvalid { .. } => "MANUAL_PATH_INVALID",
            AttestError::BuildBackendFailed { .. } => "BUILD_BACKEND_FAILED",
            AttestError::SignatureImportFailed { .. } => "SIGNATURE_IMPORT_FAILED",
            AttestError::SignatureInvalid { .. } => "SIGNATURE_INVALID",
            AttestError::ManifestMissing { .. } => "MANIFEST_MISSING",
            AttestError::ArtifactMissing { .. } => "ARTIFACT_MISSING",
            AttestError::HashMismatch { .. } => "HASH_MISMATCH",
        }
    }

    /// Errors the resolver recovers from locally
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            AttestError::ToolUnresolved { .. }
                | AttestError::InstallCommandFailed { .. }
                | AttestError::ManualPathInvalid { .. }
        )
    }

    /// Errors that only fail the verification stage
    pub fn is_verification(&self) -> bool {
        matches!(
            self,
            AttestError::SignatureImportFailed { .. }
                | AttestError::SignatureInvalid { .. }
                | AttestError::ManifestMissing { .. }
                | AttestError::ArtifactMissing { .. }
                | AttestError::HashMismatch { .. }
        )
    }

    /// Render as `[KIND] message` for terminal output
    pub fn classified(&self) -> String {
        format!("[{}] {}", self.kind(), self)
    }
}

/// Describe a process exit code, `None` meaning killed by a signal
pub fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
