//! End-to-end flows behind the CLI commands
//!
//! The build flow is: choose and confirm a configuration, locate the build
//! directory, run the orchestrator, write the session audit, report the
//! artifact digests, then (if the operator agrees) verify the artifact
//! against the signed manifests.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use attest_manifest::{
    generate_manifests, DigestError, DigestSet, GenerateError, GeneratedManifests, ManifestError,
    SourceFilter, ALGORITHMS,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::build::config::BuildConfiguration;
use crate::build::orchestrator::{BuildOrchestrator, OrchestratorError};
use crate::build::state::{OrchestratorState, SessionRecord, SessionRecordError};
use crate::config::{ConfigError, EffectiveConfig, KeyringKind, Settings};
use crate::decision::DecisionProvider;
use crate::error::AttestError;
use crate::network::Connectivity;
use crate::process::ProcessLauncher;
use crate::resolve::{DependencyResolver, Resolution};
use crate::session::SessionContext;
use crate::signal::SignalState;
use crate::trust::{
    GpgKeyring, Keyring, KeyringError, LocalKeyring, ReleaseSigner, SignatureLayout, SigningError,
    TrustVerifier, VerificationReport,
};

/// Effective configuration file written beside the session audit
pub const EFFECTIVE_CONFIG_FILE: &str = "effective_config.json";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("orchestration error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("session audit error: {0}")]
    Audit(#[from] SessionRecordError),

    #[error("keyring error: {0}")]
    Keyring(#[from] KeyringError),

    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("manifest generation error: {0}")]
    Generate(#[from] GenerateError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("digest error: {0}")]
    Digest(#[from] DigestError),

    #[error("{}", .0.classified())]
    Attest(#[from] AttestError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Every error is a failed run
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Whether the post-build verification is asked, forced or skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyGate {
    #[default]
    Ask,
    Always,
    Never,
}

#[derive(Debug, Clone)]
pub enum VerificationStatus {
    /// The build never reached the gate
    NotReached,
    Declined,
    Completed(VerificationReport),
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub state: OrchestratorState,
    pub configuration: Option<BuildConfiguration>,
    pub build_dir: Option<PathBuf>,
    pub artifact: Option<PathBuf>,
    pub digests: Option<DigestSet>,
    pub verification: VerificationStatus,
    pub session_file: Option<PathBuf>,
}

impl BuildOutcome {
    fn aborted_before_build(configuration: Option<BuildConfiguration>) -> Self {
        Self {
            state: OrchestratorState::Aborted,
            configuration,
            build_dir: None,
            artifact: None,
            digests: None,
            verification: VerificationStatus::NotReached,
            session_file: None,
        }
    }

    /// 0 iff the build succeeded and verification passed or was declined
    pub fn exit_code(&self) -> i32 {
        let verified = match &self.verification {
            VerificationStatus::Declined => true,
            VerificationStatus::Completed(report) => report.passed(),
            VerificationStatus::NotReached => false,
        };
        if self.state == OrchestratorState::Succeeded && verified {
            0
        } else {
            1
        }
    }
}

/// The `build` command
pub struct BuildPipeline {
    settings: Settings,
    source_dir: PathBuf,
    gate: VerifyGate,
    interrupt: Option<Arc<SignalState>>,
    effective: Option<EffectiveConfig>,
}

impl BuildPipeline {
    pub fn new(settings: Settings, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            source_dir: source_dir.into(),
            gate: VerifyGate::Ask,
            interrupt: None,
            effective: None,
        }
    }

    pub fn with_verify_gate(mut self, gate: VerifyGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_interrupt(mut self, state: Arc<SignalState>) -> Self {
        self.interrupt = Some(state);
        self
    }

    /// Record this configuration beside the session audit
    pub fn with_effective_config(mut self, effective: EffectiveConfig) -> Self {
        self.effective = Some(effective);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn run(
        &self,
        mut ctx: SessionContext,
        connectivity: Box<dyn Connectivity>,
        decisions: &mut dyn DecisionProvider,
        launcher: &mut dyn ProcessLauncher,
        out: &mut dyn Write,
    ) -> PipelineResult<BuildOutcome> {
        let Some(configuration) = self.choose_configuration(decisions) else {
            info!("configuration selection aborted");
            return Ok(BuildOutcome::aborted_before_build(None));
        };
        writeln!(out, "Configuration: {}", configuration)?;

        let Some(build_dir) = locate_build_dir(&self.source_dir, &configuration, decisions) else {
            info!("build directory selection aborted");
            return Ok(BuildOutcome::aborted_before_build(Some(configuration)));
        };
        ctx.set_working_dir(&build_dir);

        let mut orchestrator = BuildOrchestrator::new(configuration, ctx, DependencyResolver::new(connectivity))
            .with_parallelism(self.settings.parallel);
        if let Some(interrupt) = &self.interrupt {
            orchestrator = orchestrator.with_interrupt(Arc::clone(interrupt));
        }
        let state = orchestrator.run(decisions, launcher)?;
        let (mut ctx, mut resolver, record) = orchestrator.into_parts();
        self.write_audit(&record)?;
        match record.attempts.len() {
            0 => writeln!(out, "Build {} before the first attempt", state_label(state))?,
            n => writeln!(out, "Build {} (attempt {})", state_label(state), n)?,
        }

        let mut outcome = BuildOutcome {
            state,
            configuration: Some(configuration),
            build_dir: Some(build_dir.clone()),
            artifact: None,
            digests: None,
            verification: VerificationStatus::NotReached,
            session_file: Some(self.settings.session_file.clone()),
        };
        if state != OrchestratorState::Succeeded {
            return Ok(outcome);
        }

        let artifact = build_dir.join(&self.settings.artifact_name);
        outcome.digests = report_digests(&artifact, out)?;
        outcome.artifact = Some(artifact.clone());

        let verify = match self.gate {
            VerifyGate::Always => true,
            VerifyGate::Never => false,
            VerifyGate::Ask => decisions.confirm_verification(),
        };
        if !verify {
            info!("artifact verification declined");
            outcome.verification = VerificationStatus::Declined;
            return Ok(outcome);
        }

        let anchor = locate_trust_anchor(self.settings.trust_anchor.clone(), decisions);
        let layout = SignatureLayout::new(&self.settings.signature_dir).with_trust_anchor(anchor);
        let mut keyring = match self.settings.keyring {
            KeyringKind::Native => Box::new(LocalKeyring::new(&self.settings.keyring_dir)) as Box<dyn Keyring>,
            KeyringKind::Gpg => match resolver.resolve("gpg", &mut ctx, decisions, launcher) {
                Resolution::Resolved(path) => Box::new(gpg_keyring(&self.settings, path, &ctx)),
                Resolution::Aborted => {
                    return Err(AttestError::ToolUnresolved { tool: "gpg".into() }.into());
                }
            },
        };

        let report = TrustVerifier::new(layout, keyring.as_mut()).verify_artifact(&artifact);
        print_report(&report, out)?;
        writeln!(
            out,
            "Result: built, {}",
            if report.passed() { "verified" } else { "unverified" }
        )?;
        outcome.verification = VerificationStatus::Completed(report);
        Ok(outcome)
    }

    /// Configured choice, or the operator's confirmed selection
    fn choose_configuration(&self, decisions: &mut dyn DecisionProvider) -> Option<BuildConfiguration> {
        if !self.settings.interactive_config {
            return Some(self.settings.configuration);
        }

        let mut defaults = self.settings.configuration;
        loop {
            let chosen = decisions.select_configuration(&defaults)?;
            match decisions.confirm_configuration(&chosen)? {
                true => return Some(chosen),
                false => defaults = chosen,
            }
        }
    }

    fn write_audit(&self, record: &SessionRecord) -> PipelineResult<()> {
        let path = &self.settings.session_file;
        record.write_to_file(path)?;
        info!(path = %path.display(), attempts = record.attempts.len(), "wrote session audit");

        if let (Some(effective), Some(dir)) = (&self.effective, path.parent()) {
            fs::write(dir.join(EFFECTIVE_CONFIG_FILE), effective.to_json()?)?;
        }
        Ok(())
    }
}

fn state_label(state: OrchestratorState) -> &'static str {
    match state {
        OrchestratorState::Succeeded => "succeeded",
        OrchestratorState::Failed => "failed",
        OrchestratorState::Aborted => "aborted",
        OrchestratorState::Idle | OrchestratorState::Running => "incomplete",
    }
}

/// First directory that holds the backend's build file
fn locate_build_dir(
    source_dir: &Path,
    configuration: &BuildConfiguration,
    decisions: &mut dyn DecisionProvider,
) -> Option<PathBuf> {
    let build_file = configuration.backend.build_file();
    let mut dir = source_dir.to_path_buf();
    while !dir.join(build_file).is_file() {
        warn!(dir = %dir.display(), build_file, "build file not found");
        dir = decisions.locate_build_dir(build_file, &dir)?;
    }
    Some(dir)
}

/// Ask for another anchor until one exists or the operator gives up
fn locate_trust_anchor(mut anchor: PathBuf, decisions: &mut dyn DecisionProvider) -> PathBuf {
    while !anchor.is_file() {
        match decisions.trust_anchor_path(&anchor) {
            Some(next) => anchor = next,
            None => break,
        }
    }
    anchor
}

/// Print both digests of a built artifact
pub fn report_digests(artifact: &Path, out: &mut dyn Write) -> PipelineResult<Option<DigestSet>> {
    if !artifact.is_file() {
        writeln!(out, "Artifact not found: {}", artifact.display())?;
        return Ok(None);
    }
    let digests = DigestSet::from_file(artifact)?;
    writeln!(out, "Artifact: {}", artifact.display())?;
    write_digests(&digests, out)?;
    Ok(Some(digests))
}

fn write_digests(digests: &DigestSet, out: &mut dyn Write) -> io::Result<()> {
    for algorithm in ALGORITHMS {
        writeln!(out, "  {:<8} {}", algorithm.name(), digests.get(algorithm))?;
    }
    Ok(())
}

/// Human-readable verification summary
pub fn print_report(report: &VerificationReport, out: &mut dyn Write) -> io::Result<()> {
    if let Some(fp) = &report.fingerprint {
        writeln!(out, "Trust anchor: {} ({})", report.trust_anchor.display(), fp)?;
    }
    for check in &report.checks {
        let digest = match (&report.artifact, check.digest_found, &check.matched_path) {
            (None, _, _) => String::new(),
            (Some(_), true, Some(path)) => format!(", artifact listed as {}", path),
            (Some(_), _, _) => ", artifact not listed".to_string(),
        };
        writeln!(
            out,
            "  {:<8} signature {}{}",
            check.algorithm.name(),
            if check.signature_valid { "valid" } else { "INVALID" },
            digest
        )?;
    }
    for error in &report.errors {
        writeln!(out, "  {}", error.classified())?;
    }
    writeln!(out, "Verification {}", if report.passed() { "PASSED" } else { "FAILED" })
}

/// Keyring for the non-interactive commands
///
/// The GnuPG keyring needs `gpg` on the search path already.
pub fn open_keyring(settings: &Settings, ctx: &SessionContext) -> PipelineResult<Box<dyn Keyring>> {
    match settings.keyring {
        KeyringKind::Native => Ok(Box::new(LocalKeyring::new(&settings.keyring_dir))),
        KeyringKind::Gpg => {
            let gpg = ctx
                .locate("gpg")
                .ok_or_else(|| AttestError::ToolUnresolved { tool: "gpg".into() })?;
            Ok(Box::new(gpg_keyring(settings, gpg, ctx)))
        }
    }
}

fn gpg_keyring(settings: &Settings, program: PathBuf, ctx: &SessionContext) -> GpgKeyring {
    let keyring = GpgKeyring::new(program).with_env(ctx.compose_env());
    match &settings.gpg_homedir {
        Some(home) => keyring.with_homedir(home),
        None => keyring,
    }
}

/// The `verify` command
pub fn verify_artifact(
    artifact: &Path,
    layout: SignatureLayout,
    keyring: &mut dyn Keyring,
    out: &mut dyn Write,
) -> PipelineResult<VerificationReport> {
    let report = TrustVerifier::new(layout, keyring).verify_artifact(artifact);
    print_report(&report, out)?;
    Ok(report)
}

/// The `authenticate` command
pub fn authenticate(
    layout: SignatureLayout,
    keyring: &mut dyn Keyring,
    out: &mut dyn Write,
) -> PipelineResult<VerificationReport> {
    let report = TrustVerifier::new(layout, keyring).authenticate();
    print_report(&report, out)?;
    Ok(report)
}

/// The `manifest` command: hash a source tree into both manifests
///
/// When the output directory lies inside the source tree it is left out of
/// the manifests.
pub fn write_manifests<S: AsRef<str>>(
    source_dir: &Path,
    signature_dir: &Path,
    extensions: &[S],
) -> PipelineResult<GeneratedManifests> {
    let mut filter = SourceFilter::from_extensions(extensions)?;
    if let Ok(rel) = signature_dir.strip_prefix(source_dir) {
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        filter = filter.excluding_dir(rel);
    }

    let generated = generate_manifests(source_dir, &filter)?;
    let written = generated.write_to(signature_dir)?;
    info!(files = generated.file_count(), manifests = written.len(), "wrote manifests");
    Ok(generated)
}

/// The `keygen` command; returns the secret key path, the trust anchor path
/// and the key fingerprint
pub fn generate_keypair(out_dir: &Path) -> PipelineResult<(PathBuf, PathBuf, String)> {
    let signer = ReleaseSigner::generate();
    let (secret, public) = signer.write_keypair(out_dir)?;
    Ok((secret, public, signer.anchor().fingerprint().to_string()))
}

/// The `sign` command
pub fn sign_manifests(secret_key: &Path, signature_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let signer = ReleaseSigner::load(secret_key)?;
    Ok(signer.sign_manifests(signature_dir)?)
}

/// The `hash` command
pub fn hash_file(path: &Path, out: &mut dyn Write) -> PipelineResult<DigestSet> {
    let digests = DigestSet::from_file(path)?;
    write_digests(&digests, out)?;
    Ok(digests)
}
