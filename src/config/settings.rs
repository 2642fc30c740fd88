//! Typed settings resolved from the effective configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::effective::{config_home, ConfigError, EffectiveConfig, HOST_CONFIG_FILE, REPO_CONFIG_FILE};
use super::overrides::CliOverrides;
use crate::build::config::{BackendKind, BuildConfiguration, BuildVariant, CompilerFamily};
use crate::network::{TcpProbe, DEFAULT_PROBE_ADDRESS};

/// Accepted range for `network.probe_timeout_seconds`
pub const PROBE_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyringKind {
    Native,
    Gpg,
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    build: RawBuild,
    #[serde(default)]
    artifact: RawArtifact,
    #[serde(default)]
    verify: RawVerify,
    #[serde(default)]
    network: RawNetwork,
    #[serde(default)]
    audit: RawAudit,
}

#[derive(Debug, Default, Deserialize)]
struct RawBuild {
    variant: Option<BuildVariant>,
    compiler: Option<CompilerFamily>,
    backend: Option<BackendKind>,
    parallel: Option<i64>,
    interactive_config: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawArtifact {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawVerify {
    signature_dir: Option<PathBuf>,
    trust_anchor: Option<PathBuf>,
    keyring: Option<KeyringKind>,
    keyring_dir: Option<PathBuf>,
    gpg_homedir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNetwork {
    probe_address: Option<String>,
    probe_timeout_seconds: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAudit {
    session_file: Option<PathBuf>,
}

/// Validated settings for one invocation
///
/// Relative paths are resolved against the source directory, except
/// `keyring_dir`, which defaults under the configuration home.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub configuration: BuildConfiguration,
    pub parallel: Option<u32>,
    pub interactive_config: bool,
    pub artifact_name: String,
    pub signature_dir: PathBuf,
    pub trust_anchor: PathBuf,
    pub keyring: KeyringKind,
    pub keyring_dir: PathBuf,
    /// `--homedir` passed to `gpg`; unset uses gpg's own default
    pub gpg_homedir: Option<PathBuf>,
    pub probe_address: SocketAddr,
    pub probe_timeout: Duration,
    pub session_file: PathBuf,
}

impl Settings {
    /// Resolve and validate against a source directory
    pub fn resolve(effective: &EffectiveConfig, source_dir: &Path, config_home: &Path) -> Result<Self, ConfigError> {
        let merged = effective
            .merged()
            .cloned()
            .ok_or_else(|| ConfigError::Validation("configuration was not built from layers".into()))?;
        let raw = merged
            .try_into::<RawSettings>()
            .map_err(|e| ConfigError::Validation(e.message().to_string()))?;

        let configuration = BuildConfiguration::new(
            raw.build.variant.unwrap_or_default(),
            raw.build.compiler.unwrap_or_default(),
            raw.build.backend.unwrap_or_default(),
        );

        let parallel = match raw.build.parallel {
            None => None,
            Some(n) if n > 0 && n <= u32::MAX as i64 => Some(n as u32),
            Some(n) => {
                return Err(ConfigError::Validation(format!(
                    "build.parallel must be a positive integer, got {}",
                    n
                )))
            }
        };

        let timeout = raw.network.probe_timeout_seconds.unwrap_or(5);
        let timeout = u64::try_from(timeout)
            .ok()
            .filter(|t| PROBE_TIMEOUT_RANGE.contains(t))
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "network.probe_timeout_seconds must be in {}..={}, got {}",
                    PROBE_TIMEOUT_RANGE.start(),
                    PROBE_TIMEOUT_RANGE.end(),
                    timeout
                ))
            })?;

        let probe_address = match raw.network.probe_address {
            None => DEFAULT_PROBE_ADDRESS,
            Some(address) => address.trim().parse::<SocketAddr>().map_err(|_| {
                ConfigError::Validation(format!(
                    "network.probe_address must be an IP address and port such as {}, got {:?}",
                    DEFAULT_PROBE_ADDRESS, address
                ))
            })?,
        };

        let artifact_name = match raw.artifact.name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => default_artifact_name(source_dir)?,
        };

        let signature_dir = anchored(source_dir, raw.verify.signature_dir.unwrap_or_else(|| "signature".into()));
        let trust_anchor = match raw.verify.trust_anchor {
            Some(path) => anchored(source_dir, path),
            None => signature_dir.join(attest_manifest::TRUST_ANCHOR_FILE),
        };

        Ok(Self {
            configuration,
            parallel,
            interactive_config: raw.build.interactive_config.unwrap_or(true),
            artifact_name,
            signature_dir,
            trust_anchor,
            keyring: raw.verify.keyring.unwrap_or(KeyringKind::Native),
            keyring_dir: raw.verify.keyring_dir.unwrap_or_else(|| config_home.join("keyring")),
            gpg_homedir: raw.verify.gpg_homedir.map(|path| anchored(source_dir, path)),
            probe_address,
            probe_timeout: Duration::from_secs(timeout),
            session_file: anchored(
                source_dir,
                raw.audit
                    .session_file
                    .unwrap_or_else(|| super::defaults::DEFAULT_SESSION_FILE.into()),
            ),
        })
    }

    /// Build every layer for `source_dir` and resolve
    ///
    /// An explicit `repo_config` replaces `<source>/.attest/build.toml` and
    /// must exist.
    pub fn load(
        source_dir: &Path,
        repo_config: Option<&Path>,
        cli: &CliOverrides,
    ) -> Result<(EffectiveConfig, Settings), ConfigError> {
        let repo = match repo_config {
            Some(path) if !path.is_file() => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    reason: "configuration file not found".into(),
                })
            }
            Some(path) => path.to_path_buf(),
            None => source_dir.join(REPO_CONFIG_FILE),
        };
        let home = config_home()?;
        let host = home.join(HOST_CONFIG_FILE);

        let effective = EffectiveConfig::build(Some(&host), Some(&repo), cli.to_value())?;
        let settings = Self::resolve(&effective, source_dir, &home)?;
        Ok((effective, settings))
    }

    pub fn probe(&self) -> TcpProbe {
        TcpProbe::new(self.probe_address, self.probe_timeout)
    }
}

fn anchored(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Last component of the source directory
fn default_artifact_name(source_dir: &Path) -> Result<String, ConfigError> {
    let absolute;
    let dir = if source_dir.file_name().is_some() {
        source_dir
    } else {
        absolute = std::fs::canonicalize(source_dir).map_err(|e| ConfigError::Io {
            path: source_dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        absolute.as_path()
    };
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ConfigError::Validation("artifact.name is required for this source directory".into()))
}
