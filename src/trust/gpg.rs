//! GnuPG-backed keyring
//!
//! Drives the external `gpg` tool for releases signed with OpenPGP keys.
//! Output is captured rather than inherited so fingerprints and status
//! lines can be parsed.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info};

use super::keyring::{Keyring, KeyringError, SignatureCheck};

pub struct GpgKeyring {
    program: PathBuf,
    homedir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl GpgKeyring {
    /// `program` is the resolved `gpg` executable
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            homedir: None,
            env: Vec::new(),
        }
    }

    /// Use a dedicated GnuPG home instead of the user's default
    pub fn with_homedir(mut self, homedir: impl Into<PathBuf>) -> Self {
        self.homedir = Some(homedir.into());
        self
    }

    pub fn homedir(&self) -> Option<&Path> {
        self.homedir.as_deref()
    }

    /// Environment for the child (typically the composed session environment)
    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = env.into_iter().collect();
        self
    }

    fn run(&self, args: &[&str]) -> Result<Output, KeyringError> {
        let mut cmd = Command::new(&self.program);
        if !self.env.is_empty() {
            cmd.env_clear().envs(self.env.iter().map(|(k, v)| (k, v)));
        }
        cmd.arg("--batch");
        if let Some(home) = &self.homedir {
            cmd.arg("--homedir").arg(home);
        }
        cmd.args(args);
        debug!(program = %self.program.display(), ?args, "running gpg");
        cmd.output()
            .map_err(|e| KeyringError::Tool(format!("cannot run {}: {}", self.program.display(), e)))
    }
}

fn path_arg(path: &Path) -> Result<&str, KeyringError> {
    path.to_str()
        .ok_or_else(|| KeyringError::Tool(format!("non UTF-8 path {}", path.display())))
}

fn stderr_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("gpg failed without a message")
        .to_string()
}

/// First `fpr` record of `--with-colons` output (field 10)
pub fn parse_colons_fingerprint(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter(|line| line.starts_with("fpr:"))
        .filter_map(|line| line.split(':').nth(9))
        .find(|fpr| !fpr.is_empty())
        .map(str::to_string)
}

/// Primary key fingerprint from a `[GNUPG:] VALIDSIG` status line
///
/// The primary key fingerprint is the tenth argument when present,
/// otherwise the signing key fingerprint (first argument) is used.
pub fn parse_validsig(status: &str) -> Option<String> {
    status.lines().find_map(|line| {
        let rest = line.strip_prefix("[GNUPG:] VALIDSIG ")?;
        let fields: Vec<&str> = rest.split_whitespace().collect();
        fields.get(9).or_else(|| fields.first()).map(|s| s.to_string())
    })
}

impl Keyring for GpgKeyring {
    fn fingerprint_of(&mut self, anchor: &Path) -> Result<String, KeyringError> {
        let output = self.run(&[
            "--with-colons",
            "--import-options",
            "show-only",
            "--import",
            path_arg(anchor)?,
        ])?;
        if !output.status.success() {
            return Err(KeyringError::Tool(stderr_summary(&output)));
        }
        parse_colons_fingerprint(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| KeyringError::Tool(format!("no fingerprint in {}", anchor.display())))
    }

    fn contains(&mut self, fingerprint: &str) -> Result<bool, KeyringError> {
        let output = self.run(&["--list-keys", fingerprint])?;
        Ok(output.status.success())
    }

    fn import(&mut self, anchor: &Path) -> Result<String, KeyringError> {
        let fingerprint = self.fingerprint_of(anchor)?;
        let output = self.run(&["--import", path_arg(anchor)?])?;
        if !output.status.success() {
            return Err(KeyringError::Tool(stderr_summary(&output)));
        }
        info!(fingerprint = %fingerprint, "imported key into gpg keyring");
        Ok(fingerprint)
    }

    fn verify_detached(&mut self, data: &Path, signature: &Path) -> Result<SignatureCheck, KeyringError> {
        let output = self.run(&[
            "--status-fd",
            "1",
            "--verify",
            path_arg(signature)?,
            path_arg(data)?,
        ])?;
        let status = String::from_utf8_lossy(&output.stdout);
        match parse_validsig(&status) {
            Some(fingerprint) if output.status.success() => Ok(SignatureCheck::Valid { fingerprint }),
            _ => Ok(SignatureCheck::Invalid {
                reason: stderr_summary(&output),
            }),
        }
    }
}
