//! External process invocation
//!
//! Every external program (build backend steps, operator remediation
//! commands) is described as an [`Invocation`] and handed to a
//! [`ProcessLauncher`]. Launches are synchronous; the caller blocks until
//! the child exits.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A fully specified external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Complete child environment; nothing is inherited implicitly
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Command line as shown to the operator
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Runs invocations to completion
pub trait ProcessLauncher {
    /// Run and wait; `Ok(None)` means the child was killed by a signal
    fn run(&mut self, invocation: &Invocation) -> io::Result<Option<i32>>;
}

/// Launches real child processes with inherited stdio
#[derive(Debug, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn run(&mut self, invocation: &Invocation) -> io::Result<Option<i32>> {
        debug!(command = %invocation, cwd = %invocation.cwd.display(), "launching process");
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .env_clear()
            .envs(&invocation.env)
            .status()?;
        Ok(status.code())
    }
}

/// What must hold after a remediation command for it to count as effective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Postcondition {
    /// Nothing is checked; the next build attempt is the judge
    None,
    /// The named tool must be reachable on the search path afterwards
    ToolReachable(String),
}

/// Operator-supplied shell command, kept opaque until executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub command: String,
    pub postcondition: Postcondition,
}

impl RemediationAction {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            postcondition: Postcondition::None,
        }
    }

    /// Action that is only effective once `tool` becomes reachable
    pub fn installing(command: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            postcondition: Postcondition::ToolReachable(tool.into()),
        }
    }

    /// Shell invocation executing the command text verbatim
    pub fn to_invocation(&self, cwd: &Path, env: BTreeMap<String, String>) -> Invocation {
        let (shell, flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Invocation::new(shell, cwd)
            .arg(flag)
            .arg(self.command.clone())
            .with_env(env)
    }
}

/// Audit entry for one executed remediation action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRecord {
    /// Attempt ordinal this action followed (0 before the first attempt)
    pub after_attempt: u32,
    pub action: RemediationAction,
    /// `None` when the process was killed or could not be launched
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_error: Option<String>,
    /// Whether the postcondition held afterwards
    pub postcondition_met: bool,
}
