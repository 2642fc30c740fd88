//! Operator decisions
//!
//! Every interactive choice point of the pipeline goes through
//! [`DecisionProvider`]. The terminal implementation reads from any
//! `BufRead`; the scripted implementation replays queued answers so the
//! retry state machine can be exercised without a terminal.

pub mod scripted;
pub mod terminal;

use std::path::{Path, PathBuf};

use crate::build::config::BuildConfiguration;
use crate::build::state::BuildAttempt;
use crate::process::RemediationAction;

pub use scripted::ScriptedDecisions;
pub use terminal::TerminalDecisions;

/// Operator choice after a failed build attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run the backend again unchanged
    Retry,
    /// Add one override (name is sanitized by the orchestrator)
    SetOverride { name: String, value: String },
    /// Run a remediation command, then retry
    RunCommand(RemediationAction),
    Abort,
}

/// Operator choice when a required tool is not reachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRemedy {
    /// Ask for an install command and run it
    Install,
    /// Use this executable
    ManualPath(PathBuf),
    Abort,
}

/// Answer to the install-command prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandInput {
    Command(String),
    /// Return to the remedy menu
    Back,
    Abort,
}

/// Source of operator decisions
pub trait DecisionProvider {
    /// Pick variant, compiler and backend; `None` aborts
    fn select_configuration(&mut self, defaults: &BuildConfiguration) -> Option<BuildConfiguration>;

    /// Confirm the selection; `Some(false)` re-asks, `None` aborts
    fn confirm_configuration(&mut self, config: &BuildConfiguration) -> Option<bool>;

    /// Directory containing `build_file`, after `tried` lacked it; `None` aborts
    fn locate_build_dir(&mut self, build_file: &str, tried: &Path) -> Option<PathBuf>;

    fn tool_remedy(&mut self, tool: &str) -> ToolRemedy;

    fn install_command(&mut self, tool: &str, network_reachable: bool) -> CommandInput;

    fn on_build_failure(&mut self, attempt: &BuildAttempt) -> Decision;

    /// Final gate: run artifact verification?
    fn confirm_verification(&mut self) -> bool;

    /// Replacement trust anchor location after `missing` was not found; `None` gives up
    fn trust_anchor_path(&mut self, missing: &Path) -> Option<PathBuf>;

    /// Non-fatal notice for the operator
    fn warn(&mut self, _message: &str) {}
}
