//! Dependency resolution
//!
//! Makes sure a named external tool is reachable on the session search
//! path. When it is not, the operator picks a remedy: run an install
//! command, point at an executable, or abort. Resolution-class failures
//! are surfaced and the loop continues; only an explicit abort ends it.

pub mod search_path;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decision::{CommandInput, DecisionProvider, ToolRemedy};
use crate::error::{describe_exit, AttestError};
use crate::network::Connectivity;
use crate::process::{ProcessLauncher, RemediationAction, RemediationRecord};
use crate::session::SessionContext;

pub use search_path::SearchPath;

/// A dependency check and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequirement {
    pub name: String,
    pub resolved: Option<PathBuf>,
}

/// Result of a resolve call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(PathBuf),
    Aborted,
}

/// Resolves tools for one session, remembering what it already found
pub struct DependencyResolver {
    resolved: BTreeMap<String, ToolRequirement>,
    connectivity: Box<dyn Connectivity>,
    remediations: Vec<RemediationRecord>,
}

impl DependencyResolver {
    pub fn new(connectivity: Box<dyn Connectivity>) -> Self {
        Self {
            resolved: BTreeMap::new(),
            connectivity,
            remediations: Vec::new(),
        }
    }

    /// Install commands run since the last call
    pub fn take_remediations(&mut self) -> Vec<RemediationRecord> {
        std::mem::take(&mut self.remediations)
    }

    /// Ensure `tool` is reachable
    ///
    /// A tool resolved earlier in the session returns its cached path
    /// without probing, prompting or launching anything.
    pub fn resolve(
        &mut self,
        tool: &str,
        ctx: &mut SessionContext,
        decisions: &mut dyn DecisionProvider,
        launcher: &mut dyn ProcessLauncher,
    ) -> Resolution {
        if let Some(path) = self.resolved.get(tool).and_then(|req| req.resolved.clone()) {
            debug!(tool, path = %path.display(), "tool already resolved");
            return Resolution::Resolved(path);
        }

        loop {
            if let Some(path) = ctx.locate(tool) {
                return self.accept(tool, path);
            }

            let unresolved = AttestError::ToolUnresolved {
                tool: tool.to_string(),
            };
            warn!(tool, "{}", unresolved);
            decisions.warn(&unresolved.classified());

            match decisions.tool_remedy(tool) {
                ToolRemedy::Abort => {
                    info!(tool, "resolution aborted by operator");
                    return Resolution::Aborted;
                }
                ToolRemedy::ManualPath(path) => {
                    if let Some(resolved) = self.try_manual_path(tool, &path, ctx, decisions) {
                        return self.accept(tool, resolved);
                    }
                }
                ToolRemedy::Install => {
                    if self.run_install(tool, ctx, decisions, launcher).is_none() {
                        info!(tool, "resolution aborted by operator");
                        return Resolution::Aborted;
                    }
                }
            }
        }
    }

    fn accept(&mut self, tool: &str, path: PathBuf) -> Resolution {
        info!(tool, path = %path.display(), "tool resolved");
        self.resolved.insert(
            tool.to_string(),
            ToolRequirement {
                name: tool.to_string(),
                resolved: Some(path.clone()),
            },
        );
        Resolution::Resolved(path)
    }

    /// Validate an operator-supplied executable and put its directory first
    ///
    /// Decision providers hand back absolute paths; anything else is refused.
    fn try_manual_path(
        &mut self,
        tool: &str,
        path: &Path,
        ctx: &mut SessionContext,
        decisions: &mut dyn DecisionProvider,
    ) -> Option<PathBuf> {
        let path = path.to_path_buf();
        let checked = match path.is_absolute() {
            true => check_executable(&path),
            false => Err("path is not absolute".to_string()),
        };
        if let Err(reason) = checked {
            let err = AttestError::ManualPathInvalid {
                path: path.clone(),
                reason,
            };
            warn!(tool, "{}", err);
            decisions.warn(&err.classified());
            return None;
        }

        let Some(dir) = path.parent() else {
            let err = AttestError::ManualPathInvalid {
                path: path.clone(),
                reason: "path has no parent directory".to_string(),
            };
            decisions.warn(&err.classified());
            return None;
        };
        ctx.search_path.prepend(dir);
        info!(tool, dir = %dir.display(), "prepended directory to search path");
        Some(path)
    }

    /// One install round; `None` means the operator aborted
    fn run_install(
        &mut self,
        tool: &str,
        ctx: &mut SessionContext,
        decisions: &mut dyn DecisionProvider,
        launcher: &mut dyn ProcessLauncher,
    ) -> Option<()> {
        let reachable = self.connectivity.is_reachable();
        if !reachable {
            warn!(tool, "network appears unreachable");
            decisions.warn("Network appears unreachable; install commands that download may fail");
        }

        let command = match decisions.install_command(tool, reachable) {
            CommandInput::Abort => return None,
            CommandInput::Back => return Some(()),
            CommandInput::Command(command) => command,
        };

        let action = RemediationAction::installing(command, tool);
        let invocation = action.to_invocation(ctx.working_dir(), ctx.compose_env());
        info!(tool, command = %action.command, "running install command");

        let (exit_code, launch_error) = match launcher.run(&invocation) {
            Ok(code) => (code, None),
            Err(e) => (None, Some(e.to_string())),
        };

        let postcondition_met = exit_code == Some(0) && ctx.locate(tool).is_some();
        if exit_code != Some(0) {
            let detail = launch_error
                .clone()
                .unwrap_or_else(|| describe_exit(exit_code));
            let err = AttestError::InstallCommandFailed {
                command: action.command.clone(),
                detail,
            };
            warn!(tool, "{}", err);
            decisions.warn(&err.classified());
        } else if !postcondition_met {
            decisions.warn(&format!(
                "Install command succeeded but '{}' is still not reachable",
                tool
            ));
        }

        self.remediations.push(RemediationRecord {
            after_attempt: 0,
            action,
            exit_code,
            launch_error,
            postcondition_met,
        });
        Some(())
    }
}

/// A manual path must name an existing executable regular file
fn check_executable(path: &Path) -> Result<(), String> {
    let meta = fs::metadata(path).map_err(|e| format!("cannot stat: {}", e))?;
    if !meta.is_file() {
        return Err("not a regular file".to_string());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err("not executable".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ScriptedDecisions;
    use crate::network::FixedConnectivity;
    use crate::process::Invocation;
    use std::io;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingLauncher {
        calls: Vec<Invocation>,
    }

    impl ProcessLauncher for CountingLauncher {
        fn run(&mut self, invocation: &Invocation) -> io::Result<Option<i32>> {
            self.calls.push(invocation.clone());
            Ok(Some(0))
        }
    }

    fn empty_context(dir: &Path) -> SessionContext {
        SessionContext::new(BTreeMap::new(), SearchPath::new(vec![dir.join("bin")]), dir)
    }

    #[test]
    fn test_abort_immediately() {
        let dir = TempDir::new().unwrap();
        let mut ctx = empty_context(dir.path());
        let mut decisions = ScriptedDecisions::new().with_tool_remedies([ToolRemedy::Abort]);
        let mut launcher = CountingLauncher::default();
        let mut resolver = DependencyResolver::new(Box::new(FixedConnectivity(true)));

        let result = resolver.resolve("nonexistent-tool-xyz", &mut ctx, &mut decisions, &mut launcher);
        assert_eq!(result, Resolution::Aborted);
        assert!(launcher.calls.is_empty());
        assert_eq!(decisions.tool_remedy_prompts(), 1);
    }

    #[test]
    fn test_manual_path_missing_file_loops() {
        let dir = TempDir::new().unwrap();
        let mut ctx = empty_context(dir.path());
        let mut decisions = ScriptedDecisions::new().with_tool_remedies([
            ToolRemedy::ManualPath(dir.path().join("nope")),
            ToolRemedy::Abort,
        ]);
        let mut launcher = CountingLauncher::default();
        let mut resolver = DependencyResolver::new(Box::new(FixedConnectivity(true)));

        let result = resolver.resolve("cmake", &mut ctx, &mut decisions, &mut launcher);
        assert_eq!(result, Resolution::Aborted);
        assert!(decisions
            .warnings()
            .iter()
            .any(|w| w.starts_with("[MANUAL_PATH_INVALID]")));
    }

    #[test]
    fn test_relative_manual_path_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut ctx = empty_context(dir.path());
        let mut decisions = ScriptedDecisions::new()
            .with_tool_remedies([ToolRemedy::ManualPath(PathBuf::from("bin/cmake")), ToolRemedy::Abort]);
        let mut launcher = CountingLauncher::default();
        let mut resolver = DependencyResolver::new(Box::new(FixedConnectivity(true)));

        let result = resolver.resolve("cmake", &mut ctx, &mut decisions, &mut launcher);
        assert_eq!(result, Resolution::Aborted);
        assert!(decisions
            .warnings()
            .iter()
            .any(|w| w.starts_with("[MANUAL_PATH_INVALID]") && w.contains("not absolute")));
    }

    #[cfg(unix)]
    #[test]
    fn test_manual_path_not_executable() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cmake");
        fs::write(&file, "not a program").unwrap();
        assert_eq!(check_executable(&file), Err("not executable".to_string()));
        assert!(check_executable(dir.path()).is_err());
    }

    #[test]
    fn test_install_back_returns_to_menu() {
        let dir = TempDir::new().unwrap();
        let mut ctx = empty_context(dir.path());
        let mut decisions = ScriptedDecisions::new()
            .with_tool_remedies([ToolRemedy::Install, ToolRemedy::Abort])
            .with_install_commands([CommandInput::Back]);
        let mut launcher = CountingLauncher::default();
        let mut resolver = DependencyResolver::new(Box::new(FixedConnectivity(true)));

        let result = resolver.resolve("cmake", &mut ctx, &mut decisions, &mut launcher);
        assert_eq!(result, Resolution::Aborted);
        assert!(launcher.calls.is_empty());
        assert_eq!(decisions.tool_remedy_prompts(), 2);
    }

    #[test]
    fn test_unreachable_network_warns() {
        let dir = TempDir::new().unwrap();
        let mut ctx = empty_context(dir.path());
        let mut decisions = ScriptedDecisions::new()
            .with_tool_remedies([ToolRemedy::Install])
            .with_install_commands([CommandInput::Abort]);
        let mut launcher = CountingLauncher::default();
        let mut resolver = DependencyResolver::new(Box::new(FixedConnectivity(false)));

        let result = resolver.resolve("cmake", &mut ctx, &mut decisions, &mut launcher);
        assert_eq!(result, Resolution::Aborted);
        assert!(decisions
            .warnings()
            .iter()
            .any(|w| w.contains("Network appears unreachable")));
    }

    #[test]
    fn test_successful_install_without_tool_loops() {
        let dir = TempDir::new().unwrap();
        let mut ctx = empty_context(dir.path());
        let mut decisions = ScriptedDecisions::new()
            .with_tool_remedies([ToolRemedy::Install, ToolRemedy::Abort])
            .with_install_commands([CommandInput::Command("true".to_string())]);
        let mut launcher = CountingLauncher::default();
        let mut resolver = DependencyResolver::new(Box::new(FixedConnectivity(true)));

        let result = resolver.resolve("cmake", &mut ctx, &mut decisions, &mut launcher);
        assert_eq!(result, Resolution::Aborted);
        assert_eq!(launcher.calls.len(), 1);

        let records = resolver.take_remediations();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].exit_code, Some(0));
        assert!(!records[0].postcondition_met);
    }
}
