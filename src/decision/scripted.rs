//! Deterministic decision provider
//!
//! Answers come from per-prompt queues. An exhausted queue answers with the
//! abort choice for that prompt, so a script that runs out always
//! terminates.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::{CommandInput, Decision, DecisionProvider, ToolRemedy};
use crate::build::config::BuildConfiguration;
use crate::build::state::BuildAttempt;

#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    configurations: VecDeque<Option<BuildConfiguration>>,
    confirmations: VecDeque<Option<bool>>,
    build_dirs: VecDeque<PathBuf>,
    tool_remedies: VecDeque<ToolRemedy>,
    install_commands: VecDeque<CommandInput>,
    failure_decisions: VecDeque<Decision>,
    verify: bool,
    trust_anchor_paths: VecDeque<PathBuf>,

    tool_remedy_prompts: usize,
    failures_seen: Vec<BuildAttempt>,
    warnings: Vec<String>,
}

impl ScriptedDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue configuration answers; `None` aborts
    ///
    /// With an empty queue the offered defaults are taken as-is.
    pub fn with_configurations(
        mut self,
        answers: impl IntoIterator<Item = Option<BuildConfiguration>>,
    ) -> Self {
        self.configurations.extend(answers);
        self
    }

    /// Queue confirmation answers; an empty queue confirms
    pub fn with_confirmations(mut self, answers: impl IntoIterator<Item = Option<bool>>) -> Self {
        self.confirmations.extend(answers);
        self
    }

    pub fn with_build_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.build_dirs.extend(dirs);
        self
    }

    pub fn with_tool_remedies(mut self, remedies: impl IntoIterator<Item = ToolRemedy>) -> Self {
        self.tool_remedies.extend(remedies);
        self
    }

    pub fn with_install_commands(
        mut self,
        commands: impl IntoIterator<Item = CommandInput>,
    ) -> Self {
        self.install_commands.extend(commands);
        self
    }

    pub fn with_failure_decisions(mut self, decisions: impl IntoIterator<Item = Decision>) -> Self {
        self.failure_decisions.extend(decisions);
        self
    }

    /// Answer for the verification gate (default: decline)
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_trust_anchor_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.trust_anchor_paths.extend(paths);
        self
    }

    /// How many times the tool remedy menu was shown
    pub fn tool_remedy_prompts(&self) -> usize {
        self.tool_remedy_prompts
    }

    /// Failed attempts the provider was asked about, in order
    pub fn failures_seen(&self) -> &[BuildAttempt] {
        &self.failures_seen
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl DecisionProvider for ScriptedDecisions {
    fn select_configuration(&mut self, defaults: &BuildConfiguration) -> Option<BuildConfiguration> {
        self.configurations.pop_front().unwrap_or(Some(*defaults))
    }

    fn confirm_configuration(&mut self, _config: &BuildConfiguration) -> Option<bool> {
        self.confirmations.pop_front().unwrap_or(Some(true))
    }

    fn locate_build_dir(&mut self, _build_file: &str, _tried: &Path) -> Option<PathBuf> {
        self.build_dirs.pop_front()
    }

    fn tool_remedy(&mut self, _tool: &str) -> ToolRemedy {
        self.tool_remedy_prompts += 1;
        self.tool_remedies.pop_front().unwrap_or(ToolRemedy::Abort)
    }

    fn install_command(&mut self, _tool: &str, _network_reachable: bool) -> CommandInput {
        self.install_commands
            .pop_front()
            .unwrap_or(CommandInput::Abort)
    }

    fn on_build_failure(&mut self, attempt: &BuildAttempt) -> Decision {
        self.failures_seen.push(attempt.clone());
        self.failure_decisions.pop_front().unwrap_or(Decision::Abort)
    }

    fn confirm_verification(&mut self) -> bool {
        self.verify
    }

    fn trust_anchor_path(&mut self, _missing: &Path) -> Option<PathBuf> {
        self.trust_anchor_paths.pop_front()
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_queues_abort() {
        let mut scripted = ScriptedDecisions::new();
        assert_eq!(scripted.tool_remedy("cmake"), ToolRemedy::Abort);
        assert_eq!(scripted.install_command("cmake", true), CommandInput::Abort);
        assert_eq!(scripted.locate_build_dir("Makefile", Path::new(".")), None);
        assert!(!scripted.confirm_verification());
        assert_eq!(scripted.tool_remedy_prompts(), 1);
    }

    #[test]
    fn test_configuration_defaults_pass_through() {
        let mut scripted = ScriptedDecisions::new();
        let defaults = BuildConfiguration::default();
        assert_eq!(scripted.select_configuration(&defaults), Some(defaults));
        assert_eq!(scripted.confirm_configuration(&defaults), Some(true));
    }

    #[test]
    fn test_queues_replay_in_order() {
        let mut scripted = ScriptedDecisions::new().with_tool_remedies([
            ToolRemedy::Install,
            ToolRemedy::ManualPath(PathBuf::from("/opt/bin/cmake")),
        ]);
        assert_eq!(scripted.tool_remedy("cmake"), ToolRemedy::Install);
        assert_eq!(
            scripted.tool_remedy("cmake"),
            ToolRemedy::ManualPath(PathBuf::from("/opt/bin/cmake"))
        );
        assert_eq!(scripted.tool_remedy("cmake"), ToolRemedy::Abort);
    }
}
