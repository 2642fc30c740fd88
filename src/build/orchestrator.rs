//! Retry-driven build orchestration
//!
//! Each cycle resolves the backend and compiler, clears stale backend
//! state, composes the child environment from the session context and runs
//! the backend steps. A failed cycle waits for an explicit operator
//! decision; there is no automatic retry and no retry cap.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::backend::{plan_steps, purge_cache};
use super::config::BuildConfiguration;
use super::state::{
    AttemptOutcome, BuildAttempt, OrchestratorState, SessionRecord, SessionRecordError,
};
use crate::decision::{Decision, DecisionProvider};
use crate::error::{describe_exit, AttestError};
use crate::process::{
    Invocation, Postcondition, ProcessLauncher, RemediationAction, RemediationRecord,
};
use crate::resolve::{DependencyResolver, Resolution};
use crate::session::SessionContext;
use crate::signal::SignalState;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Record(#[from] SessionRecordError),
}

pub struct BuildOrchestrator {
    config: BuildConfiguration,
    parallelism: Option<u32>,
    ctx: SessionContext,
    resolver: DependencyResolver,
    record: SessionRecord,
    interrupt: Option<Arc<SignalState>>,
}

impl BuildOrchestrator {
    pub fn new(config: BuildConfiguration, ctx: SessionContext, resolver: DependencyResolver) -> Self {
        let record = SessionRecord::new(config, ctx.working_dir());
        Self {
            config,
            parallelism: None,
            ctx,
            resolver,
            record,
            interrupt: None,
        }
    }

    /// Parallelism hint passed to the backend
    pub fn with_parallelism(mut self, jobs: Option<u32>) -> Self {
        self.parallelism = jobs;
        self
    }

    /// Abort at the next choice point once `state` reports an interrupt
    pub fn with_interrupt(mut self, state: Arc<SignalState>) -> Self {
        self.interrupt = Some(state);
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.record.state
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Hand back the session context and resolver for later stages
    pub fn into_parts(self) -> (SessionContext, DependencyResolver, SessionRecord) {
        (self.ctx, self.resolver, self.record)
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|state| state.is_abort_requested())
    }

    fn abort(&mut self) -> Result<OrchestratorState, OrchestratorError> {
        self.record.transition(OrchestratorState::Aborted)?;
        info!(attempts = self.record.attempts.len(), "build aborted");
        Ok(OrchestratorState::Aborted)
    }

    /// Drive the state machine to a terminal state
    pub fn run(
        &mut self,
        decisions: &mut dyn DecisionProvider,
        launcher: &mut dyn ProcessLauncher,
    ) -> Result<OrchestratorState, OrchestratorError> {
        loop {
            if self.interrupted() {
                return self.abort();
            }

            let resolved = self.resolve_tools(decisions, launcher);
            self.collect_resolver_remediations();
            if !resolved {
                return self.abort();
            }

            self.record.transition(OrchestratorState::Running)?;
            let attempt = self.execute_attempt(launcher);
            let succeeded = attempt.succeeded();
            self.record.record_attempt(attempt);

            if succeeded {
                self.record.transition(OrchestratorState::Succeeded)?;
                info!(attempts = self.record.attempts.len(), "build succeeded");
                return Ok(OrchestratorState::Succeeded);
            }
            self.record.transition(OrchestratorState::Failed)?;

            if !self.await_decision(decisions, launcher) {
                return self.abort();
            }
        }
    }

    /// Resolve backend then compiler; false if the operator aborted
    fn resolve_tools(
        &mut self,
        decisions: &mut dyn DecisionProvider,
        launcher: &mut dyn ProcessLauncher,
    ) -> bool {
        for tool in self.config.required_tools() {
            match self.resolver.resolve(tool, &mut self.ctx, decisions, launcher) {
                Resolution::Resolved(path) => {
                    self.record.resolved_tools.insert(tool.to_string(), path);
                }
                Resolution::Aborted => return false,
            }
        }
        true
    }

    fn collect_resolver_remediations(&mut self) {
        let after = self.record.last_attempt().map_or(0, |a| a.ordinal);
        for mut remediation in self.resolver.take_remediations() {
            remediation.after_attempt = after;
            self.record.record_remediation(remediation);
        }
    }

    fn execute_attempt(&mut self, launcher: &mut dyn ProcessLauncher) -> BuildAttempt {
        let ordinal = self.record.next_ordinal();
        let started_at = Utc::now();
        info!(attempt = ordinal, config = %self.config, "starting build attempt");

        let (failure, failed_step) = match purge_cache(self.config.backend, self.ctx.working_dir()) {
            Err(e) => (
                Some(AttestError::BuildBackendFailed {
                    exit_code: None,
                    detail: format!("cannot purge stale build cache: {}", e),
                }),
                None,
            ),
            Ok(_) => self.run_steps(launcher),
        };

        let outcome = if failure.is_none() {
            AttemptOutcome::Succeeded
        } else {
            AttemptOutcome::Failed
        };
        if let Some(err) = &failure {
            warn!(attempt = ordinal, step = failed_step.as_deref().unwrap_or("-"), "{}", err);
        }
        info!(attempt = ordinal, outcome = ?outcome, "build attempt finished");

        BuildAttempt {
            ordinal,
            outcome,
            failure,
            failed_step,
            override_keys: self.ctx.overrides.keys(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn run_steps(&self, launcher: &mut dyn ProcessLauncher) -> (Option<AttestError>, Option<String>) {
        for step in plan_steps(&self.config, self.parallelism) {
            let mut env = self.ctx.compose_env();
            for (name, value) in &step.env {
                if self.ctx.overrides.get(name).is_none() {
                    env.insert(name.clone(), value.clone());
                }
            }
            let program = self
                .record
                .resolved_tools
                .get(&step.program)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| step.program.clone());
            let invocation = Invocation::new(program, self.ctx.working_dir())
                .args(step.args.iter().cloned())
                .with_env(env);

            let failure = match launcher.run(&invocation) {
                Ok(Some(0)) => continue,
                Ok(code) => AttestError::BuildBackendFailed {
                    exit_code: code,
                    detail: format!(
                        "{} step `{} {}` failed with {}",
                        step.label,
                        step.program,
                        step.args.join(" "),
                        describe_exit(code)
                    ),
                },
                Err(e) => AttestError::BuildBackendFailed {
                    exit_code: None,
                    detail: format!("cannot launch {}: {}", step.program, e),
                },
            };
            return (Some(failure), Some(step.label.to_string()));
        }
        (None, None)
    }

    /// Ask until the operator picks a way forward; false means abort
    fn await_decision(
        &mut self,
        decisions: &mut dyn DecisionProvider,
        launcher: &mut dyn ProcessLauncher,
    ) -> bool {
        loop {
            if self.interrupted() {
                return false;
            }
            let Some(last) = self.record.last_attempt().cloned() else {
                return false;
            };

            match decisions.on_build_failure(&last) {
                Decision::Retry => {
                    info!(attempt = last.ordinal, "operator chose retry");
                    return true;
                }
                Decision::SetOverride { name, value } => match self.ctx.overrides.set(&name, value) {
                    Ok(stored) => {
                        info!(attempt = last.ordinal, name = %stored, "environment override set");
                        return true;
                    }
                    Err(e) => decisions.warn(&e.to_string()),
                },
                Decision::RunCommand(action) => {
                    self.run_remediation(action, last.ordinal, decisions, launcher);
                    return true;
                }
                Decision::Abort => return false,
            }
        }
    }

    fn run_remediation(
        &mut self,
        action: RemediationAction,
        after_attempt: u32,
        decisions: &mut dyn DecisionProvider,
        launcher: &mut dyn ProcessLauncher,
    ) {
        let invocation = action.to_invocation(self.ctx.working_dir(), self.ctx.compose_env());
        info!(attempt = after_attempt, command = %action.command, "running remediation command");

        let (exit_code, launch_error) = match launcher.run(&invocation) {
            Ok(code) => (code, None),
            Err(e) => (None, Some(e.to_string())),
        };
        if exit_code != Some(0) {
            let reason = launch_error
                .clone()
                .unwrap_or_else(|| describe_exit(exit_code));
            decisions.warn(&format!("Command `{}` failed: {}", action.command, reason));
        }

        let postcondition_met = match &action.postcondition {
            Postcondition::None => exit_code == Some(0),
            Postcondition::ToolReachable(tool) => self.ctx.locate(tool).is_some(),
        };
        self.record.record_remediation(RemediationRecord {
            after_attempt,
            action,
            exit_code,
            launch_error,
            postcondition_met,
        });
    }
}
