//! Orchestrator state machine and session audit record
//!
//! States: IDLE → RUNNING → {SUCCEEDED | FAILED}; FAILED → {RUNNING | ABORTED}.
//! SUCCEEDED and ABORTED are terminal.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::BuildConfiguration;
use crate::error::AttestError;
use crate::process::RemediationRecord;

/// Schema version for the session audit file
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "attest-build/session@1";

/// States with no outgoing transitions
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratorState {
    Idle,
    Running,
    Failed,
    Succeeded,
    Aborted,
}

impl TerminalState for OrchestratorState {
    fn is_terminal(&self) -> bool {
        matches!(self, OrchestratorState::Succeeded | OrchestratorState::Aborted)
    }
}

impl OrchestratorState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: OrchestratorState) -> bool {
        use OrchestratorState::*;
        match (self, target) {
            (Idle, Running) => true,
            // operator abort while resolving tools for the first attempt
            (Idle, Aborted) => true,

            (Running, Succeeded) => true,
            (Running, Failed) => true,

            (Failed, Running) => true,
            (Failed, Aborted) => true,

            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// One orchestration cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildAttempt {
    /// 1-based, strictly increasing within a session
    pub ordinal: u32,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<AttestError>,
    /// Backend step that failed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    /// Override names in effect (values are never recorded)
    pub override_keys: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionRecordError {
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: OrchestratorState,
        to: OrchestratorState,
    },

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Audit record for one orchestration session (session.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub schema_version: u32,
    pub schema_id: String,
    pub session_id: String,
    pub state: OrchestratorState,
    pub configuration: BuildConfiguration,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tool name to the path it resolved to
    pub resolved_tools: BTreeMap<String, PathBuf>,
    pub attempts: Vec<BuildAttempt>,
    pub remediations: Vec<RemediationRecord>,
}

impl SessionRecord {
    /// Create a record in IDLE
    pub fn new(configuration: BuildConfiguration, working_dir: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            session_id: ulid::Ulid::new().to_string(),
            state: OrchestratorState::Idle,
            configuration,
            working_dir: working_dir.into(),
            created_at: now,
            updated_at: now,
            resolved_tools: BTreeMap::new(),
            attempts: Vec::new(),
            remediations: Vec::new(),
        }
    }

    pub fn transition(&mut self, new_state: OrchestratorState) -> Result<(), SessionRecordError> {
        if !self.state.can_transition_to(new_state) {
            return Err(SessionRecordError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }
        self.state = new_state;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Ordinal the next attempt will carry
    pub fn next_ordinal(&self) -> u32 {
        self.attempts.last().map_or(1, |a| a.ordinal + 1)
    }

    pub fn last_attempt(&self) -> Option<&BuildAttempt> {
        self.attempts.last()
    }

    pub fn record_attempt(&mut self, attempt: BuildAttempt) {
        self.attempts.push(attempt);
        self.updated_at = Utc::now();
    }

    pub fn record_remediation(&mut self, remediation: RemediationRecord) {
        self.remediations.push(remediation);
        self.updated_at = Utc::now();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write atomically (write-then-rename), creating parent directories
    pub fn write_to_file(&self, path: &Path) -> Result<(), SessionRecordError> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, SessionRecordError> {
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }
}
