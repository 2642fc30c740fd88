//! Build orchestration: configuration, backends, overrides and the retry
//! state machine

pub mod backend;
pub mod config;
pub mod env;
pub mod orchestrator;
pub mod state;

pub use config::{BackendKind, BuildConfiguration, BuildVariant, CompilerFamily};
pub use env::EnvironmentOverrides;
pub use orchestrator::{BuildOrchestrator, OrchestratorError};
pub use state::{AttemptOutcome, BuildAttempt, OrchestratorState, SessionRecord};
