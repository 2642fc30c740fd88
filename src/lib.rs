//! Attest Build - interactive native builds with signed-manifest attestation
//!
//! Drives a CMake or Make build of a native project through an
//! operator-in-the-loop retry cycle, making sure the backend and compiler
//! are reachable first, then checks the produced artifact against
//! detached-signed SHA-256 and BLAKE2b-512 manifests.

pub mod build;
pub mod config;
pub mod decision;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod process;
pub mod resolve;
pub mod session;
pub mod signal;
pub mod trust;

pub use build::{BuildConfiguration, BuildOrchestrator, OrchestratorState};
pub use decision::{Decision, DecisionProvider};
pub use error::AttestError;
pub use pipeline::{BuildOutcome, BuildPipeline, PipelineError};
pub use resolve::DependencyResolver;
pub use session::SessionContext;
pub use trust::{TrustVerifier, VerificationReport};
