//! Container engine capabilities
//!
//! The build and run primitives are injected into the orchestrator as traits
//! so the retry state machine can be exercised deterministically with fake
//! implementations. A failed build is ordinary data (`BuildOutcome::Failure`);
//! `EngineError` is reserved for the engine itself being unusable.

pub mod docker;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub use docker::DockerEngine;

/// Errors from the container engine itself (daemon unreachable, API failure)
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be reached at all
    #[error("container engine unavailable: {0}")]
    Unavailable(String),

    /// Assembling the build context failed
    #[error("failed to prepare build context: {0}")]
    Context(#[from] std::io::Error),

    /// The engine API rejected or aborted an operation
    #[error("container engine error: {0}")]
    Api(String),
}

/// Result of one image build attempt
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// Image built and tagged
    Success { log: Vec<String> },
    /// Build ran but failed; `error` summarizes the failure
    Failure { log: Vec<String>, error: String },
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success { .. })
    }

    /// Captured log lines, regardless of outcome
    pub fn log(&self) -> &[String] {
        match self {
            BuildOutcome::Success { log } => log,
            BuildOutcome::Failure { log, .. } => log,
        }
    }
}

/// Builds an image from a Dockerfile inside a context directory.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Builds `dockerfile_name` (relative to `context_dir`) under `tag`.
    ///
    /// Returns `Ok(BuildOutcome::Failure { .. })` for a failed build; `Err`
    /// only when the engine itself cannot perform builds.
    async fn build(
        &self,
        context_dir: &Path,
        dockerfile_name: &str,
        tag: &str,
    ) -> Result<BuildOutcome, EngineError>;
}

/// Runs a built image to completion and captures its combined output.
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    /// Runs `tag`, waits for exit, returns combined stdout+stderr.
    ///
    /// Implementations must remove the ephemeral container on every exit
    /// path. The container's exit status is not an error; the captured
    /// output is the signal.
    async fn run(&self, tag: &str) -> Result<String, EngineError>;
}
