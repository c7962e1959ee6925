//! Error types for kiln-core

use thiserror::Error;

/// Structural errors that abort an invocation before any build starts.
///
/// Per-package execution failures are not represented here; they are
/// reported in the scheduler's outcome map (see `sched::Outcome`).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Package '{0}' not found in any manifest source")]
    ManifestNotFound(String),

    #[error("Invalid manifest for '{name}': {reason}")]
    ManifestInvalid { name: String, reason: String },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error(
        "Conflicting requirements for '{name}': '{requested}' requested but '{resolved}' resolved"
    )]
    DependencyConflict {
        name: String,
        requested: String,
        resolved: String,
    },

    #[error("Platform error: {0}")]
    Platform(#[from] kiln_platform::PlatformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file corrupt at '{path}': {source}")]
    StateCorrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-package pipeline failures, contained to the failing package's
/// dependency subgraph.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Source verification failed: expected {expected}, got {actual}")]
    SourceVerificationFailed { expected: String, actual: String },

    #[error("Build step {step} failed ({command}): exit status {status}")]
    BuildStepFailed {
        step: usize,
        command: String,
        status: String,
    },

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Cancelled")]
    Cancelled,
}

impl ExecError {
    /// The pipeline stage this failure belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            ExecError::Fetch(_) | ExecError::SourceVerificationFailed { .. } => "fetch",
            ExecError::BuildStepFailed { .. } => "build",
            ExecError::InstallFailed(_) => "install",
            ExecError::Cancelled => "cancelled",
        }
    }
}
