//! kiln-core: dependency resolution and build orchestration
//!
//! This crate turns a requested package set into a correctly ordered,
//! cached, failure-tolerant sequence of fetch/build/install
//! operations: manifests resolve into a dependency graph, the
//! scheduler walks it with a bounded worker pool, the executor runs
//! each package's pipeline, and the build cache plus installation
//! ledger make repeated installs incremental.

mod cache;
mod cancel;
mod error;
mod executor;
mod fetch;
mod fingerprint;
mod graph;
mod ledger;
mod manifest;
mod sched;
mod state;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{BuildCache, BuildRecord, CacheKey};
pub use cancel::CancelToken;
pub use error::{CoreError, ExecError};
pub use executor::{ExecReport, ExecTask, Executor, PackageExecutor};
pub use fetch::{DefaultFetcher, SourceFetcher};
pub use fingerprint::compute_fingerprints;
pub use graph::{DependencyGraph, Node};
pub use ledger::{InstallationLedger, LedgerEntry};
pub use manifest::{
    BuildStep, DependencyReq, DirRegistry, ManifestSource, ManifestStore, PackageManifest, Source,
};
pub use sched::{Outcome, Scheduler};
pub use state::StateStore;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
