//! Per-package execution pipeline: fetch, build, install
//!
//! The executor runs one package through its three stages, each
//! short-circuiting on failure. All side effects stay inside the
//! package's own source checkout and install prefix; a failed or
//! cancelled install deletes the prefix subtree so no half-installed
//! package ever becomes visible to the ledger.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use kiln_platform::{run_command, CommandSpec, KilnPaths};

use crate::cache::CacheKey;
use crate::cancel::CancelToken;
use crate::error::ExecError;
use crate::fetch::SourceFetcher;
use crate::manifest::PackageManifest;
use crate::state::StateStore;

type ExecResult<T> = std::result::Result<T, ExecError>;

/// One unit of work dispatched by the scheduler.
#[derive(Debug, Clone)]
pub struct ExecTask {
    pub manifest: PackageManifest,
    pub key: CacheKey,
    /// Install prefixes of this package's direct dependencies.
    pub dep_prefixes: Vec<PathBuf>,
    /// When false, stop after the build stage: no install steps, no
    /// ledger entry (the `kiln build` command).
    pub install: bool,
    /// An intact build-cache record exists for this key; skip fetch
    /// and build and run only the install stage against the cached
    /// artifact (falling back to the full pipeline if the source
    /// checkout has since been deleted).
    pub reuse_build: bool,
}

/// What a successful execution produced.
#[derive(Debug, Clone)]
pub struct ExecReport {
    pub prefix: PathBuf,
    /// Files placed under the prefix; empty for build-only tasks.
    pub installed_files: Vec<PathBuf>,
}

/// Seam between the scheduler and the real pipeline; scheduler tests
/// substitute doubles.
#[async_trait]
pub trait PackageExecutor: Send + Sync {
    async fn execute(&self, task: ExecTask) -> ExecResult<ExecReport>;
}

/// The real executor.
pub struct Executor {
    paths: KilnPaths,
    state: Arc<Mutex<StateStore>>,
    fetcher: Arc<dyn SourceFetcher>,
    cancel: CancelToken,
}

impl Executor {
    pub fn new(
        paths: KilnPaths,
        state: Arc<Mutex<StateStore>>,
        fetcher: Arc<dyn SourceFetcher>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            paths,
            state,
            fetcher,
            cancel,
        }
    }

    /// Environment exposed to every build and install step: the
    /// package's own prefix plus the resolved dependency prefixes,
    /// aggregated the way configure/make expects them.
    fn step_env(&self, prefix: &Path, dep_prefixes: &[PathBuf]) -> Vec<(String, String)> {
        let mut env = vec![
            ("PREFIX".to_string(), prefix.display().to_string()),
            ("KILN_PREFIX".to_string(), prefix.display().to_string()),
        ];

        if !dep_prefixes.is_empty() {
            let cppflags = dep_prefixes
                .iter()
                .map(|d| format!("-I{}", d.join("include").display()))
                .collect::<Vec<_>>()
                .join(" ");
            let ldflags = dep_prefixes
                .iter()
                .map(|d| format!("-L{}", d.join("lib").display()))
                .collect::<Vec<_>>()
                .join(" ");
            env.push(("CPPFLAGS".to_string(), cppflags));
            env.push(("LDFLAGS".to_string(), ldflags));
        }

        let mut path = std::env::var("PATH").unwrap_or_default();
        for dep in dep_prefixes {
            path.push(':');
            path.push_str(&dep.join("bin").display().to_string());
        }
        env.push(("PATH".to_string(), path));

        let dep_list = dep_prefixes
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        env.push(("KILN_DEP_PREFIXES".to_string(), dep_list));

        env
    }

    async fn run_step(
        &self,
        step_index: usize,
        argv: &[String],
        env: &[(String, String)],
        prefix: &Path,
        src_dir: &Path,
    ) -> ExecResult<()> {
        let argv: Vec<String> = argv
            .iter()
            .map(|a| expand_vars(a, prefix, src_dir))
            .collect();
        let spec = CommandSpec::new(argv)
            .current_dir(src_dir)
            .envs(env.iter().cloned());
        let command = spec.display();

        let status = tokio::select! {
            status = run_command(&spec) => status.map_err(|e| ExecError::BuildStepFailed {
                step: step_index,
                command: command.clone(),
                status: e.to_string(),
            })?,
            _ = self.cancel.cancelled() => return Err(ExecError::Cancelled),
        };

        if !status.success() {
            return Err(ExecError::BuildStepFailed {
                step: step_index,
                command,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PackageExecutor for Executor {
    async fn execute(&self, task: ExecTask) -> ExecResult<ExecReport> {
        let manifest = &task.manifest;
        let src_dir = self.paths.source_dir(&manifest.name);
        let prefix = self
            .paths
            .prefix_dir(&manifest.name, &manifest.version, &task.key.fingerprint);

        // A prior build for this exact key can be reused when both the
        // artifact and the source checkout it built from still exist.
        let reuse = task.reuse_build && src_dir.is_dir() && prefix.is_dir();

        if reuse {
            info!(package = %manifest.name, "reusing cached build artifact");
        } else {
            // Stage 1: fetch.
            info!(package = %manifest.name, source = %manifest.source, "fetching");
            tokio::select! {
                res = self.fetcher.fetch(&manifest.source, &src_dir) => res?,
                _ = self.cancel.cancelled() => return Err(ExecError::Cancelled),
            }
        }

        std::fs::create_dir_all(&prefix)
            .map_err(|e| ExecError::InstallFailed(format!("create prefix: {}", e)))?;
        let env = self.step_env(&prefix, &task.dep_prefixes);

        // Stage 2: build.
        if !reuse {
            info!(package = %manifest.name, steps = manifest.build.len(), "building");
            for (i, step) in manifest.build.iter().enumerate() {
                if let Err(err) = self
                    .run_step(i, &step.argv, &env, &prefix, &src_dir)
                    .await
                {
                    rollback(&prefix);
                    return Err(err);
                }
            }
        }

        // Stage 3: install.
        let installed_files = if task.install {
            info!(package = %manifest.name, steps = manifest.install.len(), "installing");
            for (i, step) in manifest.install.iter().enumerate() {
                if let Err(err) = self
                    .run_step(i, &step.argv, &env, &prefix, &src_dir)
                    .await
                {
                    rollback(&prefix);
                    return Err(match err {
                        ExecError::Cancelled => ExecError::Cancelled,
                        ExecError::BuildStepFailed { step, command, status } => {
                            ExecError::InstallFailed(format!(
                                "step {} ({}) exited with {}",
                                step, command, status
                            ))
                        }
                        other => other,
                    });
                }
            }
            Some(collect_files(&prefix)?)
        } else {
            None
        };

        // Commit: cache record plus ledger append as one transaction.
        {
            let mut state = self.state.lock().unwrap();
            state
                .commit_success(&task.key, &prefix, installed_files.clone())
                .map_err(|e| ExecError::InstallFailed(format!("state commit: {}", e)))?;
        }

        debug!(package = %manifest.name, prefix = %prefix.display(), "complete");
        Ok(ExecReport {
            prefix,
            installed_files: installed_files.unwrap_or_default(),
        })
    }
}

/// Delete the prefix subtree so no partially-installed state remains.
fn rollback(prefix: &Path) {
    if prefix.exists() {
        warn!(prefix = %prefix.display(), "rolling back");
        std::fs::remove_dir_all(prefix).ok();
    }
}

/// Every regular file currently under the prefix, sorted.
fn collect_files(prefix: &Path) -> ExecResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(prefix) {
        let entry = entry.map_err(|e| ExecError::InstallFailed(e.to_string()))?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// `${PREFIX}` and `${SRC}` substitution in step arguments.
fn expand_vars(arg: &str, prefix: &Path, src_dir: &Path) -> String {
    arg.replace("${PREFIX}", &prefix.display().to_string())
        .replace("${SRC}", &src_dir.display().to_string())
}
