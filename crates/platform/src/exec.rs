//! Uniform subprocess invocation
//!
//! Every native build tool (configure, make, cmake, git, ...) is
//! driven through [`run_command`], so callers never care which tool is
//! behind a build step.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitStatus;

use tokio::process::Command;
use tracing::debug;

use crate::{PlatformError, Result};

/// One subprocess to run: argv, working directory, extra environment.
///
/// The parent environment is inherited; `env` entries are layered on
/// top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn current_dir<P: Into<PathBuf>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Rendering used in logs and failure reports.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Run a command to completion and return its exit status.
///
/// The child is spawned with `kill_on_drop`, so a caller that drops
/// the returned future (cancellation) terminates the subprocess
/// promptly instead of leaking it.
pub async fn run_command(spec: &CommandSpec) -> Result<ExitStatus> {
    let program = spec.argv.first().ok_or(PlatformError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(&spec.argv[1..]);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    cmd.envs(&spec.env);
    cmd.kill_on_drop(true);

    debug!(command = %spec.display(), "running");

    let mut child = cmd.spawn().map_err(|source| PlatformError::Spawn {
        program: program.clone(),
        source,
    })?;

    let status = child.wait().await?;
    debug!(command = %spec.display(), code = ?status.code(), "finished");
    Ok(status)
}
