//! Shared command context: resolved layout and invocation options.

use std::path::PathBuf;

use anyhow::{Context, Result};
use kiln_platform::KilnPaths;

pub struct CliContext {
    pub paths: KilnPaths,
    pub registry: PathBuf,
    pub jobs: usize,
}

impl CliContext {
    pub fn new(root: Option<PathBuf>, registry: Option<PathBuf>, jobs: usize) -> Result<Self> {
        let paths = match root {
            Some(root) => KilnPaths::with_root(root),
            None => KilnPaths::detect().context("Failed to determine kiln root")?,
        };
        paths.init().context("Failed to initialize kiln layout")?;

        let registry = registry.unwrap_or_else(|| paths.registry.clone());

        Ok(Self {
            paths,
            registry,
            jobs,
        })
    }
}
