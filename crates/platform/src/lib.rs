//! kiln-platform: path layout and subprocess invocation for kiln
//!
//! This crate owns the on-disk layout (registry, source checkouts,
//! install prefixes, persisted state) and the uniform command runner
//! used for every native build tool.

mod error;
mod exec;
mod paths;

pub use error::PlatformError;
pub use exec::{run_command, CommandSpec};
pub use paths::KilnPaths;

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;
