use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod context;
mod output;

use context::CliContext;

/// kiln - source-based package manager
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory for sources, prefixes, and state (default: ~/.kiln)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Directory of package manifests (default: <root>/registry)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Maximum number of packages built concurrently
    #[arg(short, long, global = true, default_value_t = 4)]
    jobs: usize,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, build, and install packages with their dependencies
    Install {
        /// Packages to install
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Build a package (and install its dependencies) without installing it
    Build {
        /// Package to build
        package: String,
    },

    /// Remove an installed package and its files
    Uninstall {
        /// Package to remove
        package: String,
    },

    /// List packages known to the registry
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .init();
    let ctx = CliContext::new(cli.root, cli.registry, cli.jobs)?;

    let ok = match cli.command {
        Commands::Install { packages } => cmd::cmd_install(&ctx, &packages)?,
        Commands::Build { package } => cmd::cmd_build(&ctx, &package)?,
        Commands::Uninstall { package } => cmd::cmd_uninstall(&ctx, &package)?,
        Commands::List => cmd::cmd_list(&ctx)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
