//! CLI output formatting.
//!
//! Consistent colored status lines for the per-package outcome
//! summary, written to stdout with color only when it is a terminal.

use std::collections::BTreeMap;

use kiln_core::Outcome;
use owo_colors::{OwoColorize, Stream};

pub mod symbols {
    pub const SUCCESS: &str = "✓";
    pub const ERROR: &str = "✗";
    pub const WARNING: &str = "⚠";
    pub const INFO: &str = "•";
}

pub fn print_success(message: &str) {
    println!(
        "{} {}",
        symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
        message
    );
}

pub fn print_error(message: &str) {
    eprintln!(
        "{} {}",
        symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
        message.if_supports_color(Stream::Stderr, |s| s.red())
    );
}

pub fn print_info(message: &str) {
    println!(
        "{} {}",
        symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
        message
    );
}

/// Summary of every requested and transitively pulled-in package with
/// its terminal outcome; failures carry their stage and exit detail.
pub fn print_outcome_summary(
    outcomes: &BTreeMap<String, Outcome>,
    versions: &BTreeMap<String, String>,
) {
    println!();
    for (name, outcome) in outcomes {
        let version = versions.get(name).map(String::as_str).unwrap_or("?");
        let label = format!("{} {}", name, version);
        match outcome {
            Outcome::Success { cached: false } => print_success(&label),
            Outcome::Success { cached: true } => {
                println!(
                    "{} {} {}",
                    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
                    label,
                    "(cached)".if_supports_color(Stream::Stdout, |s| s.dimmed())
                );
            }
            Outcome::Skipped { failed_dependency } => {
                println!(
                    "{} {} {}",
                    symbols::WARNING.if_supports_color(Stream::Stdout, |s| s.yellow()),
                    label,
                    format!("skipped: dependency {} failed", failed_dependency)
                        .if_supports_color(Stream::Stdout, |s| s.yellow())
                );
            }
            Outcome::Failed { stage, reason } => {
                println!(
                    "{} {} {}",
                    symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
                    label,
                    format!("failed in {}: {}", stage, reason)
                        .if_supports_color(Stream::Stdout, |s| s.red())
                );
            }
        }
    }
}
