//! CLI struct definitions for the `ace` command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs::run`, as
//! thin glue over the `core` library functions — the real logic never
//! lives here (SPEC_FULL.md §B.4).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "ace",
    version = env!("CARGO_PKG_VERSION"),
    about = "Autonomous code-health engine: detect, plan, guard-verify, and apply fixes with crash-safe rollback.",
    disable_version_flag = true
)]
pub(crate) struct Cli {
    /// Project root (defaults to the current directory).
    #[clap(long, global = true)]
    pub project: Option<PathBuf>,
    /// Emit machine-readable JSON instead of a text summary.
    #[clap(long, global = true)]
    pub json: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Show version information.
    Version,

    /// Run detection only: no plans, no edits, no journal writes.
    Analyze(FileSetCli),

    /// Detect, synthesize plans, and show what would be applied or
    /// suggested, without touching disk.
    Plan(FileSetCli),

    /// Run the full detect → plan → guard → apply → learn pipeline.
    Apply(ApplyCli),

    /// Revert a previously applied plan by id.
    Revert(RevertCli),

    /// Replay a run's journal, restoring any orphaned in-flight edit.
    Recover(RecoverCli),

    /// Baseline finding-identity management.
    Baseline(BaselineCli),

    /// Rebuild and persist the project's RepoMap.
    Repomap,

    /// Policy inspection.
    Policy(PolicyCli),

    /// Learner state inspection.
    Learn(LearnCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct FileSetCli {
    /// Files to analyze, relative to the project root. Defaults to every
    /// source file RepoMap discovers.
    pub files: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ApplyCli {
    pub files: Vec<String>,
    /// Exit 2 if any NEW finding appears relative to the stored baseline.
    #[clap(long)]
    pub fail_on_new: bool,
    /// Exit 2 if any EXISTING finding's severity increased.
    #[clap(long)]
    pub fail_on_regression: bool,
    /// Cap on distinct files touched this run.
    #[clap(long)]
    pub max_edited_files: Option<usize>,
    /// Cap on total edited lines this run.
    #[clap(long)]
    pub max_edited_lines: Option<usize>,
    /// Run Guard in lenient mode (skip structural-equivalence checks).
    #[clap(long)]
    pub lenient: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct RevertCli {
    /// Run id the plan was applied under.
    #[clap(long)]
    pub run: String,
    /// Plan id to revert.
    #[clap(long)]
    pub plan: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct RecoverCli {
    /// Run id whose journal should be replayed.
    #[clap(long)]
    pub run: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct BaselineCli {
    #[clap(subcommand)]
    pub command: BaselineCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum BaselineCommand {
    /// Run detection and store the resulting finding set as the baseline.
    Update(FileSetCli),
    /// Show the stored baseline's size.
    Show,
}

#[derive(clap::Args, Debug)]
pub(crate) struct PolicyCli {
    #[clap(subcommand)]
    pub command: PolicyCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum PolicyCommand {
    /// Validate `policy.toml` and print its resolved scoring/limits.
    Eval,
    /// Print the configured risk classes and their member rules.
    Riskmap,
}

#[derive(clap::Args, Debug)]
pub(crate) struct LearnCli {
    #[clap(subcommand)]
    pub command: LearnCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum LearnCommand {
    /// Show decayed stats and tuned threshold for one rule.
    Show {
        #[clap(long)]
        rule: String,
    },
}
