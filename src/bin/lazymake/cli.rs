//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use lazymake::builder::Freshness;

/// lazymake - an incremental build engine with lazily loaded dependency records
#[derive(Parser)]
#[command(name = "lazymake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bring goals up to date
    Build(BuildArgs),

    /// Turn a raw compiler dependency file into a dependency record
    Depfile(DepfileArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Targets to build (defaults to the first target in the Rulefile)
    pub goals: Vec<String>,

    /// Number of parallel jobs
    #[arg(short, long, env = "LAZYMAKE_JOBS")]
    pub jobs: Option<usize>,

    /// Keep building independent targets after a failure
    #[arg(short, long, conflicts_with = "stop")]
    pub keep_going: bool,

    /// Stop starting new actions after the first failure
    #[arg(short = 'S', long)]
    pub stop: bool,

    /// Rule file to use instead of searching for `Rulefile`
    #[arg(short = 'f', long = "file")]
    pub rulefile: Option<PathBuf>,

    /// Change to this directory before doing anything
    #[arg(short = 'C', long = "directory")]
    pub directory: Option<PathBuf>,

    /// Print the commands that would run without running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// How to decide whether a target is out of date
    #[arg(long, value_parser = parse_freshness)]
    pub freshness: Option<Freshness>,
}

impl BuildArgs {
    /// `-k` and `-S` as a tri-state; None defers to configuration.
    pub fn keep_going(&self) -> Option<bool> {
        match (self.keep_going, self.stop) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

fn parse_freshness(s: &str) -> Result<Freshness, String> {
    s.parse()
}

#[derive(Args)]
pub struct DepfileArgs {
    /// Raw dependency file written by the compiler
    pub raw: PathBuf,

    /// Primary source file to leave out (defaults to the first prerequisite)
    #[arg(long)]
    pub source: Option<String>,

    /// Write the record here instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
