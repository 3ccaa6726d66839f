//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// abiwright - variant expansion, stub generation and ABI checking for native libraries
#[derive(Parser)]
#[command(name = "abiwright")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to Modules.toml (default: search upward from the current directory)
    #[arg(long, global = true, env = "ABIWRIGHT_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Number of parallel jobs
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Expand libraries into their variant graphs
    Expand(ExpandArgs),

    /// Generate the stub source and version script of a stub variant
    Stubs(StubsArgs),

    /// Show the flags a variant exports to its dependents
    Flags(FlagsArgs),

    /// Link ABI dumps and diff them against the reference dumps
    AbiCheck(AbiCheckArgs),

    /// Regenerate reference ABI dumps for a library
    UpdateRefs(UpdateRefsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct ExpandArgs {
    /// Only show these modules
    #[arg(short, long)]
    pub module: Vec<String>,

    /// Print the variant graphs as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct StubsArgs {
    /// Module to generate stubs for
    pub module: String,

    /// Stub version (a declared version or `latest`; empty for unversioned stubs)
    #[arg(long, default_value = "latest")]
    pub version: String,

    /// Output directory
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct FlagsArgs {
    /// Module to show flags for
    pub module: String,

    /// Variant name (default: the module's canonical variant)
    #[arg(long)]
    pub variant: Option<String>,

    /// Print the flags as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct AbiCheckArgs {
    /// Only check these modules
    #[arg(short, long)]
    pub module: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct UpdateRefsArgs {
    /// Library to update (module or output name)
    #[arg(short = 'l', long = "lib")]
    pub library: String,

    /// Update this opt-in reference directory instead of the versioned tree
    #[arg(long)]
    pub ref_dump_dir: Option<PathBuf>,

    /// Product the references are regenerated for
    #[arg(long)]
    pub products: Option<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
