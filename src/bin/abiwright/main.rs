//! abiwright CLI - variant expansion and ABI checking for native libraries

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::GlobalOpts;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("abiwright=debug")
    } else if cli.quiet {
        EnvFilter::new("abiwright=error")
    } else {
        EnvFilter::new("abiwright=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let global = GlobalOpts::from_cli(&cli);

    match cli.command {
        Commands::Expand(args) => commands::expand::execute(args, &global),
        Commands::Stubs(args) => commands::stubs::execute(args, &global),
        Commands::Flags(args) => commands::flags::execute(args, &global),
        Commands::AbiCheck(args) => commands::abi_check::execute(args, &global),
        Commands::UpdateRefs(args) => commands::update_refs::execute(args, &global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
