//! Command implementations

pub mod abi_check;
pub mod completions;
pub mod expand;
pub mod flags;
pub mod stubs;
pub mod update_refs;

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::cli::Cli;
use abiwright::core::errors::ModuleError;
use abiwright::util::diagnostic::emit;
use abiwright::util::progress::Verbosity;
use abiwright::util::GlobalContext;

/// Options shared by every command.
pub struct GlobalOpts {
    pub manifest: Option<PathBuf>,
    pub verbosity: Verbosity,
    pub color: bool,
    pub jobs: Option<usize>,
}

impl GlobalOpts {
    pub fn from_cli(cli: &Cli) -> Self {
        let verbosity = if cli.verbose {
            Verbosity::Verbose
        } else if cli.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        };
        GlobalOpts {
            manifest: cli.manifest.clone(),
            verbosity,
            color: !cli.no_color,
            jobs: cli.jobs,
        }
    }

    /// Load the manifest and configuration, and size the worker pool.
    pub fn load(&self) -> Result<GlobalContext> {
        let mut ctx = GlobalContext::new(self.manifest.as_deref())?;
        ctx.set_color(self.color);

        if let Some(jobs) = self.jobs.or(ctx.config().build.jobs) {
            // Fails only when the pool was already built.
            rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build_global()
                .ok();
        }
        Ok(ctx)
    }
}

/// Print per-module errors and fail if there were any.
pub fn report_module_errors(errors: &[ModuleError], color: bool) -> Result<()> {
    for error in errors {
        emit(&error.to_diagnostic(), color);
    }
    match errors.len() {
        0 => Ok(()),
        1 => bail!("module `{}` has errors", errors[0].module()),
        n => bail!("{} modules have errors", n),
    }
}
