//! `abiwright stubs` command

use anyhow::Result;

use super::GlobalOpts;
use crate::cli::StubsArgs;
use abiwright::ops::stubs::{generate_stubs, StubsOptions};

pub fn execute(args: StubsArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = global.load()?;
    let opts = StubsOptions {
        module: args.module,
        version: args.version,
        out: args.out.map(|dir| ctx.cwd().join(dir)),
    };

    let result = generate_stubs(
        ctx.manifest(),
        &ctx.config().platform,
        &ctx.out_dir(),
        &opts,
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("# {} ({})", result.module, result.variant);
    println!("source: {}", result.files.source.display());
    if let Some(script) = &result.files.version_script {
        println!("version script: {}", script.display());
    }
    println!("symbols: {}", result.symbols.len());
    for flag in &result.ldflags {
        println!("  {}", flag);
    }
    Ok(())
}
