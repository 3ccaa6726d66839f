//! `abiwright flags` command

use anyhow::{anyhow, Result};

use super::{report_module_errors, GlobalOpts};
use crate::cli::FlagsArgs;
use abiwright::ops::expand::{expand_manifest, ExpandOptions};
use abiwright::ops::link::link_all;

pub fn execute(args: FlagsArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = global.load()?;
    let manifest = ctx.manifest();
    manifest.require(&args.module)?;

    let platform = &ctx.config().platform;
    let expansion = expand_manifest(
        manifest,
        platform,
        &ExpandOptions {
            verbosity: global.verbosity,
            json: args.json,
        },
    );
    report_module_errors(&expansion.errors, ctx.color())?;

    let linked = link_all(manifest, &expansion, &ctx.out_dir(), platform)?;
    report_module_errors(&linked.errors, ctx.color())?;

    let module = linked
        .module(&args.module)
        .ok_or_else(|| anyhow!("module `{}` was not linked", args.module))?;

    let variant_name = match args.variant {
        Some(name) => name,
        None => expansion
            .graph(&args.module)
            .and_then(|g| g.canonical())
            .map(|v| v.name())
            .ok_or_else(|| {
                anyhow!(
                    "module `{}` has no canonical variant\n\
                     help: Pass --variant; run `abiwright expand --module {}` to list variants",
                    args.module,
                    args.module
                )
            })?,
    };
    let variant = module.variant(&variant_name).ok_or_else(|| {
        anyhow!(
            "variant `{}` not found in module `{}`\n\
             help: Run `abiwright expand --module {}` to see available variants",
            variant_name,
            args.module,
            args.module
        )
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(variant)?);
        return Ok(());
    }

    println!("# Exported flags of `{}` ({}):", args.module, variant.variant);
    for flag in variant.exported.to_flags() {
        println!("  {}", flag);
    }

    if !variant.ldflags.is_empty() {
        println!();
        println!("# Link flags:");
        for flag in &variant.ldflags {
            println!("  {}", flag);
        }
    }

    if !module.pins.is_empty() {
        println!();
        println!("# Version pins:");
        for pin in &module.pins {
            println!("  {}#{} -> {}", pin.dependency, pin.requested, pin.version);
        }
    }
    Ok(())
}
