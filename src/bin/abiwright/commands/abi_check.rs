//! `abiwright abi-check` command

use anyhow::{bail, Result};

use super::{report_module_errors, GlobalOpts};
use crate::cli::AbiCheckArgs;
use abiwright::builder::sabi::diff::tool_by_name;
use abiwright::ops::abi_check::{abi_check, AbiCheckOptions};
use abiwright::ops::expand::{expand_manifest, ExpandOptions};
use abiwright::ops::link::link_all;
use abiwright::util::progress::Verbosity;

pub fn execute(args: AbiCheckArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = global.load()?;
    let manifest = ctx.manifest();
    let config = ctx.config();
    let tool = tool_by_name(&config.abi.tool)?;
    let out_dir = ctx.out_dir();

    let expansion = expand_manifest(
        manifest,
        &config.platform,
        &ExpandOptions {
            verbosity: global.verbosity,
            json: args.json,
        },
    );
    let linked = link_all(manifest, &expansion, &out_dir, &config.platform)?;

    let opts = AbiCheckOptions {
        modules: args.module,
        verbosity: global.verbosity,
        json: args.json,
    };
    let report = abi_check(tool.as_ref(), manifest, config, &expansion, &linked, &out_dir, &opts)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for checked in &report.dumps {
            for diff in &checked.diffs {
                let status = if diff.passed() { "ok" } else { "FAILED" };
                println!("{} [{}]: {}", checked.module, diff.policy, status);
                if global.verbosity == Verbosity::Verbose || !diff.passed() {
                    for finding in &diff.findings {
                        println!("    {}", finding);
                    }
                }
            }
        }
    }

    let mut errors = expansion.errors;
    errors.extend(linked.errors);
    report_module_errors(&errors, ctx.color())?;

    if let Err(failed) = report.into_result() {
        for failure in &failed.failures {
            eprintln!("{}", failure);
            eprintln!("{}", failure.remediation);
        }
        bail!("{}", failed);
    }
    Ok(())
}
