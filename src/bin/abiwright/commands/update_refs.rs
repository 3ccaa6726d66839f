//! `abiwright update-refs` command

use anyhow::Result;

use super::{report_module_errors, GlobalOpts};
use crate::cli::UpdateRefsArgs;
use abiwright::builder::sabi::diff::tool_by_name;
use abiwright::ops::expand::{expand_manifest, ExpandOptions};
use abiwright::ops::link::link_all;
use abiwright::ops::update_refs::{update_refs, UpdateRefsOptions};

pub fn execute(args: UpdateRefsArgs, global: &GlobalOpts) -> Result<()> {
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
            json: false,
        },
    );
    report_module_errors(&expansion.errors, ctx.color())?;
    let linked = link_all(manifest, &expansion, &out_dir, &config.platform)?;
    report_module_errors(&linked.errors, ctx.color())?;

    let opts = UpdateRefsOptions {
        library: args.library,
        ref_dump_dir: args.ref_dump_dir,
        products: args.products,
    };
    let updated = update_refs(tool.as_ref(), manifest, config, &expansion, &linked, &out_dir, &opts)?;

    for reference in &updated {
        println!("updated {}", reference.reference.display());
    }
    Ok(())
}
