//! `abiwright expand` command

use anyhow::Result;

use super::{report_module_errors, GlobalOpts};
use crate::cli::ExpandArgs;
use abiwright::builder::expansion::VariantGraph;
use abiwright::ops::expand::{expand_manifest, ExpandOptions};

pub fn execute(args: ExpandArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = global.load()?;
    for module in &args.module {
        ctx.manifest().require(module)?;
    }

    let opts = ExpandOptions {
        verbosity: global.verbosity,
        json: args.json,
    };
    let expansion = expand_manifest(ctx.manifest(), &ctx.config().platform, &opts);

    let graphs: Vec<&VariantGraph> = expansion
        .graphs
        .values()
        .filter(|g| args.module.is_empty() || args.module.iter().any(|m| m == g.module()))
        .collect();

    if args.json {
        let reports: Vec<_> = graphs.iter().map(|g| g.to_report()).collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for graph in graphs {
            print_graph(graph);
        }
    }

    report_module_errors(&expansion.errors, ctx.color())
}

fn print_graph(graph: &VariantGraph) {
    println!("{}", graph.module());
    if !graph.stub_versions().is_empty() {
        let versions: Vec<String> = graph.stub_versions().iter().map(ToString::to_string).collect();
        println!("  stub versions: {}", versions.join(", "));
    }

    let canonical = graph.canonical().map(|v| v.name());
    let latest = graph.latest().map(|v| v.name());
    for variant in graph.variants() {
        let name = variant.name();
        let mut markers = Vec::new();
        if canonical.as_deref() == Some(name.as_str()) {
            markers.push("canonical");
        }
        if latest.as_deref() == Some(name.as_str()) {
            markers.push("latest");
        }
        if variant.disabled {
            markers.push("disabled");
        }
        if variant.hidden {
            markers.push("hidden");
        }
        if !variant.installable {
            markers.push("not installed");
        }
        if markers.is_empty() {
            println!("  ├── {}", name);
        } else {
            println!("  ├── {} ({})", name, markers.join(", "));
        }
    }

    for (from, to, tag) in graph.edges() {
        println!("  │   {} -> {} [{}]", from, to, tag);
    }
}
