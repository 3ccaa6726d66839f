//! Implementation of `abiwright abi-check`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::builder::expansion::DepTag;
use crate::builder::link::LinkedVariant;
use crate::builder::sabi::dump::{LinkDumpRequest, FRAGMENT_EXTENSION};
use crate::builder::sabi::{plan_diffs, run_diff, AbiDiffResult, AbiTool};
use crate::core::library::LibraryConfig;
use crate::core::manifest::Manifest;
use crate::ops::expand::Expansion;
use crate::ops::link::LinkOutcome;
use crate::util::config::Config;
use crate::util::diagnostic::AbiCheckFailed;
use crate::util::fs::glob_files;
use crate::util::progress::{Progress, Verbosity};

/// Options for the abi-check operation.
#[derive(Debug, Clone, Default)]
pub struct AbiCheckOptions {
    /// Modules to check (empty = all)
    pub modules: Vec<String>,
    pub verbosity: Verbosity,
    pub json: bool,
}

/// One linked dump and the diffs run against it.
#[derive(Debug, Clone, Serialize)]
pub struct CheckedDump {
    pub module: String,
    pub dump: PathBuf,
    pub fragments: usize,
    pub diffs: Vec<AbiDiffResult>,
}

/// Result of an abi-check run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AbiCheckReport {
    pub dumps: Vec<CheckedDump>,
}

impl AbiCheckReport {
    pub fn failures(&self) -> impl Iterator<Item = &AbiDiffResult> {
        self.dumps
            .iter()
            .flat_map(|d| &d.diffs)
            .filter(|r| !r.passed())
    }

    pub fn passed(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Fail with every incompatibility when any diff failed.
    pub fn into_result(self) -> Result<Self, AbiCheckFailed> {
        let failures: Vec<_> = self.failures().map(AbiDiffResult::to_error).collect();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(AbiCheckFailed { failures })
        }
    }
}

/// Directory compiled dump fragments of a variant are read from.
pub fn fragment_dir(out_dir: &Path, module: &str, variant: &str) -> PathBuf {
    out_dir.join(module).join(variant).join("obj")
}

/// Build the dump link request of an ABI-checked variant.
///
/// A shared variant that reuses the static variant's objects reads the
/// static variant's fragments.
pub fn dump_request(
    lib: &LibraryConfig,
    linked: &LinkedVariant,
    dump: &Path,
    expansion: &Expansion,
    root: &Path,
    out_dir: &Path,
    config: &Config,
) -> Result<LinkDumpRequest> {
    let object_variant = expansion
        .graph(&lib.name)
        .and_then(|graph| {
            let variant = graph.variant(&linked.variant)?;
            graph.dep_with_tag(variant, DepTag::ReuseObjects)
        })
        .map(|v| v.name())
        .unwrap_or_else(|| linked.variant.clone());

    let pattern = format!("*.{}", FRAGMENT_EXTENSION);
    let fragments = glob_files(
        &fragment_dir(out_dir, &lib.name, &object_variant),
        &[pattern],
    )?;

    let props = lib.header_abi_checker_props();
    let mut include_dirs = linked.exported.include_dirs().to_vec();
    include_dirs.extend(linked.exported.system_include_dirs().iter().cloned());

    Ok(LinkDumpRequest {
        fragments,
        include_dirs,
        symbol_file: lib.symbol_file_for_abi_check().map(|f| root.join(f)),
        exclude_symbol_versions: props.exclude_symbol_versions,
        exclude_symbol_tags: props.exclude_symbol_tags,
        arch: config.platform.arch.clone(),
        output: dump.to_path_buf(),
    })
}

/// Link one variant's dump with `tool`.
#[allow(clippy::too_many_arguments)]
pub fn link_abi_dump(
    tool: &dyn AbiTool,
    lib: &LibraryConfig,
    linked: &LinkedVariant,
    dump: &Path,
    expansion: &Expansion,
    root: &Path,
    out_dir: &Path,
    config: &Config,
) -> Result<usize> {
    let request = dump_request(lib, linked, dump, expansion, root, out_dir, config)?;
    if request.fragments.is_empty() {
        tracing::warn!(
            "{}: no `.{}` fragments found for {}",
            lib.name,
            FRAGMENT_EXTENSION,
            linked.variant
        );
    }
    tool.link_dump(&request)
        .with_context(|| format!("failed to link ABI dump for `{}`", lib.name))?;
    Ok(request.fragments.len())
}

#[allow(clippy::too_many_arguments)]
fn check_variant(
    tool: &dyn AbiTool,
    lib: &LibraryConfig,
    linked: &LinkedVariant,
    dump: &Path,
    expansion: &Expansion,
    manifest: &Manifest,
    out_dir: &Path,
    config: &Config,
) -> Result<CheckedDump> {
    let root = manifest.root();
    let fragments = link_abi_dump(tool, lib, linked, dump, expansion, root, out_dir, config)?;

    let file_name = linked
        .output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let requests = plan_diffs(lib, &file_name, &config.platform, &config.abi, root);
    if requests.is_empty() {
        tracing::debug!("{}: no reference dumps, nothing to diff", lib.name);
    }

    let diffs = requests
        .iter()
        .map(|request| run_diff(tool, &lib.name, dump, request))
        .collect::<Result<Vec<_>>>()?;

    Ok(CheckedDump {
        module: lib.name.clone(),
        dump: dump.to_path_buf(),
        fragments,
        diffs,
    })
}

/// Link dumps for every ABI-checked implementation and run all diffs.
///
/// Diffs run in parallel; the report is in module order.
pub fn abi_check(
    tool: &dyn AbiTool,
    manifest: &Manifest,
    config: &Config,
    expansion: &Expansion,
    linked: &LinkOutcome,
    out_dir: &Path,
    opts: &AbiCheckOptions,
) -> Result<AbiCheckReport> {
    for module in &opts.modules {
        manifest.require(module)?;
    }

    let work: Vec<(&LibraryConfig, &LinkedVariant, &Path)> = linked
        .modules
        .values()
        .filter(|m| opts.modules.is_empty() || opts.modules.contains(&m.module))
        .filter_map(|m| manifest.library(&m.module).map(|lib| (lib, m)))
        .flat_map(|(lib, m)| {
            m.variants
                .iter()
                .filter_map(move |v| v.abi_dump.as_deref().map(|dump| (lib, v, dump)))
        })
        .collect();

    tracing::info!("checking {} ABI dump(s) with `{}`", work.len(), tool.name());
    let progress = Progress::new(work.len() as u64, "checking ABI", opts.verbosity, opts.json);

    let dumps = work
        .par_iter()
        .map(|(lib, variant, dump)| {
            let result = check_variant(
                tool, lib, variant, dump, expansion, manifest, out_dir, config,
            );
            progress.inc();
            result
        })
        .collect::<Result<Vec<_>>>()?;
    progress.finish();

    Ok(AbiCheckReport { dumps })
}
