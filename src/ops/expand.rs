//! Implementation of `abiwright expand`.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::builder::expansion::{expand, VariantGraph};
use crate::builder::macros::{StubVersionsCache, VersioningMacroRegistry};
use crate::core::errors::ModuleError;
use crate::core::manifest::Manifest;
use crate::util::config::PlatformConfig;
use crate::util::progress::{Progress, Verbosity};

/// Options for the expand operation.
#[derive(Debug, Clone, Default)]
pub struct ExpandOptions {
    pub verbosity: Verbosity,

    /// Machine-readable output requested (suppresses progress)
    pub json: bool,
}

/// Variant graphs of every library in a manifest.
///
/// The macro registry and the stub-versions cache are filled while
/// expanding and are read by the later link step.
#[derive(Debug, Default)]
pub struct Expansion {
    pub graphs: BTreeMap<String, VariantGraph>,
    /// Modules that failed, in manifest order
    pub errors: Vec<ModuleError>,
    pub registry: VersioningMacroRegistry,
    pub cache: StubVersionsCache,
}

impl Expansion {
    pub fn graph(&self, module: &str) -> Option<&VariantGraph> {
        self.graphs.get(module)
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Expand every library in parallel.
///
/// A failing module does not stop the others; its error is collected.
pub fn expand_manifest(
    manifest: &Manifest,
    platform: &PlatformConfig,
    opts: &ExpandOptions,
) -> Expansion {
    let registry = VersioningMacroRegistry::new();
    let cache = StubVersionsCache::new();
    let libraries = manifest.libraries();
    let progress = Progress::new(
        libraries.len() as u64,
        "expanding",
        opts.verbosity,
        opts.json,
    );

    let results: Vec<_> = libraries
        .par_iter()
        .map(|lib| {
            let result = expand(lib, platform, &registry, &cache);
            progress.inc();
            (lib.name.clone(), result)
        })
        .collect();
    progress.finish();

    let mut graphs = BTreeMap::new();
    let mut errors = Vec::new();
    for (name, result) in results {
        match result {
            Ok(graph) => {
                tracing::debug!("{}: {} variant(s)", name, graph.len());
                graphs.insert(name, graph);
            }
            Err(e) => errors.push(e),
        }
    }
    tracing::info!(
        "expanded {} module(s), {} failed",
        graphs.len(),
        errors.len()
    );

    Expansion {
        graphs,
        errors,
        registry,
        cache,
    }
}
