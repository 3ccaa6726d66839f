//! Cross-module linking.
//!
//! Modules are linked in dependency order so every module sees the
//! published flags of the modules it depends on. Version pins
//! (`libfoo#29`) are resolved against the stub versions recorded during
//! expansion.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{bail, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::builder::expansion::VariantGraph;
use crate::builder::link::{link_variant, LinkContext, LinkedVariant};
use crate::builder::macros::StubVersionsCache;
use crate::core::api_level::ApiLevel;
use crate::core::errors::{ConfigError, ModuleError};
use crate::core::exporter::ExportedFlags;
use crate::core::library::{split_version_pin, LibraryConfig, VariantDeps};
use crate::core::manifest::Manifest;
use crate::core::variant::{Variant, VariantKind};
use crate::ops::expand::Expansion;
use crate::util::config::PlatformConfig;

/// A dependency pinned to a stub version, after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPin {
    pub dependency: String,
    /// Spelling used in the manifest
    pub requested: String,
    pub version: ApiLevel,
}

/// All linked variants of one module.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedModule {
    pub module: String,
    pub variants: Vec<LinkedVariant>,
    pub pins: Vec<ResolvedPin>,
}

impl LinkedModule {
    pub fn variant(&self, name: &str) -> Option<&LinkedVariant> {
        self.variants.iter().find(|v| v.variant == name)
    }
}

/// Result of linking a whole expansion.
#[derive(Debug, Default)]
pub struct LinkOutcome {
    pub modules: BTreeMap<String, LinkedModule>,
    pub errors: Vec<ModuleError>,
}

impl LinkOutcome {
    pub fn module(&self, name: &str) -> Option<&LinkedModule> {
        self.modules.get(name)
    }
}

/// Manifest modules in link order: dependencies before dependents.
///
/// Dependencies on modules the manifest does not declare are ignored.
pub fn link_order(manifest: &Manifest) -> Result<Vec<String>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for lib in manifest.libraries() {
        nodes.insert(&lib.name, graph.add_node(&lib.name));
    }

    for lib in manifest.libraries() {
        let from = nodes[lib.name.as_str()];
        for dep in module_deps(lib) {
            if let Some(&to) = nodes.get(dep.as_str()) {
                // a -> b means "a depends on b"
                graph.update_edge(from, to, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().rev().map(|n| graph[n].to_string()).collect()),
        Err(cycle) => bail!(
            "dependency cycle involving module `{}`",
            graph[cycle.node_id()]
        ),
    }
}

fn module_deps(lib: &LibraryConfig) -> Vec<String> {
    let static_deps = lib.variant_deps(VariantKind::Static);
    let shared_deps = lib.variant_deps(VariantKind::Shared);
    let mut deps: Vec<String> = static_deps
        .modules()
        .chain(shared_deps.modules())
        .map(str::to_string)
        .collect();
    deps.sort();
    deps.dedup();
    deps
}

/// Every pinned dependency of a variant, with the property it came from.
fn pinned_deps(deps: &VariantDeps) -> Vec<(&'static str, &str, &str)> {
    let lists: [(&'static str, &Vec<String>); 4] = [
        ("whole_static_libs", &deps.whole_static_libs),
        ("static_libs", &deps.static_libs),
        ("shared_libs", &deps.shared_libs),
        ("header_libs", &deps.header_libs),
    ];
    lists
        .into_iter()
        .flat_map(|(property, list)| {
            list.iter().filter_map(move |dep| match split_version_pin(dep) {
                (name, Some(version)) => Some((property, name, version)),
                _ => None,
            })
        })
        .collect()
}

/// Resolve `dep#version` against the versions `dep` declared.
pub fn resolve_pin(
    lib: &LibraryConfig,
    property: &str,
    dep: &str,
    requested: &str,
    cache: &StubVersionsCache,
    platform: &PlatformConfig,
) -> Result<ResolvedPin, ConfigError> {
    let value = format!("{}#{}", dep, requested);
    let versions = cache.get(dep);
    if versions.is_empty() {
        return Err(ConfigError::new(
            &lib.name,
            property,
            value,
            format!("`{}` has no stub versions", dep),
        ));
    }

    let version = if requested == "latest" {
        versions.last().cloned()
    } else {
        ApiLevel::from_user(requested, platform)
            .ok()
            .filter(|v| versions.contains(v))
    };

    match version {
        Some(version) => Ok(ResolvedPin {
            dependency: dep.to_string(),
            requested: requested.to_string(),
            version,
        }),
        None => {
            let declared: Vec<&str> = versions.iter().map(ApiLevel::as_str).collect();
            Err(ConfigError::new(
                &lib.name,
                property,
                value,
                format!(
                    "`{}` does not declare stub version `{}` (declared: {})",
                    dep,
                    requested,
                    declared.join(", ")
                ),
            ))
        }
    }
}

/// Flags a variant sees from each dependency: the pinned stub's when the
/// dependency is pinned, else the dependency's canonical variant's.
fn dependency_flags(
    variant: &Variant,
    pins: &[ResolvedPin],
    linked: &BTreeMap<String, LinkedModule>,
    expansion: &Expansion,
) -> BTreeMap<String, ExportedFlags> {
    let mut flags = BTreeMap::new();
    for dep in variant.deps.modules() {
        let (Some(module), Some(graph)) = (linked.get(dep), expansion.graph(dep)) else {
            continue;
        };
        let target = match pins.iter().find(|p| p.dependency == dep) {
            Some(pin) => graph.stub(&pin.version),
            None => graph.canonical(),
        };
        if let Some(linked_variant) = target.and_then(|v| module.variant(&v.name())) {
            flags.insert(dep.to_string(), linked_variant.exported.clone());
        }
    }
    flags
}

fn link_module(
    lib: &LibraryConfig,
    graph: &VariantGraph,
    ctx: LinkContext<'_>,
    linked: &BTreeMap<String, LinkedModule>,
    expansion: &Expansion,
) -> Result<LinkedModule, ModuleError> {
    let mut pins = Vec::new();
    let mut variants = Vec::new();

    for variant in graph.variants().filter(|v| !v.disabled) {
        // Linkage blocks may pin the same dependency differently
        let mut variant_pins = Vec::new();
        for (property, dep, requested) in pinned_deps(&variant.deps) {
            variant_pins.push(resolve_pin(
                lib,
                property,
                dep,
                requested,
                &expansion.cache,
                ctx.platform,
            )?);
        }

        let deps = dependency_flags(variant, &variant_pins, linked, expansion);
        variants.push(link_variant(lib, variant, ctx, &deps)?);

        for pin in variant_pins {
            if !pins.contains(&pin) {
                pins.push(pin);
            }
        }
    }

    Ok(LinkedModule {
        module: lib.name.clone(),
        variants,
        pins,
    })
}

/// Link every successfully expanded module.
pub fn link_all(
    manifest: &Manifest,
    expansion: &Expansion,
    out_dir: &Path,
    platform: &PlatformConfig,
) -> Result<LinkOutcome> {
    let ctx = LinkContext {
        root: manifest.root(),
        out_dir,
        platform,
    };

    let mut outcome = LinkOutcome::default();
    for name in link_order(manifest)? {
        let (Some(lib), Some(graph)) = (manifest.library(&name), expansion.graph(&name)) else {
            continue;
        };
        match link_module(lib, graph, ctx, &outcome.modules, expansion) {
            Ok(module) => {
                tracing::debug!("{}: linked {} variant(s)", name, module.variants.len());
                outcome.modules.insert(name, module);
            }
            Err(e) => outcome.errors.push(e),
        }
    }
    tracing::info!(
        "linked {} module(s), {} failed",
        outcome.modules.len(),
        outcome.errors.len()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::expand::{expand_manifest, ExpandOptions};
    use crate::test_support::fixtures::{manifest_dir, TWO_LIBRARY_MANIFEST};
    use pretty_assertions::assert_eq;

    fn link(contents: &str) -> (tempfile::TempDir, LinkOutcome) {
        let (tmp, manifest) = manifest_dir(contents);
        let platform = PlatformConfig::default();
        let expansion = expand_manifest(&manifest, &platform, &ExpandOptions::default());
        assert!(expansion.is_ok());
        let out = tmp.path().join("out");
        let outcome = link_all(&manifest, &expansion, &out, &platform).unwrap();
        (tmp, outcome)
    }

    #[test]
    fn test_link_order_puts_dependencies_first() {
        let (_tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
        assert_eq!(link_order(&manifest).unwrap(), vec!["libfoo", "libapp"]);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let (_tmp, manifest) = manifest_dir(
            r#"
[[library]]
name = "liba"
shared_libs = ["libb"]

[[library]]
name = "libb"
static_libs = ["liba"]
"#,
        );
        let err = link_order(&manifest).unwrap_err();
        assert!(err.to_string().contains("dependency cycle"));
    }

    #[test]
    fn test_pinned_dependency_sees_stub_macro() {
        let (_tmp, outcome) = link(TWO_LIBRARY_MANIFEST);
        assert!(outcome.errors.is_empty());

        let app = outcome.module("libapp").unwrap();
        assert_eq!(app.pins.len(), 1);
        assert_eq!(app.pins[0].version.number(), 29);

        let shared = app.variant("shared").unwrap();
        assert!(shared
            .exported
            .flags()
            .contains(&"-D__LIBFOO_API__=29".to_string()));
    }

    #[test]
    fn test_linkage_pins_apply_per_variant() {
        let manifest = TWO_LIBRARY_MANIFEST.replace(
            "shared_libs = [\"libfoo#29\"]\nexport_shared_lib_headers = [\"libfoo\"]",
            "export_shared_lib_headers = [\"libfoo\"]\n\n\
             [library.static]\nshared_libs = [\"libfoo#29\"]\n\n\
             [library.shared]\nshared_libs = [\"libfoo#30\"]",
        );
        assert!(manifest.contains("[library.shared]"));
        let (_tmp, outcome) = link(&manifest);
        assert!(outcome.errors.is_empty());

        let app = outcome.module("libapp").unwrap();
        let versions: Vec<i32> = app.pins.iter().map(|p| p.version.number()).collect();
        assert_eq!(versions, vec![29, 30]);

        let static_flags = app.variant("static").unwrap().exported.flags();
        assert!(static_flags.contains(&"-D__LIBFOO_API__=29".to_string()));
        assert!(!static_flags.contains(&"-D__LIBFOO_API__=30".to_string()));

        let shared_flags = app.variant("shared").unwrap().exported.flags();
        assert!(shared_flags.contains(&"-D__LIBFOO_API__=30".to_string()));
        assert!(!shared_flags.contains(&"-D__LIBFOO_API__=29".to_string()));
    }

    #[test]
    fn test_latest_pin() {
        let (_tmp, outcome) = link(&TWO_LIBRARY_MANIFEST.replace("libfoo#29", "libfoo#latest"));
        let app = outcome.module("libapp").unwrap();
        assert!(app.pins[0].version.is_future());
    }

    #[test]
    fn test_undeclared_pin_is_config_error() {
        let (_tmp, outcome) = link(&TWO_LIBRARY_MANIFEST.replace("libfoo#29", "libfoo#31"));
        assert!(outcome.module("libfoo").is_some());
        assert_eq!(outcome.errors.len(), 1);
        match &outcome.errors[0] {
            ModuleError::Config(e) => {
                assert_eq!(e.module, "libapp");
                assert_eq!(e.property, "shared_libs");
                assert_eq!(e.value, "libfoo#31");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
