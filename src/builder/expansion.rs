//! Variant expansion - one library declaration into a graph of variants.
//!
//! Expansion runs two passes in order:
//! - `split_linkage` creates the static and/or shared variants
//! - `split_versions` turns the shared variant into one stub per API
//!   level plus the implementation
//!
//! Each pass is a plain function over a `VariantGraph` so it can be
//! tested on its own.

use std::collections::HashMap;
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::debug;

use crate::builder::macros::{StubVersionsCache, VersioningMacroRegistry};
use crate::builder::stubgen::stub_compile_flags;
use crate::core::api_level::{normalize_versions, ApiLevel};
use crate::core::errors::{ConfigError, ModuleError};
use crate::core::library::{LibraryConfig, VariantDeps};
use crate::core::variant::{Variant, VariantKind};
use crate::util::config::PlatformConfig;
use crate::util::diagnostic::suggestions;

/// Why one variant depends on another within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DepTag {
    /// Shared links the static variant's objects instead of compiling its own
    ReuseObjects,
    /// Shared reads the static variant's transitive static-library order
    StaticVariant,
    /// Stub resolves to the implementation for ABI and flag queries
    StubImpl,
}

impl fmt::Display for DepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DepTag::ReuseObjects => "reuse-objects",
            DepTag::StaticVariant => "static-variant",
            DepTag::StubImpl => "stub-impl",
        };
        f.write_str(s)
    }
}

/// Every variant of one module and the edges between them.
#[derive(Debug, Clone)]
pub struct VariantGraph {
    module: String,
    graph: DiGraph<Variant, DepTag>,
    by_name: HashMap<String, NodeIndex>,
    /// Variant the module's own name resolves to
    canonical: Option<NodeIndex>,
    /// Variant `<module>#latest` resolves to
    latest: Option<NodeIndex>,
    stub_versions: Vec<ApiLevel>,
}

impl VariantGraph {
    pub fn new(module: impl Into<String>) -> Self {
        VariantGraph {
            module: module.into(),
            graph: DiGraph::new(),
            by_name: HashMap::new(),
            canonical: None,
            latest: None,
            stub_versions: Vec::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Add a variant; a variant with the same name is replaced.
    pub fn add_variant(&mut self, variant: Variant) -> NodeIndex {
        let name = variant.name();
        if let Some(&node) = self.by_name.get(&name) {
            self.graph[node] = variant;
            return node;
        }
        let node = self.graph.add_node(variant);
        self.by_name.insert(name, node);
        node
    }

    /// Add an edge unless the same one already exists.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, tag: DepTag) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == tag);
        if !exists {
            self.graph.add_edge(from, to, tag);
        }
    }

    /// Variants in creation order.
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.graph.node_indices().map(move |n| &self.graph[n])
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// A module with no linkable variant only propagates headers.
    pub fn is_header_only(&self) -> bool {
        self.variants().all(|v| v.disabled) || self.is_empty()
    }

    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.by_name.get(name).map(|&n| &self.graph[n])
    }

    pub fn node(&self, name: &str) -> Option<NodeIndex> {
        self.by_name.get(name).copied()
    }

    pub fn canonical(&self) -> Option<&Variant> {
        self.canonical.map(|n| &self.graph[n])
    }

    pub fn latest(&self) -> Option<&Variant> {
        self.latest.map(|n| &self.graph[n])
    }

    /// Normalized stub versions, oldest first.
    pub fn stub_versions(&self) -> &[ApiLevel] {
        &self.stub_versions
    }

    /// Versioned stub variants, oldest first.
    pub fn stubs(&self) -> impl Iterator<Item = &Variant> {
        self.variants().filter(|v| v.kind.is_stub() && v.version.is_some())
    }

    /// Stub variant for one API level.
    pub fn stub(&self, version: &ApiLevel) -> Option<&Variant> {
        self.stubs().find(|v| v.version.as_ref() == Some(version))
    }

    /// Edges as (from, to, tag) variant names, in creation order.
    pub fn edges(&self) -> Vec<(String, String, DepTag)> {
        self.graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].name(),
                    self.graph[e.target()].name(),
                    *e.weight(),
                )
            })
            .collect()
    }

    pub fn has_edge(&self, from: &str, to: &str, tag: DepTag) -> bool {
        match (self.node(from), self.node(to)) {
            (Some(from), Some(to)) => self
                .graph
                .edges_connecting(from, to)
                .any(|e| *e.weight() == tag),
            _ => false,
        }
    }

    /// Variant reached from `from` over an edge tagged `tag`.
    pub fn dep_with_tag(&self, from: &Variant, tag: DepTag) -> Option<&Variant> {
        let node = self.node(&from.name())?;
        self.graph
            .edges(node)
            .find(|e| *e.weight() == tag)
            .map(|e| &self.graph[e.target()])
    }

    /// Resolve a dependency reference: `""` for the canonical variant,
    /// `"latest"`, or a stub version spelling.
    pub fn resolve(&self, version: &str) -> Option<&Variant> {
        match version {
            "" => self.canonical(),
            "latest" => self.latest(),
            v => self.stubs().find(|s| s.version_str() == v),
        }
    }

    /// Serializable summary for `expand --json`.
    pub fn to_report(&self) -> VariantGraphReport<'_> {
        VariantGraphReport {
            module: &self.module,
            canonical: self.canonical().map(Variant::name),
            latest: self.latest().map(Variant::name),
            stub_versions: self.stub_versions.iter().map(ToString::to_string).collect(),
            variants: self.variants().collect(),
            edges: self
                .edges()
                .into_iter()
                .map(|(from, to, tag)| EdgeReport { from, to, tag })
                .collect(),
        }
    }

    fn rekey(&mut self, node: NodeIndex) {
        self.by_name.retain(|_, n| *n != node);
        self.by_name.insert(self.graph[node].name(), node);
    }
}

/// JSON view of a variant graph.
#[derive(Debug, Serialize)]
pub struct VariantGraphReport<'a> {
    pub module: &'a str,
    pub canonical: Option<String>,
    pub latest: Option<String>,
    pub stub_versions: Vec<String>,
    pub variants: Vec<&'a Variant>,
    pub edges: Vec<EdgeReport>,
}

#[derive(Debug, Serialize)]
pub struct EdgeReport {
    pub from: String,
    pub to: String,
    pub tag: DepTag,
}

fn linkage_variant(lib: &LibraryConfig, kind: VariantKind) -> Variant {
    let mut variant = Variant::new(&lib.name, kind);
    variant.srcs = lib.variant_srcs(kind);
    variant.cflags = lib.variant_cflags(kind);
    variant.deps = lib.variant_deps(kind);
    variant.apex_available = lib.apex_available(kind);
    variant.installable = match kind {
        VariantKind::Static => false,
        _ => {
            let installable = lib.shared_props.installable.unwrap_or(true);
            if lib.has_stubs_variants() {
                installable && lib.is_stubs_implementation_required()
            } else {
                installable
            }
        }
    };
    variant
}

/// Pass 1: create the static and/or shared variants.
pub fn split_linkage(graph: &mut VariantGraph, lib: &LibraryConfig) {
    let build_static = lib.build_static();
    let build_shared = lib.build_shared();

    if lib.prebuilt {
        if !build_static && !build_shared {
            debug!("{}: header-only prebuilt", lib.name);
            return;
        }
        // Both variants exist so the prebuilt can stand in for a source
        // library of the same name.
        let mut static_variant = linkage_variant(lib, VariantKind::Static);
        static_variant.disabled = !build_static;
        let mut shared_variant = linkage_variant(lib, VariantKind::Shared);
        shared_variant.disabled = !build_shared;

        let static_node = graph.add_variant(static_variant);
        let shared_node = graph.add_variant(shared_variant);
        graph.canonical = Some(if build_shared { shared_node } else { static_node });
        return;
    }

    match (build_static, build_shared) {
        (true, true) => {
            let static_node = graph.add_variant(linkage_variant(lib, VariantKind::Static));
            let mut shared = linkage_variant(lib, VariantKind::Shared);
            let reuse = lib.static_props.same_objects_as(&lib.shared_props);
            if reuse {
                shared.srcs.clear();
            }
            let shared_node = graph.add_variant(shared);

            if reuse {
                graph.add_edge(shared_node, static_node, DepTag::ReuseObjects);
            }
            graph.add_edge(shared_node, static_node, DepTag::StaticVariant);
            graph.canonical = Some(shared_node);
            debug!("{}: static + shared (reuse objects: {})", lib.name, reuse);
        }
        (true, false) => {
            graph.canonical = Some(graph.add_variant(linkage_variant(lib, VariantKind::Static)));
            debug!("{}: static only", lib.name);
        }
        (false, true) => {
            graph.canonical = Some(graph.add_variant(linkage_variant(lib, VariantKind::Shared)));
            debug!("{}: shared only", lib.name);
        }
        (false, false) => {
            debug!("{}: header-only", lib.name);
        }
    }
}

/// Pass 2: split the shared variant into stubs plus the implementation.
///
/// `versions` must already be normalized. For LLNDK and vendor public
/// libraries the implementation slot itself becomes an unversioned stub.
pub fn split_versions(graph: &mut VariantGraph, lib: &LibraryConfig, versions: &[ApiLevel]) {
    let Some(impl_node) = graph
        .node(&VariantKind::Shared.to_string())
        .filter(|&n| !graph.graph[n].disabled)
    else {
        return;
    };

    graph.stub_versions = versions.to_vec();
    if versions.is_empty() {
        graph.latest = Some(impl_node);
        return;
    }

    let stub_kind = lib.stub_kind();
    let stub_cflags = stub_compile_flags(&lib.variant_cflags(VariantKind::Shared));
    let stub_variant = |version: Option<ApiLevel>| {
        let mut variant = Variant::new(&lib.name, stub_kind);
        variant.version = version;
        variant.cflags = stub_cflags.clone();
        variant.deps = VariantDeps {
            system_shared_libs: lib.variant_deps(VariantKind::Shared).system_shared_libs,
            ..VariantDeps::default()
        };
        variant
    };

    let mut latest = impl_node;
    for (i, version) in versions.iter().enumerate() {
        let mut variant = stub_variant(Some(version.clone()));
        variant.hidden = true;
        variant.is_latest = i == versions.len() - 1;
        let node = graph.add_variant(variant);
        graph.add_edge(node, impl_node, DepTag::StubImpl);
        latest = node;
    }
    graph.latest = Some(latest);

    if stub_kind != VariantKind::Stub {
        let mut replacement = stub_variant(None);
        replacement.apex_available = graph.graph[impl_node].apex_available.clone();
        graph.graph[impl_node] = replacement;
        graph.rekey(impl_node);
    }

    debug!(
        "{}: {} stub variant(s), latest {}",
        lib.name,
        versions.len(),
        graph.graph[latest].name()
    );
}

/// Expand one library declaration into its variant graph.
///
/// The normalized stub versions are published to `cache` and the module's
/// versioning macro is claimed in `registry` before the version split.
pub fn expand(
    lib: &LibraryConfig,
    platform: &PlatformConfig,
    registry: &VersioningMacroRegistry,
    cache: &StubVersionsCache,
) -> Result<VariantGraph, ModuleError> {
    lib.validate()?;

    let mut graph = VariantGraph::new(&lib.name);
    split_linkage(&mut graph, lib);

    let raw_versions = lib.stubs_versions();
    let versions = normalize_versions(&raw_versions, platform).map_err(|e| {
        ConfigError::new(
            &lib.name,
            "stubs.versions",
            format!("[{}]", raw_versions.join(", ")),
            e.to_string(),
        )
        .with_help(suggestions::UNSORTED_VERSIONS)
    })?;

    let shared_capable = graph
        .variant(&VariantKind::Shared.to_string())
        .is_some_and(|v| !v.disabled);
    if shared_capable && !versions.is_empty() {
        cache.insert(&lib.name, versions.clone());
        registry.register(&lib.name)?;
    }

    split_versions(&mut graph, lib, &versions);
    Ok(graph)
}
