//! Link-time finalization of a variant.
//!
//! Linking fixes a variant's output path and linker flags, generates its
//! stub surface, and publishes the `ExportedFlags` snapshot its dependents
//! compile against.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::builder::macros::versioning_macro_name;
use crate::builder::stubgen::{self, StubFiles, StubSurface, VERSION_SCRIPT_NAME};
use crate::core::errors::ModuleError;
use crate::core::exporter::{Define, ExportedFlags, FlagExporter};
use crate::core::library::LibraryConfig;
use crate::core::variant::{Variant, VariantKind};
use crate::util::config::PlatformConfig;

/// Where linking reads inputs and writes outputs.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    /// Directory relative paths in the manifest are resolved against
    pub root: &'a Path,
    /// Root of the build outputs
    pub out_dir: &'a Path,
    pub platform: &'a PlatformConfig,
}

/// A linked variant.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedVariant {
    pub module: String,
    pub variant: String,
    pub kind: VariantKind,
    pub output: PathBuf,
    pub ldflags: Vec<String>,
    pub exported: ExportedFlags,
    /// Linked ABI dump, for ABI-checked implementations
    pub abi_dump: Option<PathBuf>,
    pub version_script: Option<PathBuf>,
    #[serde(skip)]
    pub stub_surface: Option<StubSurface>,
}

impl LinkedVariant {
    /// Write the generated stub source and version script, if any.
    pub fn write_stub_files(&self) -> Result<Option<StubFiles>> {
        let Some(surface) = &self.stub_surface else {
            return Ok(None);
        };
        let dir = self
            .output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        surface
            .write(&dir, self.version_script.is_some())
            .map(Some)
    }
}

/// Whether a stub of this kind is linked with a version script.
fn uses_version_script(lib: &LibraryConfig, kind: VariantKind) -> bool {
    match kind {
        VariantKind::Stub | VariantKind::VendorPublicStub => true,
        VariantKind::LlndkStub => !lib.llndk.unversioned,
        VariantKind::Static | VariantKind::Shared => false,
    }
}

/// Collect what `variant` publishes to its dependents.
///
/// `deps` holds the already-published flags of this module's dependencies,
/// keyed by module name.
pub fn export_flags(
    lib: &LibraryConfig,
    variant: &Variant,
    deps: &BTreeMap<String, ExportedFlags>,
) -> Result<ExportedFlags, ModuleError> {
    let export_err = |source| ModuleError::Export {
        module: lib.name.clone(),
        source,
    };

    let mut exporter = FlagExporter::new(lib.export_props(variant.kind), lib.partition);
    if variant.kind == VariantKind::LlndkStub && lib.llndk.export_headers_as_system {
        exporter.export_includes_as_system();
    } else {
        exporter.export_includes();
    }

    for dep in lib.reexported_deps(variant.kind) {
        match deps.get(&dep) {
            Some(flags) => exporter.reexport_all(flags).map_err(export_err)?,
            None => tracing::warn!(
                "{}: re-exported dependency `{}` has no exported flags",
                lib.name,
                dep
            ),
        }
    }

    if variant.kind == VariantKind::Stub {
        if let Some(version) = &variant.version {
            let define = Define::key_value(versioning_macro_name(&lib.name), version.number());
            exporter
                .reexport_flags([define.to_flag()])
                .map_err(export_err)?;
        }
    }

    Ok(exporter.finalize())
}

/// Finalize one variant of `lib`.
pub fn link_variant(
    lib: &LibraryConfig,
    variant: &Variant,
    ctx: LinkContext<'_>,
    deps: &BTreeMap<String, ExportedFlags>,
) -> Result<LinkedVariant, ModuleError> {
    let lib_name = lib.lib_name();
    let output = variant.output_path(ctx.out_dir, &lib_name);

    let stub_surface = stubgen::surface_for_variant(lib, variant, ctx.root, ctx.platform)?;
    let version_script = (variant.kind.is_stub() && uses_version_script(lib, variant.kind))
        .then(|| variant.out_dir(ctx.out_dir).join(VERSION_SCRIPT_NAME));

    let mut ldflags = Vec::new();
    if variant.kind.is_shared() {
        ldflags.push("-shared".to_string());
        ldflags.push(format!("-Wl,-soname,{}.so", lib_name));
        if let Some(script) = &version_script {
            ldflags.push(format!("-Wl,--version-script,{}", script.display()));
        }
    }

    let abi_dump = (variant.is_implementation()
        && !variant.disabled
        && !lib.prebuilt
        && lib.abi_check_enabled())
    .then(|| variant.abi_dump_path(ctx.out_dir, &lib_name));

    let exported = export_flags(lib, variant, deps)?;

    tracing::debug!(
        "{}: linked {} -> {}",
        lib.name,
        variant.name(),
        output.display()
    );

    Ok(LinkedVariant {
        module: lib.name.clone(),
        variant: variant.name(),
        kind: variant.kind,
        output,
        ldflags,
        exported,
        abi_dump,
        version_script,
        stub_surface,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::expansion::expand;
    use crate::builder::macros::{StubVersionsCache, VersioningMacroRegistry};
    use crate::core::library::Partition;
    use crate::test_support::fixtures::{library_with_stubs, LIBFOO_MAP};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        platform: PlatformConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            std::fs::write(tmp.path().join("libfoo.map.txt"), LIBFOO_MAP).unwrap();
            Fixture {
                tmp,
                platform: PlatformConfig::default(),
            }
        }

        fn out(&self) -> PathBuf {
            self.tmp.path().join("out")
        }

        fn link(&self, lib: &LibraryConfig, name: &str) -> LinkedVariant {
            let graph = expand(
                lib,
                &self.platform,
                &VersioningMacroRegistry::new(),
                &StubVersionsCache::new(),
            )
            .unwrap();
            let variant = graph.variant(name).unwrap();
            let out = self.out();
            let ctx = LinkContext {
                root: self.tmp.path(),
                out_dir: &out,
                platform: &self.platform,
            };
            link_variant(lib, variant, ctx, &BTreeMap::new()).unwrap()
        }
    }

    #[test]
    fn test_versioned_stub_exports_macro_and_script() {
        let fx = Fixture::new();
        let mut lib = library_with_stubs("libfoo", &["29", "30"]);
        lib.ndk = true;
        let linked = fx.link(&lib, "stub_29");

        assert_eq!(linked.output, fx.out().join("libfoo/stub_29/libfoo.so"));
        assert_eq!(linked.exported.flags(), &["-D__LIBFOO_API__=29".to_string()]);
        let script = fx.out().join("libfoo/stub_29/stub.map");
        assert_eq!(
            linked.ldflags,
            vec![
                "-shared".to_string(),
                "-Wl,-soname,libfoo.so".to_string(),
                format!("-Wl,--version-script,{}", script.display()),
            ]
        );
        assert!(linked.abi_dump.is_none());

        let files = linked.write_stub_files().unwrap().unwrap();
        assert_eq!(files.version_script, Some(script));
        let source = std::fs::read_to_string(files.source).unwrap();
        assert!(source.contains("void foo_open() {}"));
        assert!(!source.contains("foo_stream"));
    }

    #[test]
    fn test_current_stub_macro_uses_future_number() {
        let fx = Fixture::new();
        let lib = library_with_stubs("libfoo", &["29"]);
        let linked = fx.link(&lib, "stub_current");
        assert_eq!(linked.exported.flags(), &["-D__LIBFOO_API__=10000".to_string()]);
    }

    #[test]
    fn test_implementation_gets_abi_dump() {
        let fx = Fixture::new();
        let mut lib = library_with_stubs("libfoo", &["29"]);
        lib.export_include_dirs = vec![PathBuf::from("include")];
        let linked = fx.link(&lib, "shared");

        assert_eq!(
            linked.abi_dump,
            Some(fx.out().join("libfoo/shared/libfoo.so.lsdump"))
        );
        assert!(linked.version_script.is_none());
        assert!(linked.stub_surface.is_none());
        assert!(linked.exported.flags().is_empty());
        assert_eq!(linked.exported.include_dirs(), &[PathBuf::from("include")]);
    }

    #[test]
    fn test_static_has_no_ldflags() {
        let fx = Fixture::new();
        let lib = LibraryConfig::new("libbar");
        let linked = fx.link(&lib, "static");
        assert!(linked.ldflags.is_empty());
        assert_eq!(linked.output, fx.out().join("libbar/static/libbar.a"));
        assert!(linked.abi_dump.is_none());
    }

    #[test]
    fn test_llndk_stub_headers_as_system_without_macro() {
        let fx = Fixture::new();
        let mut lib = LibraryConfig::new("libfoo").with_partition(Partition::Vendor);
        lib.llndk.symbol_file = Some(PathBuf::from("libfoo.map.txt"));
        lib.llndk.export_headers_as_system = true;
        lib.llndk.unversioned = true;
        lib.export_include_dirs = vec![PathBuf::from("include")];

        let linked = fx.link(&lib, "llndk_current");
        assert!(linked.exported.flags().is_empty());
        assert!(linked.exported.include_dirs().is_empty());
        assert_eq!(linked.exported.system_include_dirs(), &[PathBuf::from("include")]);
        assert!(linked.version_script.is_none());
        assert_eq!(linked.ldflags.len(), 2);
    }

    #[test]
    fn test_reexports_dependency_flags() {
        let fx = Fixture::new();
        let mut lib = LibraryConfig::new("libapp");
        lib.shared_libs = vec!["libfoo".to_string()];
        lib.export_shared_lib_headers = vec!["libfoo".to_string()];

        let dep = library_with_stubs("libfoo", &["29"]);
        let dep_flags = fx.link(&dep, "stub_29").exported;
        let mut deps = BTreeMap::new();
        deps.insert("libfoo".to_string(), dep_flags);

        let variant = Variant::new("libapp", VariantKind::Shared);
        let exported = export_flags(&lib, &variant, &deps).unwrap();
        assert_eq!(exported.flags(), &["-D__LIBFOO_API__=29".to_string()]);

        // Naming the dependency under two export properties re-exports it once
        lib.export_header_lib_headers = vec!["libfoo".to_string()];
        let exported = export_flags(&lib, &variant, &deps).unwrap();
        assert_eq!(exported.flags(), &["-D__LIBFOO_API__=29".to_string()]);
    }
}
